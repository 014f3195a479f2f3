//! Lexer for compilation units.

use crate::tokens::{Span, Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("unexpected character '{ch}' at line {line}, col {col}")]
    UnexpectedChar { ch: char, line: usize, col: usize },
    #[error("unterminated string at line {line}, col {col}")]
    UnterminatedString { line: usize, col: usize },
    #[error("unterminated character literal at line {line}, col {col}")]
    UnterminatedChar { line: usize, col: usize },
    #[error("unterminated comment starting at line {line}")]
    UnterminatedComment { line: usize },
    #[error("invalid number at line {line}, col {col}")]
    InvalidNumber { line: usize, col: usize },
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    byte_offset: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            byte_offset: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        self.byte_offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn span_from(&self, so: usize, sl: usize, sc: usize) -> Span {
        Span::new(so, self.byte_offset, sl, sc)
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match (self.current(), self.peek()) {
                (Some(c), _) if c.is_whitespace() => {
                    self.advance();
                }
                (Some('/'), Some('/')) => {
                    while !matches!(self.current(), None | Some('\n')) {
                        self.advance();
                    }
                }
                (Some('/'), Some('*')) => {
                    let line = self.line;
                    self.advance();
                    self.advance();
                    loop {
                        match (self.current(), self.peek()) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (Some(_), _) => {
                                self.advance();
                            }
                            (None, _) => return Err(LexError::UnterminatedComment { line }),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_escape(&mut self) -> Option<char> {
        let c = self.advance()?;
        Some(match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            '0' => '\0',
            's' => ' ',
            other => other,
        })
    }

    fn read_string(&mut self) -> Result<Token, LexError> {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.current() {
                None | Some('\n') => return Err(LexError::UnterminatedString { line: sl, col: sc }),
                Some('\\') => {
                    self.advance();
                    match self.read_escape() {
                        Some(c) => s.push(c),
                        None => return Err(LexError::UnterminatedString { line: sl, col: sc }),
                    }
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    s.push(c);
                    self.advance();
                }
            }
        }
        Ok(Token::new(TokenKind::StringLit(s), self.span_from(so, sl, sc)))
    }

    fn read_char(&mut self) -> Result<Token, LexError> {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        let unterminated = LexError::UnterminatedChar { line: sl, col: sc };
        self.advance(); // opening quote
        let ch = match self.advance() {
            Some('\\') => self.read_escape().ok_or_else(|| unterminated.clone())?,
            Some('\'') | Some('\n') | None => return Err(unterminated),
            Some(c) => c,
        };
        if self.advance() != Some('\'') {
            return Err(unterminated);
        }
        Ok(Token::new(TokenKind::CharLit(ch), self.span_from(so, sl, sc)))
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        let invalid = LexError::InvalidNumber { line: sl, col: sc };

        if self.current() == Some('0') && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            let mut digits = String::new();
            while let Some(ch) = self.current() {
                if ch.is_ascii_hexdigit() {
                    digits.push(ch);
                } else if ch != '_' {
                    break;
                }
                self.advance();
            }
            let value = i64::from_str_radix(&digits, 16).map_err(|_| invalid.clone())?;
            let kind = if matches!(self.current(), Some('L') | Some('l')) {
                self.advance();
                TokenKind::LongLit(value)
            } else if value <= u32::MAX as i64 {
                TokenKind::IntLit(value as u32 as i32 as i64)
            } else {
                return Err(invalid);
            };
            return Ok(Token::new(kind, self.span_from(so, sl, sc)));
        }

        let mut ns = String::new();
        let mut is_float = false;
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                ns.push(ch);
                self.advance();
            } else if ch == '.'
                && !is_float
                && matches!(self.peek(), Some(d) if d.is_ascii_digit())
            {
                is_float = true;
                ns.push(ch);
                self.advance();
            } else if matches!(ch, 'e' | 'E')
                && matches!(self.peek(), Some(d) if d.is_ascii_digit() || d == '-' || d == '+')
            {
                is_float = true;
                ns.push(ch);
                self.advance();
                if let Some(sign) = self.current().filter(|c| *c == '-' || *c == '+') {
                    ns.push(sign);
                    self.advance();
                }
            } else if ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let kind = match self.current() {
            Some('L') | Some('l') if !is_float => {
                self.advance();
                TokenKind::LongLit(ns.parse::<i64>().map_err(|_| invalid.clone())?)
            }
            Some('F') | Some('f') => {
                self.advance();
                TokenKind::FloatLit(ns.parse::<f64>().map_err(|_| invalid.clone())?)
            }
            Some('D') | Some('d') => {
                self.advance();
                TokenKind::DoubleLit(ns.parse::<f64>().map_err(|_| invalid.clone())?)
            }
            _ if is_float => TokenKind::DoubleLit(ns.parse::<f64>().map_err(|_| invalid.clone())?),
            _ => {
                let n = ns.parse::<i64>().map_err(|_| invalid.clone())?;
                // 2147483648 is only legal as the operand of unary minus; the
                // parser narrows it.
                if n > i32::MAX as i64 + 1 {
                    return Err(invalid);
                }
                TokenKind::IntLit(n)
            }
        };
        Ok(Token::new(kind, self.span_from(so, sl, sc)))
    }

    fn read_word(&mut self) -> Token {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        let mut word = String::new();
        while let Some(ch) = self.current() {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        let kind = TokenKind::keyword(&word).unwrap_or(TokenKind::Ident(word));
        Token::new(kind, self.span_from(so, sl, sc))
    }

    fn read_operator(&mut self) -> Result<Token, LexError> {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        let ch = self.current().unwrap_or('\0');
        let next = self.peek();
        let (kind, width) = match (ch, next) {
            ('+', Some('+')) => (TokenKind::PlusPlus, 2),
            ('+', Some('=')) => (TokenKind::PlusAssign, 2),
            ('-', Some('-')) => (TokenKind::MinusMinus, 2),
            ('-', Some('=')) => (TokenKind::MinusAssign, 2),
            ('*', Some('=')) => (TokenKind::StarAssign, 2),
            ('/', Some('=')) => (TokenKind::SlashAssign, 2),
            ('%', Some('=')) => (TokenKind::PercentAssign, 2),
            ('=', Some('=')) => (TokenKind::EqEq, 2),
            ('!', Some('=')) => (TokenKind::NotEq, 2),
            ('<', Some('=')) => (TokenKind::LtEq, 2),
            ('>', Some('=')) => (TokenKind::GtEq, 2),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('%', _) => (TokenKind::Percent, 1),
            ('=', _) => (TokenKind::Assign, 1),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', _) => (TokenKind::Gt, 1),
            ('!', _) => (TokenKind::Bang, 1),
            ('?', _) => (TokenKind::Question, 1),
            (':', _) => (TokenKind::Colon, 1),
            ('.', _) => (TokenKind::Dot, 1),
            (',', _) => (TokenKind::Comma, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            ('@', _) => (TokenKind::At, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            ('[', _) => (TokenKind::LBracket, 1),
            (']', _) => (TokenKind::RBracket, 1),
            (other, _) => {
                return Err(LexError::UnexpectedChar {
                    ch: other,
                    line: sl,
                    col: sc,
                })
            }
        };
        for _ in 0..width {
            self.advance();
        }
        Ok(Token::new(kind, self.span_from(so, sl, sc)))
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let tok = match self.current() {
                None => break,
                Some('"') => self.read_string()?,
                Some('\'') => self.read_char()?,
                Some(c) if c.is_ascii_digit() => self.read_number()?,
                Some('.') if matches!(self.peek(), Some(d) if d.is_ascii_digit()) => {
                    self.read_number()?
                }
                Some(c) if c.is_alphabetic() || c == '_' || c == '$' => self.read_word(),
                Some(_) => self.read_operator()?,
            };
            tokens.push(tok);
        }
        let end = Span::new(self.byte_offset, self.byte_offset, self.line, self.col);
        tokens.push(Token::new(TokenKind::Eof, end));
        Ok(tokens)
    }
}
