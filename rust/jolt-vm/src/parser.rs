//! Recursive descent parser with Pratt expression parsing.

use crate::ast::*;
use crate::tokens::{Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected token {found} at line {line}, col {col}; expected {expected}")]
    Unexpected {
        found: String,
        expected: String,
        line: usize,
        col: usize,
    },
    #[error("integer literal out of range at line {line}")]
    IntRange { line: usize },
    #[error("unexpected end of input")]
    UnexpectedEof,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + offset).min(last)].kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let tok = self.current();
        if tok.kind == TokenKind::Eof {
            return ParseError::UnexpectedEof;
        }
        ParseError::Unexpected {
            found: format!("{}", tok.kind),
            expected: expected.to_string(),
            line: tok.span.line,
            col: tok.span.col,
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("{}", kind)))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    // ── Top level ──

    pub fn parse_unit(&mut self) -> Result<CompilationUnit, ParseError> {
        let mut imports = Vec::new();
        let mut classes = Vec::new();

        if self.eat(&TokenKind::Package) {
            self.parse_dotted()?;
            self.expect(&TokenKind::Semicolon)?;
        }
        while self.at(&TokenKind::Import) {
            imports.push(self.parse_import()?);
        }
        while !self.at_end() {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            classes.push(self.parse_class()?);
        }
        Ok(CompilationUnit { imports, classes })
    }

    fn parse_dotted(&mut self) -> Result<String, ParseError> {
        let mut path = self.expect_ident()?;
        while self.at(&TokenKind::Dot) && matches!(self.peek_at(1), TokenKind::Ident(_)) {
            self.advance();
            path.push('.');
            path.push_str(&self.expect_ident()?);
        }
        Ok(path)
    }

    fn parse_import(&mut self) -> Result<ImportDecl, ParseError> {
        self.expect(&TokenKind::Import)?;
        let is_static = self.eat(&TokenKind::Static);
        let path = self.parse_dotted()?;
        let wildcard = if self.eat(&TokenKind::Dot) {
            self.expect(&TokenKind::Star)?;
            true
        } else {
            false
        };
        self.expect(&TokenKind::Semicolon)?;
        Ok(ImportDecl {
            path,
            is_static,
            wildcard,
        })
    }

    fn skip_annotation(&mut self) -> Result<(), ParseError> {
        self.expect(&TokenKind::At)?;
        self.parse_dotted()?;
        if self.at(&TokenKind::LParen) {
            let mut depth = 0usize;
            loop {
                match self.advance().kind {
                    TokenKind::LParen => depth += 1,
                    TokenKind::RParen => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    TokenKind::Eof => return Err(ParseError::UnexpectedEof),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn parse_modifiers(&mut self) -> Result<Modifiers, ParseError> {
        let mut mods = Modifiers::default();
        loop {
            match self.peek_kind() {
                TokenKind::Public => mods.is_public = true,
                TokenKind::Protected => mods.is_public = true,
                TokenKind::Private => mods.is_private = true,
                TokenKind::Static => mods.is_static = true,
                TokenKind::Final => mods.is_final = true,
                TokenKind::Abstract => mods.is_abstract = true,
                TokenKind::At => {
                    self.skip_annotation()?;
                    continue;
                }
                _ => return Ok(mods),
            }
            self.advance();
        }
    }

    fn parse_class(&mut self) -> Result<ClassDecl, ParseError> {
        let modifiers = self.parse_modifiers()?;
        let line = self.current().span.line;
        let is_interface = match self.peek_kind() {
            TokenKind::Class => false,
            TokenKind::Interface => true,
            _ => return Err(self.unexpected("class declaration")),
        };
        self.advance();
        let name = self.expect_ident()?;
        self.skip_type_params()?;

        let mut superclass = None;
        if self.eat(&TokenKind::Extends) {
            let ty = self.parse_type()?;
            if !is_interface {
                superclass = Some(ty.name);
            }
            while self.eat(&TokenKind::Comma) {
                self.parse_type()?;
            }
        }
        if self.eat(&TokenKind::Implements) {
            self.parse_type()?;
            while self.eat(&TokenKind::Comma) {
                self.parse_type()?;
            }
        }

        let mut class = ClassDecl {
            name,
            modifiers: Modifiers {
                is_abstract: modifiers.is_abstract || is_interface,
                ..modifiers
            },
            superclass,
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            line,
        };

        self.expect(&TokenKind::LBrace)?;
        while !self.at(&TokenKind::RBrace) {
            if self.at_end() {
                return Err(ParseError::UnexpectedEof);
            }
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            self.parse_member(&mut class, is_interface)?;
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(class)
    }

    fn parse_member(
        &mut self,
        class: &mut ClassDecl,
        is_interface: bool,
    ) -> Result<(), ParseError> {
        let mut modifiers = self.parse_modifiers()?;
        if is_interface {
            modifiers.is_public = true;
        }
        self.skip_type_params()?;

        // Constructor: the class name directly followed by a parameter list.
        if matches!(self.peek_kind(), TokenKind::Ident(n) if *n == class.name)
            && matches!(self.peek_at(1), TokenKind::LParen)
        {
            self.advance();
            let params = self.parse_params()?;
            let body = self.parse_block()?;
            class.constructors.push(ConstructorDecl {
                modifiers,
                params,
                body,
            });
            return Ok(());
        }

        let ret = if self.eat(&TokenKind::Void) {
            TypeRef::simple("void")
        } else {
            self.parse_type()?
        };
        let name = self.expect_ident()?;

        if self.at(&TokenKind::LParen) {
            let params = self.parse_params()?;
            let body = if self.eat(&TokenKind::Semicolon) {
                None
            } else {
                Some(self.parse_block()?)
            };
            if is_interface && body.is_none() {
                modifiers.is_abstract = true;
            }
            class.methods.push(MethodDecl {
                modifiers,
                ret,
                name,
                params,
                body,
            });
            return Ok(());
        }

        for (name, init) in self.parse_declarators(ret.clone(), Some(name))? {
            let ty = ret.clone();
            class.fields.push(FieldDecl {
                modifiers: Modifiers {
                    is_static: modifiers.is_static || is_interface,
                    ..modifiers
                },
                ty,
                name,
                init,
            });
        }
        self.expect(&TokenKind::Semicolon)?;
        Ok(())
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) {
            if !params.is_empty() {
                self.expect(&TokenKind::Comma)?;
            }
            self.parse_modifiers()?;
            let mut ty = self.parse_type()?;
            let name = self.expect_ident()?;
            while self.eat(&TokenKind::LBracket) {
                self.expect(&TokenKind::RBracket)?;
                ty.dims += 1;
            }
            params.push(Param { ty, name });
        }
        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }

    /// `a = 1, b, c = 3` after the type. `first` is an already consumed name.
    fn parse_declarators(
        &mut self,
        ty: TypeRef,
        first: Option<String>,
    ) -> Result<Vec<(String, Option<Expr>)>, ParseError> {
        let mut decls = Vec::new();
        let mut pending = first;
        loop {
            let name = match pending.take() {
                Some(n) => n,
                None => self.expect_ident()?,
            };
            let mut ty = ty.clone();
            while self.eat(&TokenKind::LBracket) {
                self.expect(&TokenKind::RBracket)?;
                ty.dims += 1;
            }
            let init = if self.eat(&TokenKind::Assign) {
                if ty.dims > 0 && self.at(&TokenKind::LBrace) {
                    Some(self.parse_array_init(&ty)?)
                } else {
                    Some(self.parse_expr()?)
                }
            } else {
                None
            };
            decls.push((name, init));
            if !self.eat(&TokenKind::Comma) {
                return Ok(decls);
            }
        }
    }

    fn parse_array_init(&mut self, ty: &TypeRef) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::LBrace)?;
        let elem = ty.element();
        let mut items = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            if elem.dims > 0 && self.at(&TokenKind::LBrace) {
                items.push(self.parse_array_init(&elem)?);
            } else {
                items.push(self.parse_expr()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::ArrayLit {
            ty: ty.clone(),
            items,
        })
    }

    // ── Types ──

    fn skip_type_params(&mut self) -> Result<(), ParseError> {
        if self.at(&TokenKind::Lt) {
            self.skip_generic_args()?;
        }
        Ok(())
    }

    fn skip_generic_args(&mut self) -> Result<(), ParseError> {
        let mut depth = 0usize;
        loop {
            match self.peek_kind() {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return Ok(());
                    }
                }
                TokenKind::Ident(_)
                | TokenKind::Comma
                | TokenKind::Dot
                | TokenKind::Question
                | TokenKind::Extends
                | TokenKind::Super
                | TokenKind::LBracket
                | TokenKind::RBracket => {}
                _ => return Err(self.unexpected("type argument")),
            }
            self.advance();
        }
    }

    fn parse_type(&mut self) -> Result<TypeRef, ParseError> {
        let mut name = self.expect_ident()?;
        while self.at(&TokenKind::Dot) && matches!(self.peek_at(1), TokenKind::Ident(_)) {
            self.advance();
            name = self.expect_ident()?;
        }
        if self.at(&TokenKind::Lt) {
            self.skip_generic_args()?;
        }
        let mut dims = 0;
        while self.at(&TokenKind::LBracket) && matches!(self.peek_at(1), TokenKind::RBracket) {
            self.advance();
            self.advance();
            dims += 1;
        }
        Ok(TypeRef { name, dims })
    }

    /// Speculatively parse `Type name`; restores the position on failure.
    fn try_local_header(&mut self) -> Option<(TypeRef, String)> {
        let saved = self.pos;
        if let Ok(ty) = self.parse_type() {
            if let TokenKind::Ident(name) = self.peek_kind().clone() {
                if matches!(
                    self.peek_at(1),
                    TokenKind::Assign
                        | TokenKind::Semicolon
                        | TokenKind::Comma
                        | TokenKind::Colon
                        | TokenKind::LBracket
                ) {
                    self.advance();
                    return Some((ty, name));
                }
            }
        }
        self.pos = saved;
        None
    }

    // ── Statements ──

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            if self.at_end() {
                return Err(ParseError::UnexpectedEof);
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(stmts)
    }

    pub fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_paren_expr()?;
                let body = self.parse_stmt()?;
                Ok(Stmt::While(cond, Box::new(body)))
            }
            TokenKind::Do => {
                self.advance();
                let body = self.parse_stmt()?;
                self.expect(&TokenKind::While)?;
                let cond = self.parse_paren_expr()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::DoWhile(Box::new(body), cond))
            }
            TokenKind::For => self.parse_for(),
            TokenKind::Return => {
                self.advance();
                let value = if self.at(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Return(value))
            }
            TokenKind::Break => {
                self.advance();
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Continue)
            }
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_expr()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Throw(value))
            }
            TokenKind::Super if matches!(self.peek_at(1), TokenKind::LParen) => {
                self.advance();
                let args = self.parse_args()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::SuperCall(args))
            }
            TokenKind::This if matches!(self.peek_at(1), TokenKind::LParen) => {
                self.advance();
                let args = self.parse_args()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::ThisCall(args))
            }
            _ => {
                let had_final = self.eat(&TokenKind::Final);
                if let Some((ty, name)) = self.try_local_header() {
                    let decls = self.parse_declarators(ty.clone(), Some(name))?;
                    self.expect(&TokenKind::Semicolon)?;
                    return Ok(Stmt::Local { ty, decls });
                }
                if had_final {
                    return Err(self.unexpected("local variable declaration"));
                }
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semicolon)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_paren_expr(&mut self) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let expr = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        Ok(expr)
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::If)?;
        let cond = self.parse_paren_expr()?;
        let then = self.parse_stmt()?;
        let otherwise = if self.eat(&TokenKind::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If(cond, Box::new(then), otherwise))
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LParen)?;
        self.eat(&TokenKind::Final);

        let mut init = Vec::new();
        if let Some((ty, name)) = self.try_local_header() {
            if self.eat(&TokenKind::Colon) {
                let iter = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                let body = self.parse_stmt()?;
                return Ok(Stmt::ForEach {
                    ty,
                    name,
                    iter,
                    body: Box::new(body),
                });
            }
            let decls = self.parse_declarators(ty.clone(), Some(name))?;
            init.push(Stmt::Local { ty, decls });
        } else {
            while !self.at(&TokenKind::Semicolon) {
                if !init.is_empty() {
                    self.expect(&TokenKind::Comma)?;
                }
                init.push(Stmt::Expr(self.parse_expr()?));
            }
        }
        self.expect(&TokenKind::Semicolon)?;

        let cond = if self.at(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semicolon)?;

        let mut update = Vec::new();
        while !self.at(&TokenKind::RParen) {
            if !update.is_empty() {
                self.expect(&TokenKind::Comma)?;
            }
            update.push(self.parse_expr()?);
        }
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_stmt()?;
        Ok(Stmt::For {
            init,
            cond,
            update,
            body: Box::new(body),
        })
    }

    // ── Expressions ──

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_ternary()?;
        let op = match self.peek_kind() {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::StarAssign => Some(BinOp::Mul),
            TokenKind::SlashAssign => Some(BinOp::Div),
            TokenKind::PercentAssign => Some(BinOp::Mod),
            _ => return Ok(lhs),
        };
        if !matches!(lhs, Expr::Name(_) | Expr::Field(..) | Expr::Index(..)) {
            return Err(self.unexpected("end of expression"));
        }
        self.advance();
        let value = self.parse_expr()?;
        Ok(Expr::Assign {
            target: Box::new(lhs),
            op,
            value: Box::new(value),
        })
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_binary(0)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.parse_expr()?;
        self.expect(&TokenKind::Colon)?;
        let otherwise = self.parse_ternary()?;
        Ok(Expr::Ternary(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn parse_binary(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let (op, (l_bp, r_bp)) = match self.peek_kind() {
                TokenKind::OrOr => (BinOp::Or, (2, 3)),
                TokenKind::AndAnd => (BinOp::And, (4, 5)),
                TokenKind::EqEq => (BinOp::Eq, (6, 7)),
                TokenKind::NotEq => (BinOp::NotEq, (6, 7)),
                TokenKind::Lt => (BinOp::Lt, (8, 9)),
                TokenKind::LtEq => (BinOp::LtEq, (8, 9)),
                TokenKind::Gt => (BinOp::Gt, (8, 9)),
                TokenKind::GtEq => (BinOp::GtEq, (8, 9)),
                TokenKind::Plus => (BinOp::Add, (10, 11)),
                TokenKind::Minus => (BinOp::Sub, (10, 11)),
                TokenKind::Star => (BinOp::Mul, (12, 13)),
                TokenKind::Slash => (BinOp::Div, (12, 13)),
                TokenKind::Percent => (BinOp::Mod, (12, 13)),
                TokenKind::Instanceof => {
                    if min_bp > 8 {
                        break;
                    }
                    self.advance();
                    let ty = self.parse_type()?;
                    lhs = Expr::InstanceOf(Box::new(lhs), ty);
                    continue;
                }
                _ => break,
            };
            if l_bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(r_bp)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn looks_like_cast(&self) -> bool {
        // `(int) x`, `(double[]) y`, `(Point) p`
        let TokenKind::Ident(name) = self.peek_at(1) else {
            return false;
        };
        let mut offset = 2;
        while matches!(self.peek_at(offset), TokenKind::LBracket)
            && matches!(self.peek_at(offset + 1), TokenKind::RBracket)
        {
            offset += 2;
        }
        if !matches!(self.peek_at(offset), TokenKind::RParen) {
            return false;
        }
        if jolt_core::values::is_primitive(name) {
            return true;
        }
        let starts_upper = name.chars().next().is_some_and(|c| c.is_uppercase());
        starts_upper
            && matches!(
                self.peek_at(offset + 1),
                TokenKind::Ident(_)
                    | TokenKind::LParen
                    | TokenKind::This
                    | TokenKind::New
                    | TokenKind::StringLit(_)
                    | TokenKind::IntLit(_)
                    | TokenKind::LongLit(_)
                    | TokenKind::DoubleLit(_)
                    | TokenKind::FloatLit(_)
                    | TokenKind::CharLit(_)
                    | TokenKind::Null
            )
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            TokenKind::Minus => {
                self.advance();
                if let TokenKind::IntLit(n) = *self.peek_kind() {
                    if n == i32::MAX as i64 + 1 {
                        self.advance();
                        return self.parse_postfix(Expr::Lit(Literal::Int(i32::MIN)));
                    }
                }
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
            }
            TokenKind::Plus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Plus, Box::new(operand)))
            }
            TokenKind::Bang => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let delta = if self.at(&TokenKind::PlusPlus) { 1 } else { -1 };
                self.advance();
                let target = self.parse_unary()?;
                Ok(Expr::IncDec {
                    target: Box::new(target),
                    delta,
                    prefix: true,
                })
            }
            TokenKind::LParen if self.looks_like_cast() => {
                self.advance();
                let ty = self.parse_type()?;
                self.expect(&TokenKind::RParen)?;
                let operand = self.parse_unary()?;
                Ok(Expr::Cast(ty, Box::new(operand)))
            }
            _ => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_postfix(&mut self, mut lhs: Expr) -> Result<Expr, ParseError> {
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_ident()?;
                    if self.at(&TokenKind::LParen) {
                        let args = self.parse_args()?;
                        lhs = Expr::Call {
                            target: Some(Box::new(lhs)),
                            name,
                            args,
                        };
                    } else {
                        lhs = Expr::Field(Box::new(lhs), name);
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let idx = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket)?;
                    lhs = Expr::Index(Box::new(lhs), Box::new(idx));
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let delta = if self.at(&TokenKind::PlusPlus) { 1 } else { -1 };
                    self.advance();
                    lhs = Expr::IncDec {
                        target: Box::new(lhs),
                        delta,
                        prefix: false,
                    };
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.at(&TokenKind::RParen) {
            if !args.is_empty() {
                self.expect(&TokenKind::Comma)?;
            }
            args.push(self.parse_expr()?);
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::IntLit(n) => {
                self.advance();
                let n = i32::try_from(n).map_err(|_| ParseError::IntRange {
                    line: tok.span.line,
                })?;
                Ok(Expr::Lit(Literal::Int(n)))
            }
            TokenKind::LongLit(n) => {
                self.advance();
                Ok(Expr::Lit(Literal::Long(n)))
            }
            TokenKind::FloatLit(n) => {
                self.advance();
                Ok(Expr::Lit(Literal::Float(n as f32)))
            }
            TokenKind::DoubleLit(n) => {
                self.advance();
                Ok(Expr::Lit(Literal::Double(n)))
            }
            TokenKind::CharLit(c) => {
                self.advance();
                Ok(Expr::Lit(Literal::Char(c)))
            }
            TokenKind::StringLit(s) => {
                self.advance();
                Ok(Expr::Lit(Literal::Str(s)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Lit(Literal::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Lit(Literal::Bool(false)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Lit(Literal::Null))
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::This)
            }
            TokenKind::Super => {
                self.advance();
                self.expect(&TokenKind::Dot)?;
                let name = self.expect_ident()?;
                let args = self.parse_args()?;
                Ok(Expr::SuperMethod { name, args })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::New => self.parse_new(),
            TokenKind::Ident(name) => {
                self.advance();
                if self.at(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr::Call {
                        target: None,
                        name,
                        args,
                    })
                } else {
                    Ok(Expr::Name(name))
                }
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_new(&mut self) -> Result<Expr, ParseError> {
        self.expect(&TokenKind::New)?;
        let mut class = self.expect_ident()?;
        while self.eat(&TokenKind::Dot) {
            class = self.expect_ident()?;
        }
        if self.at(&TokenKind::Lt) {
            self.skip_generic_args()?;
        }

        if self.at(&TokenKind::LParen) {
            let args = self.parse_args()?;
            return Ok(Expr::New { class, args });
        }

        let elem = TypeRef::simple(class);
        let mut dims = Vec::new();
        let mut extra_dims = 0;
        while self.eat(&TokenKind::LBracket) {
            if self.eat(&TokenKind::RBracket) {
                extra_dims += 1;
                continue;
            }
            if extra_dims > 0 {
                return Err(self.unexpected("]"));
            }
            dims.push(self.parse_expr()?);
            self.expect(&TokenKind::RBracket)?;
        }
        if dims.is_empty() {
            if extra_dims == 0 {
                return Err(self.unexpected("( or ["));
            }
            let ty = TypeRef {
                name: elem.name,
                dims: extra_dims,
            };
            return self.parse_array_init(&ty);
        }
        Ok(Expr::NewArray {
            elem,
            dims,
            extra_dims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_src(src: &str) -> Result<CompilationUnit, ParseError> {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(tokens).parse_unit()
    }

    fn parse_body(stmts: &str) -> Vec<Stmt> {
        let src = format!("class T {{ void m() {{ {} }} }}", stmts);
        let unit = parse_src(&src).unwrap();
        unit.classes[0].methods[0].body.clone().unwrap()
    }

    #[test]
    fn parses_class_members() {
        let unit = parse_src(
            "import java.util.*;\n\
             public class Point extends Base {\n\
               private int x, y = 2;\n\
               static String label = \"p\";\n\
               public Point(int x) { super(); this.x = x; }\n\
               public int getX() { return x; }\n\
             }",
        )
        .unwrap();
        assert_eq!(unit.imports.len(), 1);
        assert!(unit.imports[0].wildcard);
        let class = &unit.classes[0];
        assert_eq!(class.name, "Point");
        assert_eq!(class.superclass.as_deref(), Some("Base"));
        assert_eq!(class.fields.len(), 3);
        assert_eq!(class.constructors.len(), 1);
        assert_eq!(class.methods[0].name, "getX");
        assert!(class.fields[2].modifiers.is_static);
    }

    #[test]
    fn precedence_of_arithmetic() {
        let body = parse_body("int a = 1 + 2 * 3;");
        let Stmt::Local { decls, .. } = &body[0] else {
            panic!("expected local");
        };
        let Some(Expr::Binary(BinOp::Add, _, rhs)) = &decls[0].1 else {
            panic!("expected addition at the root");
        };
        assert!(matches!(**rhs, Expr::Binary(BinOp::Mul, _, _)));
    }

    #[test]
    fn distinguishes_declarations_from_comparisons() {
        let body = parse_body("a < b; List<String> names = null; int[] xs = {1, 2};");
        assert!(matches!(&body[0], Stmt::Expr(Expr::Binary(BinOp::Lt, _, _))));
        assert!(matches!(&body[1], Stmt::Local { ty, .. } if ty.name == "List"));
        assert!(matches!(&body[2], Stmt::Local { ty, .. } if ty.dims == 1));
    }

    #[test]
    fn parses_casts_and_calls() {
        let body = parse_body("double d = (double) x / 2; System.out.println(d);");
        let Stmt::Local { decls, .. } = &body[0] else {
            panic!("expected local");
        };
        assert!(matches!(
            &decls[0].1,
            Some(Expr::Binary(BinOp::Div, lhs, _)) if matches!(**lhs, Expr::Cast(..))
        ));
        assert!(matches!(
            &body[1],
            Stmt::Expr(Expr::Call { target: Some(_), name, .. }) if name == "println"
        ));
    }

    #[test]
    fn parses_loops() {
        let body = parse_body(
            "for (int i = 0; i < 3; i++) { s += i; } for (int v : xs) s += v; while (s > 0) s--;",
        );
        assert!(matches!(&body[0], Stmt::For { .. }));
        assert!(matches!(&body[1], Stmt::ForEach { name, .. } if name == "v"));
        assert!(matches!(&body[2], Stmt::While(..)));
    }

    #[test]
    fn parses_array_creation() {
        let body = parse_body("int[][] g = new int[2][3]; int[] a = new int[]{1, 2};");
        let Stmt::Local { decls, .. } = &body[0] else {
            panic!("expected local");
        };
        assert!(matches!(&decls[0].1, Some(Expr::NewArray { dims, .. }) if dims.len() == 2));
        let Stmt::Local { decls, .. } = &body[1] else {
            panic!("expected local");
        };
        assert!(matches!(&decls[0].1, Some(Expr::ArrayLit { items, .. }) if items.len() == 2));
    }

    #[test]
    fn rejects_assignment_to_rvalue() {
        let src = "class T { void m() { 1 = 2; } }";
        assert!(parse_src(src).is_err());
    }

    #[test]
    fn reports_unexpected_eof() {
        assert_eq!(
            parse_src("class T { void m() {"),
            Err(ParseError::UnexpectedEof)
        );
    }
}
