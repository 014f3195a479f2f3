//! Fragment classification.
//!
//! Classification is lexical: it looks at leading keywords and the
//! outermost punctuation of a fragment, never at a full parse. The order of
//! the checks in [`classify`] is the tie-break, so `public class Foo { void
//! f() {} }` is a class even though it also looks like a method.

use crate::binding::default_initializer;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    Import,
    Class,
    Method,
    StaticDeclaration,
    Expression,
    Statement,
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FragmentKind::Import => "import",
            FragmentKind::Class => "class",
            FragmentKind::Method => "method",
            FragmentKind::StaticDeclaration => "static declaration",
            FragmentKind::Expression => "expression",
            FragmentKind::Statement => "statement",
        };
        f.write_str(name)
    }
}

/// How a terminated statement folds into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementShape {
    /// `if`, loops, `switch`, `throw` and bare blocks.
    Control,
    /// `Type name = value;` or `Type name;` (value is then the type's default).
    Declaration {
        ty: String,
        name: String,
        value: String,
    },
    /// `name = value;`, `name op= value;`, `name++;`.
    Assignment { name: String },
    /// Assignment through a field or element: `p.x = 1;`, `xs[0]++;`.
    FieldWrite,
    /// The whole statement is one call: `Util.greet("a");`.
    Call,
    /// Any other expression used as a statement; its value is surfaced.
    Expression,
    /// A compound assignment the engine does not fold: shifts and bitwise.
    Unsupported { operator: &'static str },
    Unrecognized,
}

// ── Patterns ────────────────────────────────────────────────────────

static IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^import\s").unwrap());

static CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:public|private|protected)\s+)?(?:(?:abstract|final|static)\s+)*(?:class|interface)\s",
    )
    .unwrap()
});

static VISIBILITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:public|private|protected)\b").unwrap());

/// `int sq(int n) {` or `static void hello() {` with no visibility keyword.
static TYPED_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:static\s+)?(?:final\s+)?(?P<ty>[A-Za-z_$][\w$.]*(?:<[\w$.,?\s<>\[\]]*>)?(?:\s*\[\])*)\s+[A-Za-z_$][\w$]*\s*\(",
    )
    .unwrap()
});

static STATIC_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bstatic\b").unwrap());

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap());

static TYPE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_$][\w$.]*(?:<[\w$.,?\s<>\[\]]*>)?(?:\s*\[\])*$").unwrap()
});

static DECLARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<ty>[A-Za-z_$][\w$.]*(?:<[\w$.,?\s<>\[\]]*>)?(?:\s*\[\])*)\s+(?P<name>[A-Za-z_$][\w$]*)$",
    )
    .unwrap()
});

static STEP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<pre>\+\+|--)\s*(?P<a>[^+\-\s].*)|(?P<b>.*[^+\-\s])\s*(?P<post>\+\+|--))$")
        .unwrap()
});

static CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w$.]+\s*\(").unwrap());

const CONTROL_WORDS: &[&str] = &["if", "for", "while", "do", "switch", "throw"];

/// Words that can never start a declaration or an expression statement.
const RESERVED: &[&str] = &[
    "abstract", "break", "case", "catch", "class", "continue", "default", "do", "else",
    "extends", "finally", "for", "if", "implements", "import", "instanceof", "interface",
    "new", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "synchronized", "this", "throw", "throws", "try", "while",
];

// ── Classification ──────────────────────────────────────────────────

/// Decide what kind of fragment `text` is. First match wins.
pub fn classify(text: &str) -> FragmentKind {
    let text = text.trim();
    if IMPORT.is_match(text) {
        return FragmentKind::Import;
    }
    if CLASS.is_match(text) {
        return FragmentKind::Class;
    }
    if is_method(text) {
        return FragmentKind::Method;
    }
    if STATIC_TOKEN.is_match(text) && top_level_assign(text).is_some() {
        return FragmentKind::StaticDeclaration;
    }
    if !text.ends_with(';') && !text.ends_with('}') {
        return FragmentKind::Expression;
    }
    FragmentKind::Statement
}

fn is_method(text: &str) -> bool {
    let Some(open) = text.find('(') else {
        return false;
    };
    if !text[open..].contains(')') {
        return false;
    }
    // `public static int x = f(1);` is a field, not a method.
    if top_level_assign(&text[..open]).is_some() {
        return false;
    }
    if VISIBILITY.is_match(text) {
        return true;
    }
    match TYPED_SIGNATURE.captures(text) {
        Some(caps) => {
            let ty = caps.name("ty").map_or("", |m| m.as_str());
            !RESERVED.contains(&ty) && text.ends_with('}') && text.contains('{')
        }
        None => false,
    }
}

/// Split a terminated statement into the shape the engine folds it by.
pub fn statement_shape(statement: &str) -> StatementShape {
    let body = statement.trim().trim_end_matches(';').trim();
    if body.is_empty() {
        return StatementShape::Unrecognized;
    }
    let first = first_word(body);
    if body.starts_with('{') || CONTROL_WORDS.contains(&first) {
        return StatementShape::Control;
    }
    let body = body
        .strip_prefix("final ")
        .map(str::trim_start)
        .unwrap_or(body);

    if let Some(operator) = unsupported_assign(body) {
        return StatementShape::Unsupported { operator };
    }
    if let Some(site) = top_level_assign(body) {
        let lhs = body[..site.at].trim();
        let rhs = body[site.value_start()..].trim();
        if site.op.is_some() {
            return if is_identifier(lhs) {
                StatementShape::Assignment {
                    name: lhs.to_string(),
                }
            } else if is_place(lhs) {
                StatementShape::FieldWrite
            } else {
                StatementShape::Unrecognized
            };
        }
        if let Some((ty, name)) = declarator(lhs) {
            return StatementShape::Declaration {
                ty,
                name,
                value: rhs.to_string(),
            };
        }
        if is_identifier(lhs) {
            return StatementShape::Assignment {
                name: lhs.to_string(),
            };
        }
        if is_place(lhs) {
            return StatementShape::FieldWrite;
        }
        return StatementShape::Unrecognized;
    }

    if let Some(caps) = STEP.captures(body) {
        let target = match (caps.name("a"), caps.name("b")) {
            (Some(a), _) => a.as_str().trim(),
            (_, Some(b)) => b.as_str().trim(),
            _ => return StatementShape::Unrecognized,
        };
        return if is_identifier(target) {
            StatementShape::Assignment {
                name: target.to_string(),
            }
        } else if is_place(target) {
            StatementShape::FieldWrite
        } else {
            StatementShape::Unrecognized
        };
    }

    if let Some((ty, name)) = declarator(body) {
        let value = default_initializer(&ty).to_string();
        return StatementShape::Declaration { ty, name, value };
    }
    if is_call(body) {
        return StatementShape::Call;
    }
    if RESERVED.contains(&first) && first != "new" && first != "this" && first != "super" {
        return StatementShape::Unrecognized;
    }
    StatementShape::Expression
}

fn first_word(text: &str) -> &str {
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(text.len());
    &text[..end]
}

fn declarator(lhs: &str) -> Option<(String, String)> {
    let caps = DECLARATOR.captures(lhs)?;
    let ty = caps["ty"].to_string();
    let name = caps["name"].to_string();
    if RESERVED.contains(&ty.as_str()) || RESERVED.contains(&name.as_str()) {
        return None;
    }
    Some((ty, name))
}

/// `a.b`, `xs[0]`, `this.n`: anything assignable that is not a bare name.
fn is_place(text: &str) -> bool {
    (text.contains('.') || text.ends_with(']'))
        && !text.contains(char::is_whitespace)
        && text
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
}

pub fn is_identifier(text: &str) -> bool {
    IDENTIFIER.is_match(text) && !RESERVED.contains(&text)
}

pub fn is_type_name(text: &str) -> bool {
    TYPE_NAME.is_match(text) && !RESERVED.contains(&text)
}

/// True when the whole of `text` is a single call like `a.b(x, y)`.
pub fn is_call(text: &str) -> bool {
    let Some(m) = CALL.find(text) else {
        return false;
    };
    matching_close(text, m.end() - 1) == Some(text.len() - 1)
}

// ── Scanning ────────────────────────────────────────────────────────

/// Position of the top-level assignment operator in a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignSite {
    /// Byte offset where the operator starts.
    pub at: usize,
    /// The arithmetic operator of a compound assignment.
    pub op: Option<char>,
}

impl AssignSite {
    pub fn value_start(&self) -> usize {
        self.at + if self.op.is_some() { 2 } else { 1 }
    }
}

/// Find the first `=` or `op=` outside quotes and brackets, skipping
/// comparison operators.
pub fn top_level_assign(text: &str) -> Option<AssignSite> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'=' if depth == 0 => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    continue;
                }
                match i.checked_sub(1).map(|p| bytes[p]) {
                    Some(b'=' | b'!' | b'<' | b'>') => {}
                    Some(op @ (b'+' | b'-' | b'*' | b'/' | b'%')) => {
                        return Some(AssignSite {
                            at: i - 1,
                            op: Some(op as char),
                        })
                    }
                    _ => return Some(AssignSite { at: i, op: None }),
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// The shift or bitwise compound assignment operator of a statement, if
/// its first top-level assignment is one.
pub fn unsupported_assign(text: &str) -> Option<&'static str> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b'=' if depth == 0 => {
                if bytes.get(i + 1) == Some(&b'=') {
                    i += 2;
                    continue;
                }
                let head = &text[..i];
                for op in [">>>", ">>", "<<", "&", "|", "^"] {
                    if head.ends_with(op) {
                        return Some(match op {
                            ">>>" => ">>>=",
                            ">>" => ">>=",
                            "<<" => "<<=",
                            "&" => "&=",
                            "|" => "|=",
                            _ => "^=",
                        });
                    }
                }
                if !head.ends_with(['<', '>', '!', '=']) {
                    return None;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index just past the quoted literal starting at `start`.
pub(crate) fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            c if c == quote => return j + 1,
            _ => j += 1,
        }
    }
    bytes.len()
}

/// Index of the bracket closing the one at `open`.
pub fn matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let (opener, closer) = match bytes.get(open)? {
        b'(' => (b'(', b')'),
        b'[' => (b'[', b']'),
        b'{' => (b'{', b'}'),
        _ => return None,
    };
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            c if c == opener => depth += 1,
            c if c == closer => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split on commas that are not nested in brackets or quotes.
pub fn split_top_level(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = skip_quoted(bytes, i);
                continue;
            }
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b')' | b']' | b'}' | b'>' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    let tail = text[start..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail);
    }
    parts
}
