//! Jolt VM
//!
//! An embedded build-and-load backend: a lexer, parser and tree-walking
//! interpreter for the class-based language the engine synthesizes. Units
//! handed to [`VmService`] are parsed, optionally staged on disk, and loaded
//! into a shared [`interp::Runtime`].

pub mod ast;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod service;
pub mod staging;
pub mod tokens;

use thiserror::Error;

pub use service::{SharedBuffer, VmHandle, VmService};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error("lex error: {0}")]
    Lex(#[from] lexer::LexError),
    #[error("parse error: {0}")]
    Parse(#[from] parser::ParseError),
}

/// Lex and parse one compilation unit.
pub fn parse_unit(source: &str) -> Result<ast::CompilationUnit, CompileError> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    Ok(parser::Parser::new(tokens).parse_unit()?)
}
