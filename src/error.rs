// ABOUTME: Error taxonomy for the scanner, parser, and evaluator

use thiserror::Error;

/// 1-based source position, carried by errors produced before evaluation
/// begins (the evaluator itself is not specified to track positions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InterpError {
    #[error("lex error at {pos}: {message}")]
    Lex { message: String, pos: Position },

    #[error("parse error at {pos}: {message}")]
    Parse { message: String, pos: Position },

    #[error("undeclared identifier: {0}")]
    Name(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("bounds error: {0}")]
    Bounds(String),

    #[error("pointer error: {0}")]
    Pointer(String),

    #[error("file error: {0}")]
    File(String),

    #[error("arity error: {0}")]
    Arity(String),

    #[error("unsupported construct: {0}")]
    Unsupported(String),
}

impl InterpError {
    pub fn lex(message: impl Into<String>, line: usize, column: usize) -> Self {
        InterpError::Lex {
            message: message.into(),
            pos: Position { line, column },
        }
    }

    pub fn parse(message: impl Into<String>, line: usize, column: usize) -> Self {
        InterpError::Parse {
            message: message.into(),
            pos: Position { line, column },
        }
    }
}
