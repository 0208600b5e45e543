//! Expression errors

use thiserror::Error;

/// Malformed expression source
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("unexpected character `{ch}` at offset {pos}")]
    InvalidCharacter { ch: char, pos: usize },

    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("unterminated template literal starting at offset {0}")]
    UnterminatedTemplate(usize),

    #[error("malformed number `{0}`")]
    InvalidNumber(String),

    #[error("unexpected token `{found}` at offset {pos}, expected {expected}")]
    UnexpectedToken { found: String, pos: usize, expected: String },

    #[error("unexpected end of input, expected {0}")]
    UnexpectedEnd(String),

    #[error("invalid assignment target")]
    InvalidAssignmentTarget,

    #[error("`{0}` is not supported")]
    Unsupported(String),
}

/// Failure while running a compiled expression
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("RangeError: {0}")]
    Range(String),

    #[error("maximum call depth exceeded")]
    StackOverflow,

    /// Raised by a host object or native function
    #[error("{0}")]
    Host(String),
}

impl EvalError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    pub fn host(msg: impl std::fmt::Display) -> Self {
        Self::Host(msg.to_string())
    }
}
