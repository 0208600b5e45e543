//! Runtime errors

use drender_dom::DomError;
use drender_expr::{CompileError, EvalError};
use drender_html::HtmlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Expression source that does not parse
    #[error("cannot compile `{code}`: {error}")]
    Compile { code: String, error: CompileError },

    /// Expression that failed while running
    #[error("`{code}` failed: {error}")]
    Eval { code: String, error: EvalError },

    /// Markup that a directive cannot work with
    #[error("{directive}: {message}")]
    Structural { directive: String, message: String },

    #[error(transparent)]
    Dom(#[from] DomError),

    #[error(transparent)]
    Markup(#[from] HtmlError),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("runtime is no longer alive")]
    RuntimeGone,
}

impl Error {
    pub(crate) fn structural(directive: &str, message: impl Into<String>) -> Self {
        Self::Structural { directive: directive.to_string(), message: message.into() }
    }

    /// Form crossing back into a running expression
    pub(crate) fn into_eval(self) -> EvalError {
        match self {
            Error::Eval { error, .. } => error,
            other => EvalError::host(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
