//! d-render expressions
//!
//! Compiles attribute values into callables. Sources are a JavaScript
//! expression subset: literals, member access, calls, arrow functions,
//! operators, `let`/`const`, `if` and `return`. The last statement of a
//! source is its result.
//!
//! Free identifiers are computed once at compile time so the caller can bind
//! exactly those names before evaluation.

mod token;
mod lexer;
mod ast;
mod parser;
mod scope;
mod value;
mod interp;
mod builtins;
mod error;

pub use ast::{Expr, Program, Stmt};
pub use error::{CompileError, EvalError};
pub use interp::Compiled;
pub use lexer::Lexer;
pub use parser::Parser;
pub use scope::free_identifiers;
pub use value::{Function, HostObject, NativeFn, Object, Value};

/// Parse and analyze `source` with the given formal parameters
pub fn compile(source: &str, params: &[&str]) -> Result<Compiled, CompileError> {
    Compiled::new(source, params)
}

/// Whether `name` resolves to a language global (`Math`, `JSON`, ...)
pub fn is_global(name: &str) -> bool {
    builtins::GLOBAL_NAMES.contains(&name)
}
