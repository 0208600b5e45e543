//! d-render
//!
//! Reactive attribute-binding runtime. Markup declares state
//! (`d-state`), component classes (`d-component`) and bindings
//! (`d-text`, `d-click`, `d-loop`, ...); the runtime compiles those
//! attributes into hooks and keeps the document in sync with component
//! state.
//!
//! # Example
//! ```rust,ignore
//! use drender::{Config, Runtime};
//!
//! let runtime = Runtime::from_html(r#"<div d-state="{ n: 1 }"><b d-text="n"></b></div>"#, Config::default())?;
//! runtime.start()?;
//! ```

mod class;
mod compiler;
mod component;
mod config;
mod discovery;
mod error;
mod host;
mod runtime;
mod scheduler;
mod state;

pub mod directives;

pub use class::{ComponentClass, Mixin, MixinSource};
pub use compiler::{Expression, compile, compile_with};
pub use component::{Component, Context, EventBinding, Hook, HookFn, RefEntry, RenderMode, StateUpdate, Status};
pub use config::Config;
pub use directives::{DirectiveFn, DirectiveRegistry, ModifierFn, ModifierRegistry};
pub use discovery::INITIALIZED_FROM_MUTATION;
pub use error::{Error, Result};
pub use host::ComponentRef;
pub use runtime::{EventHandler, Runtime};
pub use scheduler::TimerId;
pub use state::{State, deep_merge, kebab_case};

// Re-export sub-crates for advanced usage
pub use drender_dom as dom;
pub use drender_expr as expr;
pub use drender_dom::{Document, Event, ListenerId, NodeId};
pub use drender_expr::Value;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
