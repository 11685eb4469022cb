//! docsmith script sandbox.
//!
//! Runs generated document-building scripts written in a Python subset,
//! with nothing reachable except an enumerated namespace and inside a
//! bounded resource envelope.
//!
//! - **[`config`]** -- [`SandboxConfig`] sets the deadline, step budget,
//!   facade object cap and heap caps.
//! - **[`error`]** -- [`ParseError`], [`SandboxError`] and the line-carrying
//!   [`ScriptFault`].
//! - **[`parser`]** -- lexer and recursive-descent parser producing an
//!   [`ast::Program`].
//! - **[`namespace`]** -- the allow and deny tables for names, attributes
//!   and imports.
//! - **[`runtime`]** -- [`SandboxRuntime`], the entry point: parse, then run
//!   once against a fresh [`docsmith_dom::DocumentBuilder`].
//!
//! Interpreter state is single-threaded; the runtime itself is `Send + Sync`
//! and every run builds its own state.

pub mod ast;
pub mod budget;
pub mod config;
pub mod error;
pub mod lexer;
pub mod namespace;
pub mod parser;
pub mod runtime;
pub mod value;

mod bindings;
mod builtins;
mod format;
mod interp;

pub use budget::CancelToken;
pub use config::SandboxConfig;
pub use error::{ParseError, Result, SandboxError, ScriptFault};
pub use namespace::{NamespaceDescription, describe as describe_namespace};
pub use runtime::{Execution, SandboxRuntime};
