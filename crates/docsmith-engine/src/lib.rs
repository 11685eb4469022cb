//! docsmith execution engine.
//!
//! Turns a generated script into `.docx` bytes or a structured diagnostic.
//!
//! - **[`config`]** -- [`EngineConfig`], the resource envelope, loadable
//!   from TOML and overridable from the environment.
//! - **[`diagnostic`]** -- [`ExecutionResult`], [`Diagnostic`] and the closed
//!   [`DiagnosticKind`] set.
//! - **[`translator`]** -- maps every parse, script, facade, package and
//!   panic fault to exactly one diagnostic.
//! - **[`orchestrator`]** -- [`Engine`]: validate, parse, execute once,
//!   serialize; synchronous, cancellable and async entry points.
//!
//! [`Engine`] is `Clone + Send + Sync`; concurrent executions share nothing
//! but the immutable catalogs.

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod orchestrator;
pub mod translator;

pub use config::EngineConfig;
pub use diagnostic::{Diagnostic, DiagnosticKind, ExecutionResult};
pub use docsmith_sandbox::CancelToken;
pub use error::{EngineError, Result};
pub use orchestrator::Engine;
