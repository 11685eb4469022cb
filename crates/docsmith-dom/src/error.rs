//! Document model error types.
//!
//! The facade reports every rejected operation through [`DomError`]; the
//! package codec reports encoding and decoding failures through
//! [`PackageError`]. Each variant carries the offending call and value so a
//! caller can show the user exactly what to fix.

/// Error raised by the [`DocumentBuilder`](crate::DocumentBuilder) facade.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// The operation addressed part of the tree that is not materialized yet,
    /// or would break the tree's shape.
    #[error("{operation}: {detail}")]
    Structure {
        /// The call as written by the script, e.g. `table.rows[0]`.
        operation: String,
        /// What is wrong and, where possible, how to fix it.
        detail: String,
    },

    /// A value was outside the validated set for the property it targets.
    #[error("{operation}: invalid value {value}; expected {expected}")]
    InvalidValue {
        operation: String,
        /// The rejected value, echoed as written.
        value: String,
        expected: String,
    },

    /// The builder was finalized and is now inert.
    #[error("{operation}: the document has been finalized and can no longer change")]
    Finalized { operation: String },

    /// `Document()` was requested a second time.
    #[error("Document(): a document was already created; only one document is allowed per run")]
    DuplicateDocument,

    /// Finalization was requested but no document was ever created.
    #[error("no document was created; call Document() before adding content")]
    NoDocument,

    /// Creating the requested objects would exceed the object budget.
    #[error("{operation}: object limit of {limit} reached")]
    ObjectLimit { operation: String, limit: usize },

    /// A handle did not resolve to a node. Handles are only minted by the
    /// builder itself, so this indicates a bug rather than bad input.
    #[error("unknown {kind} handle #{index}")]
    UnknownHandle { kind: &'static str, index: usize },
}

/// Error raised while encoding or decoding a document package.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// The tree is well-typed but cannot form a valid package.
    #[error("document is incomplete: {0}")]
    Incomplete(String),

    /// XML could not be written or read.
    #[error("xml error: {0}")]
    Xml(String),

    /// The ZIP container could not be written or read.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The bytes are a ZIP archive but not a document package.
    #[error("malformed package: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used by the facade.
pub type Result<T> = std::result::Result<T, DomError>;

/// Render a script-supplied string the way it should be echoed in messages.
pub(crate) fn quoted(value: &str) -> String {
    const MAX_ECHO: usize = 60;
    if value.chars().count() > MAX_ECHO {
        let head: String = value.chars().take(MAX_ECHO).collect();
        format!("'{head}…'")
    } else {
        format!("'{value}'")
    }
}
