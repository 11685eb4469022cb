//! Sandbox error types.
//!
//! Parsing reports [`ParseError`]; everything that stops a running script is
//! a [`SandboxError`], wrapped in a [`ScriptFault`] that remembers the
//! 1-indexed source line the evaluator was on.

use docsmith_dom::DomError;

/// The script could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    /// 1-indexed line.
    pub line: u32,
    /// 1-indexed column.
    pub column: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Unified error type for script execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("syntax error: {0}")]
    Syntax(#[from] ParseError),

    /// A known dangerous name or attribute was referenced.
    #[error("'{name}' is not available: {reason}")]
    Denied { name: String, reason: &'static str },

    #[error("name '{0}' is not defined; only document-building names are available")]
    UndefinedName(String),

    #[error("'{type_name}' object has no attribute '{attribute}'")]
    NoAttribute {
        type_name: String,
        attribute: String,
    },

    #[error("import of '{module}' is not allowed: {reason}")]
    ImportDenied { module: String, reason: String },

    /// A document operation was rejected by the facade.
    #[error("{0}")]
    Dom(#[from] DomError),

    /// Wrong argument or operand types, bad literals, arithmetic faults.
    #[error("{0}")]
    Type(String),

    /// Sequence index out of range.
    #[error("{0}")]
    Index(String),

    /// Missing dict key.
    #[error("{0}")]
    Key(String),

    #[error("execution exceeded the time limit of {limit_ms} ms")]
    Timeout { limit_ms: u64 },

    #[error("execution exceeded the step budget of {limit} steps")]
    StepLimit { limit: u64 },

    #[error("execution was cancelled")]
    Cancelled,

    /// A heap, size or depth cap was exceeded.
    #[error("{what} limit of {limit} exceeded")]
    Limit { what: &'static str, limit: usize },

    #[error("internal interpreter error: {0}")]
    Internal(String),
}

impl SandboxError {
    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }
}

/// A [`SandboxError`] together with the line it was raised on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct ScriptFault {
    pub line: Option<u32>,
    pub error: SandboxError,
}

impl ScriptFault {
    /// Attach `line` unless a more precise line is already known.
    pub(crate) fn at(mut self, line: u32) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

impl From<SandboxError> for ScriptFault {
    fn from(error: SandboxError) -> Self {
        let line = match &error {
            SandboxError::Syntax(e) => Some(e.line),
            _ => None,
        };
        Self { line, error }
    }
}

impl From<DomError> for ScriptFault {
    fn from(error: DomError) -> Self {
        SandboxError::Dom(error).into()
    }
}

/// Convenience alias used throughout the sandbox crate.
pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_display_names_reason() {
        let err = SandboxError::Denied {
            name: "open".into(),
            reason: "filesystem access is not available",
        };
        assert_eq!(
            err.to_string(),
            "'open' is not available: filesystem access is not available"
        );
    }

    #[test]
    fn fault_keeps_innermost_line() {
        let fault = ScriptFault::from(SandboxError::Cancelled).at(7).at(3);
        assert_eq!(fault.line, Some(7));
    }

    #[test]
    fn syntax_fault_carries_parse_line() {
        let fault = ScriptFault::from(SandboxError::from(ParseError::new("bad", 4, 2)));
        assert_eq!(fault.line, Some(4));
        assert_eq!(fault.to_string(), "syntax error: bad");
    }

    #[test]
    fn dom_errors_pass_through() {
        let fault = ScriptFault::from(DomError::DuplicateDocument);
        assert!(fault.to_string().contains("only one document"));
    }
}
