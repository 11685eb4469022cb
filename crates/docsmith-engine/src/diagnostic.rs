//! Execution results and the diagnostics carried by failures.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// The code could not be parsed.
    SyntaxError,
    /// The code reached for something outside the exposed namespace.
    CapabilityViolation,
    /// The code addressed document structure that does not exist, or broke
    /// the one-document rule.
    StructuralViolation,
    /// A value of the wrong type or outside its accepted range.
    TypeMismatch,
    /// A time, step, size or object limit was exceeded.
    ResourceExceeded,
    /// The finished document could not be turned into a package.
    SerializationFailure,
    /// A fault in the engine itself.
    InternalFault,
}

impl DiagnosticKind {
    pub const ALL: [DiagnosticKind; 7] = [
        Self::SyntaxError,
        Self::CapabilityViolation,
        Self::StructuralViolation,
        Self::TypeMismatch,
        Self::ResourceExceeded,
        Self::SerializationFailure,
        Self::InternalFault,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SyntaxError => "SyntaxError",
            Self::CapabilityViolation => "CapabilityViolation",
            Self::StructuralViolation => "StructuralViolation",
            Self::TypeMismatch => "TypeMismatch",
            Self::ResourceExceeded => "ResourceExceeded",
            Self::SerializationFailure => "SerializationFailure",
            Self::InternalFault => "InternalFault",
        }
    }

    /// Whether regenerating the code could plausibly fix the failure.
    pub fn is_regenerable(self) -> bool {
        !matches!(self, Self::InternalFault)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// 1-indexed line in the submitted code, when one is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// 1-indexed column, known for syntax errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Trimmed text of `line`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            column: None,
            source: None,
        }
    }

    /// Attach a line and, when `code` has that line, its trimmed text.
    pub fn at_line(mut self, line: u32, code: &str) -> Self {
        self.line = Some(line);
        self.source = source_line(code, line);
        self
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} at line {line}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Diagnostic {}

fn source_line(code: &str, line: u32) -> Option<String> {
    let index = usize::try_from(line).ok()?.checked_sub(1)?;
    let text = code.lines().nth(index)?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Outcome of one execution: document bytes or a diagnostic, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Success(Vec<u8>),
    Failure(Diagnostic),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Success(bytes) => Some(bytes),
            Self::Failure(_) => None,
        }
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::Success(_) => None,
            Self::Failure(diagnostic) => Some(diagnostic),
        }
    }

    pub fn into_result(self) -> Result<Vec<u8>, Diagnostic> {
        match self {
            Self::Success(bytes) => Ok(bytes),
            Self::Failure(diagnostic) => Err(diagnostic),
        }
    }
}

impl From<Result<Vec<u8>, Diagnostic>> for ExecutionResult {
    fn from(result: Result<Vec<u8>, Diagnostic>) -> Self {
        match result {
            Ok(bytes) => Self::Success(bytes),
            Err(diagnostic) => Self::Failure(diagnostic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_internal_faults_are_not_regenerable() {
        for kind in DiagnosticKind::ALL {
            assert_eq!(kind.is_regenerable(), kind != DiagnosticKind::InternalFault);
        }
    }

    #[test]
    fn at_line_quotes_trimmed_source() {
        let code = "x = 1\n    y = z\n";
        let d = Diagnostic::new(DiagnosticKind::CapabilityViolation, "name 'z' is not defined")
            .at_line(2, code);
        assert_eq!(d.line, Some(2));
        assert_eq!(d.source.as_deref(), Some("y = z"));

        let d = Diagnostic::new(DiagnosticKind::SyntaxError, "x").at_line(9, code);
        assert_eq!(d.line, Some(9));
        assert_eq!(d.source, None);
    }

    #[test]
    fn json_shape() {
        let d = Diagnostic::new(DiagnosticKind::TypeMismatch, "bad").at_line(1, "r.bold = 'yes'");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "TypeMismatch");
        assert_eq!(json["line"], 1);
        assert_eq!(json["source"], "r.bold = 'yes'");
        assert!(json.get("column").is_none());
    }

    #[test]
    fn result_is_exactly_one_side() {
        let ok = ExecutionResult::Success(vec![1, 2]);
        assert!(ok.is_success());
        assert!(ok.diagnostic().is_none());
        let err = ExecutionResult::Failure(Diagnostic::new(DiagnosticKind::InternalFault, "x"));
        assert!(err.bytes().is_none());
        assert_eq!(err.diagnostic().map(|d| d.kind), Some(DiagnosticKind::InternalFault));
    }
}
