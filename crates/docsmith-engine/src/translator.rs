//! Error translation.
//!
//! Every way a run can fail is first captured as a [`Fault`] tagged with the
//! stage it came from, then [`translate`] turns it into exactly one
//! [`Diagnostic`]. Faults the engine did not anticipate end up as
//! [`DiagnosticKind::InternalFault`].

use std::any::Any;

use docsmith_dom::{DomError, PackageError};
use docsmith_sandbox::{ParseError, SandboxError, ScriptFault};

use crate::diagnostic::{Diagnostic, DiagnosticKind};

/// Pipeline stage a fault was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Parse,
    Execute,
    Serialize,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Parse => "parse",
            Self::Execute => "execute",
            Self::Serialize => "serialize",
        }
    }
}

/// A raw failure from one of the pipeline stages.
#[derive(Debug)]
pub enum Fault {
    /// The submitted code is empty or whitespace only.
    EmptyCode,
    /// The submitted code is larger than `max_code_bytes`.
    CodeTooLarge { size: usize, limit: usize },
    Parse(ParseError),
    Script(ScriptFault),
    /// The builder refused to hand over its tree.
    Finalize(DomError),
    Package(PackageError),
    /// The package is larger than `max_output_bytes`.
    OutputTooLarge { size: usize, limit: usize },
    /// A panic caught anywhere in the pipeline.
    Panic(String),
    /// The blocking worker could not be joined.
    Worker(String),
}

impl Fault {
    pub fn stage(&self) -> Stage {
        match self {
            Self::EmptyCode | Self::CodeTooLarge { .. } => Stage::Validate,
            Self::Parse(_) => Stage::Parse,
            Self::Script(_) | Self::Panic(_) | Self::Worker(_) => Stage::Execute,
            Self::Finalize(_) | Self::Package(_) | Self::OutputTooLarge { .. } => {
                Stage::Serialize
            }
        }
    }

    /// Describe a panic payload caught with `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panic(message)
    }
}

/// Category of a sandbox error.
pub fn classify(error: &SandboxError) -> DiagnosticKind {
    match error {
        SandboxError::Syntax(_) => DiagnosticKind::SyntaxError,
        SandboxError::Denied { .. }
        | SandboxError::UndefinedName(_)
        | SandboxError::NoAttribute { .. }
        | SandboxError::ImportDenied { .. } => DiagnosticKind::CapabilityViolation,
        SandboxError::Type(_) => DiagnosticKind::TypeMismatch,
        SandboxError::Index(_) | SandboxError::Key(_) => DiagnosticKind::StructuralViolation,
        SandboxError::Timeout { .. }
        | SandboxError::StepLimit { .. }
        | SandboxError::Cancelled
        | SandboxError::Limit { .. } => DiagnosticKind::ResourceExceeded,
        SandboxError::Dom(dom) => classify_dom(dom),
        SandboxError::Internal(_) => DiagnosticKind::InternalFault,
    }
}

/// Category of a facade error raised while the script runs.
pub fn classify_dom(error: &DomError) -> DiagnosticKind {
    match error {
        DomError::Structure { .. } | DomError::Finalized { .. } | DomError::DuplicateDocument => {
            DiagnosticKind::StructuralViolation
        }
        DomError::InvalidValue { .. } => DiagnosticKind::TypeMismatch,
        DomError::ObjectLimit { .. } => DiagnosticKind::ResourceExceeded,
        DomError::NoDocument => DiagnosticKind::SerializationFailure,
        DomError::UnknownHandle { .. } => DiagnosticKind::InternalFault,
    }
}

/// Turn a fault into its diagnostic, quoting the offending line of `code`.
pub fn translate(fault: Fault, code: &str) -> Diagnostic {
    match fault {
        Fault::EmptyCode => Diagnostic::new(
            DiagnosticKind::StructuralViolation,
            "no code was submitted; expected a script that creates a Document()",
        ),
        Fault::CodeTooLarge { size, limit } => Diagnostic::new(
            DiagnosticKind::ResourceExceeded,
            format!("code is {size} bytes, the limit is {limit} bytes"),
        ),
        Fault::Parse(e) => Diagnostic::new(DiagnosticKind::SyntaxError, e.message.clone())
            .at_line(e.line, code)
            .with_column(e.column),
        Fault::Script(fault) => script_diagnostic(fault, code),
        Fault::Finalize(e) => match e {
            DomError::UnknownHandle { .. } => {
                Diagnostic::new(DiagnosticKind::InternalFault, e.to_string())
            }
            other => Diagnostic::new(DiagnosticKind::SerializationFailure, other.to_string()),
        },
        Fault::Package(e) => Diagnostic::new(DiagnosticKind::SerializationFailure, e.to_string()),
        Fault::OutputTooLarge { size, limit } => Diagnostic::new(
            DiagnosticKind::ResourceExceeded,
            format!("the document package is {size} bytes, the limit is {limit} bytes"),
        ),
        Fault::Panic(message) => Diagnostic::new(
            DiagnosticKind::InternalFault,
            format!("the engine panicked: {message}"),
        ),
        Fault::Worker(message) => Diagnostic::new(
            DiagnosticKind::InternalFault,
            format!("the execution worker failed: {message}"),
        ),
    }
}

fn script_diagnostic(fault: ScriptFault, code: &str) -> Diagnostic {
    let kind = classify(&fault.error);
    let mut diagnostic = match &fault.error {
        SandboxError::Syntax(e) => Diagnostic::new(kind, e.message.clone()).with_column(e.column),
        other => Diagnostic::new(kind, other.to_string()),
    };
    if let Some(line) = fault.line {
        diagnostic = diagnostic.at_line(line, code);
    }
    diagnostic
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fault(error: SandboxError, line: u32) -> Fault {
        Fault::Script(ScriptFault {
            line: Some(line),
            error,
        })
    }

    #[test]
    fn sandbox_errors_map_to_closed_kinds() {
        let cases = [
            (
                SandboxError::UndefinedName("open_file".into()),
                DiagnosticKind::CapabilityViolation,
            ),
            (
                SandboxError::ImportDenied {
                    module: "os".into(),
                    reason: "filesystem access is not available".into(),
                },
                DiagnosticKind::CapabilityViolation,
            ),
            (SandboxError::Type("bad".into()), DiagnosticKind::TypeMismatch),
            (SandboxError::Index("x".into()), DiagnosticKind::StructuralViolation),
            (SandboxError::Key("x".into()), DiagnosticKind::StructuralViolation),
            (SandboxError::Cancelled, DiagnosticKind::ResourceExceeded),
            (
                SandboxError::StepLimit { limit: 10 },
                DiagnosticKind::ResourceExceeded,
            ),
            (
                SandboxError::Dom(DomError::DuplicateDocument),
                DiagnosticKind::StructuralViolation,
            ),
            (
                SandboxError::Dom(DomError::ObjectLimit {
                    operation: "doc.add_paragraph()".into(),
                    limit: 5,
                }),
                DiagnosticKind::ResourceExceeded,
            ),
            (
                SandboxError::Dom(DomError::InvalidValue {
                    operation: "run.font.size".into(),
                    value: "Pt(0)".into(),
                    expected: "1-1584pt".into(),
                }),
                DiagnosticKind::TypeMismatch,
            ),
            (SandboxError::Internal("x".into()), DiagnosticKind::InternalFault),
        ];
        for (error, kind) in cases {
            assert_eq!(classify(&error), kind, "{error}");
        }
    }

    #[test]
    fn script_faults_carry_line_and_source() {
        let code = "from docx import Document\ndoc = Document()\n  t.rows[0]\n";
        let d = translate(fault(SandboxError::Index("out of range".into()), 3), code);
        assert_eq!(d.kind, DiagnosticKind::StructuralViolation);
        assert_eq!(d.line, Some(3));
        assert_eq!(d.source.as_deref(), Some("t.rows[0]"));
    }

    #[test]
    fn parse_errors_keep_column() {
        let d = translate(
            Fault::Parse(ParseError::new("unexpected ')'", 1, 5)),
            "x = )\n",
        );
        assert_eq!(d.kind, DiagnosticKind::SyntaxError);
        assert_eq!((d.line, d.column), (Some(1), Some(5)));
        assert_eq!(d.source.as_deref(), Some("x = )"));
    }

    #[test]
    fn serialize_stage_faults() {
        let d = translate(Fault::Finalize(DomError::NoDocument), "x = 1");
        assert_eq!(d.kind, DiagnosticKind::SerializationFailure);
        assert_eq!(d.line, None);

        let d = translate(
            Fault::Package(PackageError::Incomplete("table 0 has no rows".into())),
            "",
        );
        assert_eq!(d.kind, DiagnosticKind::SerializationFailure);

        let d = translate(Fault::OutputTooLarge { size: 10, limit: 5 }, "");
        assert_eq!(d.kind, DiagnosticKind::ResourceExceeded);
    }

    #[test]
    fn panics_become_internal_faults() {
        let payload = std::panic::catch_unwind(|| -> u8 { panic!("boom") }).unwrap_err();
        let fault = Fault::from_panic(payload);
        assert_eq!(fault.stage(), Stage::Execute);
        let d = translate(fault, "");
        assert_eq!(d.kind, DiagnosticKind::InternalFault);
        assert!(d.message.contains("boom"));
        assert!(!d.kind.is_regenerable());
    }
}
