//! Sandbox runtime.
//!
//! [`SandboxRuntime`] is the entry point for running generated scripts. It
//! holds the [`SandboxConfig`] resource limits and builds a fresh namespace,
//! heap, budget and [`DocumentBuilder`] for every run, so no state survives
//! from one script to the next.

use std::time::Duration;

use docsmith_dom::DocumentBuilder;

use crate::ast::Program;
use crate::budget::CancelToken;
use crate::config::SandboxConfig;
use crate::error::{ParseError, SandboxError, ScriptFault};
use crate::interp::Interp;
use crate::parser;

/// Outcome of a script that ran to completion.
#[derive(Debug)]
pub struct Execution {
    /// The builder the script populated. Not yet finalized.
    pub builder: DocumentBuilder,
    /// Steps charged against the budget.
    pub steps: u64,
    pub elapsed: Duration,
}

/// The script sandbox.
///
/// Cheap to clone and safe to share; each [`run`](Self::run) is fully
/// independent.
#[derive(Debug, Clone, Default)]
pub struct SandboxRuntime {
    config: SandboxConfig,
}

impl SandboxRuntime {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Parse `code` without running anything.
    pub fn parse(&self, code: &str) -> Result<Program, ParseError> {
        parser::parse(code)
    }

    /// Execute a parsed program once against a fresh document builder.
    ///
    /// The run stops at the first fault. Cancelling `token` from another
    /// thread stops it within a bounded number of steps.
    pub fn run(&self, program: &Program, token: &CancelToken) -> Result<Execution, ScriptFault> {
        let mut interp = Interp::new(&self.config, token.clone());
        let outcome = interp.run(program);
        let steps = interp.budget.steps();
        let elapsed = interp.budget.elapsed();

        match outcome {
            Ok(()) => {
                tracing::debug!(
                    steps,
                    elapsed_ms = elapsed.as_millis() as u64,
                    objects = interp.builder.object_count(),
                    "script finished"
                );
                Ok(Execution {
                    builder: interp.into_builder(),
                    steps,
                    elapsed,
                })
            }
            Err(fault) => {
                tracing::debug!(
                    steps,
                    elapsed_ms = elapsed.as_millis() as u64,
                    line = fault.line,
                    error = %fault.error,
                    "script faulted"
                );
                Err(fault)
            }
        }
    }

    /// Parse and run in one call. Syntax errors come back as a fault.
    pub fn execute(&self, code: &str, token: &CancelToken) -> Result<Execution, ScriptFault> {
        let program = self
            .parse(code)
            .map_err(|e| ScriptFault::from(SandboxError::from(e)))?;
        self.run(&program, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_runtime_with_custom_config() {
        let rt = SandboxRuntime::new(SandboxConfig::new().with_max_steps(42));
        assert_eq!(rt.config().max_steps, 42);
    }

    #[test]
    fn run_returns_populated_builder() {
        let rt = SandboxRuntime::default();
        let exec = rt
            .execute(
                "from docx import Document\ndoc = Document()\ndoc.add_paragraph('hi')\n",
                &CancelToken::new(),
            )
            .unwrap();
        assert!(exec.steps > 0);
        assert_eq!(exec.builder.body_paragraphs().len(), 1);
    }

    #[test]
    fn runs_do_not_share_state() {
        let rt = SandboxRuntime::default();
        let code = "from docx import Document\ndoc = Document()\nx = 1\n";
        rt.execute(code, &CancelToken::new()).unwrap();
        // A second Document() would be a duplicate if the builder leaked.
        rt.execute(code, &CancelToken::new()).unwrap();
        let fault = rt.execute("y = x\n", &CancelToken::new()).unwrap_err();
        assert!(matches!(fault.error, SandboxError::UndefinedName(ref n) if n == "x"));
    }

    #[test]
    fn syntax_errors_carry_their_line() {
        let rt = SandboxRuntime::default();
        let fault = rt.execute("x = 1\ny = (\n", &CancelToken::new()).unwrap_err();
        assert!(matches!(fault.error, SandboxError::Syntax(_)));
        assert!(fault.line.is_some());
    }

    #[test]
    fn cancelled_token_stops_a_tight_loop() {
        let rt = SandboxRuntime::default();
        let token = CancelToken::new();
        token.cancel();
        let fault = rt.execute("while True:\n    pass\n", &token).unwrap_err();
        assert_eq!(fault.error, SandboxError::Cancelled);
        assert!(fault.line.is_some());
    }
}
