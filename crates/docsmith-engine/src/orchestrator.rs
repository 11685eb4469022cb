//! Execution orchestrator.
//!
//! [`Engine`] drives one submission through validate, parse, execute and
//! serialize, strictly in that order and exactly once. Each stage either
//! hands its output to the next or stops the pipeline with a [`Fault`],
//! which the translator turns into the [`Diagnostic`] of the result. Bytes
//! are only returned when every stage succeeded.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use docsmith_dom::{DocumentCodec, DocxCodec};
use docsmith_sandbox::{CancelToken, SandboxRuntime};

use crate::config::EngineConfig;
use crate::diagnostic::{Diagnostic, ExecutionResult};
use crate::error::Result;
use crate::translator::{Fault, Stage, translate};

/// Extra time the async backstop allows beyond `timeout_ms` before it
/// cancels the worker itself.
const BACKSTOP_GRACE: Duration = Duration::from_millis(500);

/// The document-generation engine.
///
/// Cheap to clone; clones share the codec and every execution builds its
/// own sandbox state, so concurrent executions are independent.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    sandbox: SandboxRuntime,
    codec: Arc<dyn DocumentCodec>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("codec", &self.codec.name())
            .finish()
    }
}

impl Engine {
    /// Create an engine after validating `config`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let sandbox = SandboxRuntime::new(config.sandbox_config());
        tracing::info!(
            timeout_ms = config.timeout_ms,
            max_objects = config.max_objects,
            max_steps = config.max_steps,
            "engine initialized"
        );
        Ok(Self {
            config,
            sandbox,
            codec: Arc::new(DocxCodec),
        })
    }

    /// Create an engine with the default envelope.
    pub fn with_defaults() -> Result<Self> {
        Self::new(EngineConfig::default())
    }

    /// Replace the package codec.
    pub fn with_codec(mut self, codec: Arc<dyn DocumentCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn codec(&self) -> &dyn DocumentCodec {
        self.codec.as_ref()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Run `code` to completion on the calling thread.
    pub fn execute(&self, code: &str) -> ExecutionResult {
        self.execute_with_token(code, &CancelToken::new())
    }

    /// Run `code` on the calling thread; cancelling `token` stops it at the
    /// next budget poll.
    pub fn execute_with_token(&self, code: &str, token: &CancelToken) -> ExecutionResult {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.pipeline(code, token)))
            .unwrap_or_else(|payload| Err(Fault::from_panic(payload)));
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(bytes) => {
                tracing::info!(
                    code_bytes = code.len(),
                    output_bytes = bytes.len(),
                    elapsed_ms,
                    "execution succeeded"
                );
                ExecutionResult::Success(bytes)
            }
            Err(fault) => {
                let stage = fault.stage();
                let diagnostic = translate(fault, code);
                tracing::info!(
                    stage = stage.as_str(),
                    code_bytes = code.len(),
                    elapsed_ms,
                    kind = diagnostic.kind.as_str(),
                    line = diagnostic.line,
                    "execution failed"
                );
                ExecutionResult::Failure(diagnostic)
            }
        }
    }

    /// Run `code` on a blocking worker.
    ///
    /// Dropping the returned future cancels the run. If the worker is still
    /// busy `timeout_ms` plus a grace period after it started, it is
    /// cancelled and joined before this returns.
    pub async fn execute_async(&self, code: impl Into<String>) -> ExecutionResult {
        let code: Arc<str> = Arc::from(code.into());
        let token = CancelToken::new();
        let guard = CancelOnDrop::new(token.clone());

        let engine = self.clone();
        let worker_code = Arc::clone(&code);
        let worker_token = token.clone();
        let mut worker = tokio::task::spawn_blocking(move || {
            engine.execute_with_token(&worker_code, &worker_token)
        });

        let backstop = self.config.timeout() + BACKSTOP_GRACE;
        let joined = match tokio::time::timeout(backstop, &mut worker).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    backstop_ms = backstop.as_millis() as u64,
                    "execution outlived its deadline, cancelling worker"
                );
                token.cancel();
                worker.await
            }
        };
        guard.disarm();

        match joined {
            Ok(result) => result,
            Err(e) => {
                let fault = if e.is_panic() {
                    Fault::from_panic(e.into_panic())
                } else {
                    Fault::Worker(e.to_string())
                };
                ExecutionResult::Failure(translate(fault, &code))
            }
        }
    }

    /// Validate and parse `code` without executing it.
    pub fn check(&self, code: &str) -> std::result::Result<(), Diagnostic> {
        self.validate_input(code)
            .and_then(|()| self.sandbox.parse(code).map(drop).map_err(Fault::Parse))
            .map_err(|fault| translate(fault, code))
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    fn pipeline(&self, code: &str, token: &CancelToken) -> std::result::Result<Vec<u8>, Fault> {
        self.validate_input(code)?;

        let started = Instant::now();
        let program = self.sandbox.parse(code).map_err(Fault::Parse)?;
        log_stage(Stage::Parse, started);

        let started = Instant::now();
        let execution = self.sandbox.run(&program, token).map_err(Fault::Script)?;
        tracing::debug!(steps = execution.steps, "script executed");
        log_stage(Stage::Execute, started);

        let started = Instant::now();
        let mut builder = execution.builder;
        let tree = builder.finalize().map_err(Fault::Finalize)?;
        let bytes = self.codec.encode(&tree).map_err(Fault::Package)?;
        if bytes.len() > self.config.max_output_bytes {
            return Err(Fault::OutputTooLarge {
                size: bytes.len(),
                limit: self.config.max_output_bytes,
            });
        }
        log_stage(Stage::Serialize, started);
        Ok(bytes)
    }

    fn validate_input(&self, code: &str) -> std::result::Result<(), Fault> {
        if code.len() > self.config.max_code_bytes {
            return Err(Fault::CodeTooLarge {
                size: code.len(),
                limit: self.config.max_code_bytes,
            });
        }
        if code.trim().is_empty() {
            return Err(Fault::EmptyCode);
        }
        Ok(())
    }
}

fn log_stage(stage: Stage, started: Instant) {
    tracing::debug!(
        stage = stage.as_str(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stage complete"
    );
}

/// Cancels its token when dropped unless disarmed first.
struct CancelOnDrop {
    token: Option<CancelToken>,
}

impl CancelOnDrop {
    fn new(token: CancelToken) -> Self {
        Self { token: Some(token) }
    }

    fn disarm(mut self) {
        self.token = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            tracing::debug!("execution future dropped, cancelling worker");
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use docsmith_dom::{DocumentOutline, DocumentTree, PackageError};

    use super::*;
    use crate::diagnostic::DiagnosticKind;

    const HELLO: &str = "from docx import Document\ndoc = Document()\ndoc.add_paragraph('hello')\n";

    fn engine() -> Engine {
        Engine::with_defaults().unwrap()
    }

    fn kind(result: &ExecutionResult) -> Option<DiagnosticKind> {
        result.diagnostic().map(|d| d.kind)
    }

    #[test]
    fn rejects_zero_limits() {
        assert!(Engine::new(EngineConfig::new().with_timeout_ms(0)).is_err());
    }

    #[test]
    fn empty_input_is_structural_without_running() {
        for code in ["", "   \n\t\n"] {
            assert_eq!(
                kind(&engine().execute(code)),
                Some(DiagnosticKind::StructuralViolation)
            );
        }
    }

    #[test]
    fn oversized_code_is_rejected_before_parsing() {
        let engine = Engine::new(EngineConfig::new().with_max_code_bytes(16)).unwrap();
        let result = engine.execute("x = (((((((((((((((((((");
        assert_eq!(kind(&result), Some(DiagnosticKind::ResourceExceeded));
    }

    #[test]
    fn success_returns_zip_bytes() {
        let bytes = engine().execute(HELLO).into_result().unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn missing_document_is_a_serialization_failure() {
        let result = engine().execute("x = 1\n");
        assert_eq!(kind(&result), Some(DiagnosticKind::SerializationFailure));
    }

    #[test]
    fn output_cap_withholds_bytes() {
        let engine = Engine::new(EngineConfig::new().with_max_output_bytes(64)).unwrap();
        let result = engine.execute(HELLO);
        assert_eq!(kind(&result), Some(DiagnosticKind::ResourceExceeded));
        assert!(result.bytes().is_none());
    }

    #[test]
    fn check_parses_without_running() {
        let engine = engine();
        assert!(engine.check("open('x')\n").is_ok());
        let d = engine.check("if True\n    pass\n").unwrap_err();
        assert_eq!(d.kind, DiagnosticKind::SyntaxError);
        assert_eq!(d.line, Some(1));
    }

    struct PanickingCodec;

    impl DocumentCodec for PanickingCodec {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn encode(&self, _tree: &DocumentTree) -> std::result::Result<Vec<u8>, PackageError> {
            panic!("codec exploded")
        }

        fn decode(&self, _bytes: &[u8]) -> std::result::Result<DocumentOutline, PackageError> {
            Err(PackageError::Malformed("not supported".into()))
        }
    }

    #[test]
    fn panics_are_internal_faults() {
        let engine = engine().with_codec(Arc::new(PanickingCodec));
        let result = engine.execute(HELLO);
        let diagnostic = result.diagnostic().unwrap();
        assert_eq!(diagnostic.kind, DiagnosticKind::InternalFault);
        assert!(diagnostic.message.contains("codec exploded"));
    }

    #[test]
    fn engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Engine>();
    }

    #[tokio::test]
    async fn async_execution_matches_sync() {
        let engine = engine();
        let sync = engine.execute(HELLO);
        let asynchronous = engine.execute_async(HELLO).await;
        assert_eq!(sync, asynchronous);
    }

    #[tokio::test]
    async fn async_deadline_stops_tight_loop() {
        let engine = Engine::new(
            EngineConfig::new()
                .with_timeout_ms(100)
                .with_max_steps(u64::MAX),
        )
        .unwrap();
        let result = engine.execute_async("while True:\n    pass\n").await;
        assert_eq!(kind(&result), Some(DiagnosticKind::ResourceExceeded));
    }
}
