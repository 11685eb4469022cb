//! Engine configuration.
//!
//! [`EngineConfig`] is the resource envelope for one execution. It can be
//! built in code with the `with_*` setters, read from a TOML file, and
//! overridden from `DOCSMITH_*` environment variables. Every limit must be
//! non-zero; [`EngineConfig::validate`] enforces that before an
//! [`Engine`](crate::Engine) is created.

use std::path::Path;
use std::time::Duration;

use docsmith_sandbox::SandboxConfig;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Environment variable overriding [`EngineConfig::timeout_ms`].
pub const ENV_TIMEOUT_MS: &str = "DOCSMITH_TIMEOUT_MS";
/// Environment variable overriding [`EngineConfig::max_objects`].
pub const ENV_MAX_OBJECTS: &str = "DOCSMITH_MAX_OBJECTS";
/// Environment variable overriding [`EngineConfig::max_output_bytes`].
pub const ENV_MAX_OUTPUT_BYTES: &str = "DOCSMITH_MAX_OUTPUT_BYTES";

/// Resource limits for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Wall-clock deadline for the execute stage, in milliseconds.
    ///
    /// Default: **5 000 ms**.
    pub timeout_ms: u64,

    /// Maximum document objects (sections, paragraphs, runs, tables, rows,
    /// cells) one script may create.
    ///
    /// Default: **20 000**.
    pub max_objects: usize,

    /// Maximum size of the serialized package.
    ///
    /// Default: **16 MiB**.
    pub max_output_bytes: usize,

    /// Maximum size of the submitted code.
    ///
    /// Default: **256 KiB**.
    pub max_code_bytes: usize,

    /// Deterministic evaluation step budget.
    ///
    /// Default: **10 000 000**.
    pub max_steps: u64,

    /// Lists and dicts a script may allocate.
    pub max_heap_objects: usize,

    /// Elements in one list, dict or materialized range.
    pub max_collection_len: usize,

    /// Bytes in one string value.
    pub max_string_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_objects: 20_000,
            max_output_bytes: 16 * 1024 * 1024,
            max_code_bytes: 256 * 1024,
            max_steps: 10_000_000,
            max_heap_objects: 100_000,
            max_collection_len: 100_000,
            max_string_bytes: 1024 * 1024,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Loading ------------------------------------------------------------

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Apply `DOCSMITH_*` overrides looked up through `var`.
    ///
    /// Takes the lookup as a function so callers can pass
    /// `|k| std::env::var(k).ok()` or a fixed map in tests.
    pub fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = var(ENV_TIMEOUT_MS) {
            self.timeout_ms = parse_override("timeout_ms", &value)?;
        }
        if let Some(value) = var(ENV_MAX_OBJECTS) {
            self.max_objects = parse_override("max_objects", &value)?;
        }
        if let Some(value) = var(ENV_MAX_OUTPUT_BYTES) {
            self.max_output_bytes = parse_override("max_output_bytes", &value)?;
        }
        Ok(self)
    }

    // -- Validation ---------------------------------------------------------

    /// Reject zero limits.
    pub fn validate(&self) -> Result<()> {
        let limits: [(&'static str, u64); 8] = [
            ("timeout_ms", self.timeout_ms),
            ("max_objects", self.max_objects as u64),
            ("max_output_bytes", self.max_output_bytes as u64),
            ("max_code_bytes", self.max_code_bytes as u64),
            ("max_steps", self.max_steps),
            ("max_heap_objects", self.max_heap_objects as u64),
            ("max_collection_len", self.max_collection_len as u64),
            ("max_string_bytes", self.max_string_bytes as u64),
        ];
        for (field, value) in limits {
            if value == 0 {
                return Err(EngineError::InvalidConfig {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The sandbox half of the envelope.
    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig::new()
            .with_timeout_ms(self.timeout_ms)
            .with_max_steps(self.max_steps)
            .with_max_objects(self.max_objects)
            .with_max_heap_objects(self.max_heap_objects)
            .with_max_collection_len(self.max_collection_len)
            .with_max_string_bytes(self.max_string_bytes)
    }

    // -- Builder ------------------------------------------------------------

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_max_objects(mut self, objects: usize) -> Self {
        self.max_objects = objects;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn with_max_code_bytes(mut self, bytes: usize) -> Self {
        self.max_code_bytes = bytes;
        self
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn with_max_heap_objects(mut self, objects: usize) -> Self {
        self.max_heap_objects = objects;
        self
    }

    pub fn with_max_collection_len(mut self, len: usize) -> Self {
        self.max_collection_len = len;
        self
    }

    pub fn with_max_string_bytes(mut self, bytes: usize) -> Self {
        self.max_string_bytes = bytes;
        self
    }
}

fn parse_override<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| EngineError::InvalidConfig {
            field,
            reason: format!("expects a non-negative integer, got '{value}'"),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_documented_envelope() {
        let c = EngineConfig::default();
        assert_eq!(c.timeout_ms, 5_000);
        assert_eq!(c.max_objects, 20_000);
        assert_eq!(c.max_output_bytes, 16 * 1024 * 1024);
        assert_eq!(c.max_code_bytes, 256 * 1024);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn toml_keeps_defaults_for_missing_keys() {
        let c = EngineConfig::from_toml_str("timeout_ms = 750\nmax_objects = 10\n").unwrap();
        assert_eq!(c.timeout_ms, 750);
        assert_eq!(c.max_objects, 10);
        assert_eq!(c.max_steps, EngineConfig::default().max_steps);
    }

    #[test]
    fn toml_rejects_unknown_keys_and_zero() {
        assert!(matches!(
            EngineConfig::from_toml_str("timeout = 5"),
            Err(EngineError::ConfigParse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("max_steps = 0"),
            Err(EngineError::InvalidConfig { field: "max_steps", .. })
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docsmith.toml");
        std::fs::write(&path, "max_output_bytes = 4096\n").unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().max_output_bytes, 4096);

        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            EngineConfig::load(&missing),
            Err(EngineError::ConfigRead { .. })
        ));
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        let vars: HashMap<&str, &str> = [(ENV_TIMEOUT_MS, "1200"), (ENV_MAX_OBJECTS, " 64 ")]
            .into_iter()
            .collect();
        let c = EngineConfig::new()
            .with_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(c.timeout_ms, 1200);
        assert_eq!(c.max_objects, 64);

        let err = EngineConfig::new()
            .with_env_overrides(|k| (k == ENV_MAX_OUTPUT_BYTES).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("max_output_bytes"));
    }

    #[test]
    fn sandbox_config_carries_limits() {
        let s = EngineConfig::new()
            .with_timeout_ms(42)
            .with_max_objects(7)
            .sandbox_config();
        assert_eq!(s.timeout_ms, 42);
        assert_eq!(s.max_objects, 7);
    }
}
