//! Sandbox configuration.
//!
//! [`SandboxConfig`] bounds the resources one script execution may consume.
//! Defaults are conservative enough to stop runaway code without rejecting
//! realistic documents, and a builder-style API allows callers to customise
//! individual fields fluently.

use std::time::Duration;

/// Maximum nesting depth for value comparison and rendering.
pub const MAX_VALUE_DEPTH: usize = 32;

/// Resource limits for the script sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Wall-clock budget for one execution, in milliseconds.
    ///
    /// Default: **5 000 ms**.
    pub timeout_ms: u64,

    /// Deterministic evaluation budget: statements, expression nodes, loop
    /// iterations and proportional charges for bulk builtin work.
    ///
    /// Default: **10 000 000**.
    pub max_steps: u64,

    /// Maximum number of document objects the script may create.
    ///
    /// Default: **20 000**.
    pub max_objects: usize,

    /// Maximum number of lists and dicts the script may allocate.
    ///
    /// Default: **100 000**.
    pub max_heap_objects: usize,

    /// Maximum number of elements in one list, dict or materialized range.
    ///
    /// Default: **100 000**.
    pub max_collection_len: usize,

    /// Maximum size of one string value, in bytes.
    ///
    /// Default: **1 MiB**.
    pub max_string_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_steps: 10_000_000,
            max_objects: 20_000,
            max_heap_objects: 100_000,
            max_collection_len: 100_000,
            max_string_bytes: 1024 * 1024,
        }
    }
}

impl SandboxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn with_max_objects(mut self, objects: usize) -> Self {
        self.max_objects = objects;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.timeout_ms, 5_000);
        assert_eq!(cfg.max_steps, 10_000_000);
        assert_eq!(cfg.max_objects, 20_000);
        assert_eq!(cfg.max_string_bytes, 1024 * 1024);
        assert_eq!(cfg.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn builder_chain() {
        let cfg = SandboxConfig::new()
            .with_timeout_ms(250)
            .with_max_steps(1_000)
            .with_max_objects(10)
            .with_max_heap_objects(5)
            .with_max_collection_len(7)
            .with_max_string_bytes(64);
        assert_eq!(cfg.timeout_ms, 250);
        assert_eq!(cfg.max_steps, 1_000);
        assert_eq!(cfg.max_objects, 10);
        assert_eq!(cfg.max_heap_objects, 5);
        assert_eq!(cfg.max_collection_len, 7);
        assert_eq!(cfg.max_string_bytes, 64);
    }
}
