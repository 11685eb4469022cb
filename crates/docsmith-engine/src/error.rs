//! Engine error types.
//!
//! [`EngineError`] covers engine construction and configuration. Script,
//! facade and package faults never surface through it: they are translated
//! into a [`Diagnostic`](crate::Diagnostic) inside the execution result.

use std::path::PathBuf;

/// Unified error type for the docsmith engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // -- Configuration ------------------------------------------------------
    /// A configuration value is outside its accepted range.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// The configuration file is not valid TOML for [`EngineConfig`](crate::EngineConfig).
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("failed to read configuration file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    // -- Serialization ------------------------------------------------------
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_names_the_field() {
        let err = EngineError::InvalidConfig {
            field: "timeout_ms",
            reason: "must be greater than zero".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid configuration: timeout_ms must be greater than zero"
        );
    }

    #[test]
    fn parse_errors_convert() {
        let err: EngineError = toml::from_str::<toml::Value>("timeout_ms = ")
            .unwrap_err()
            .into();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }
}
