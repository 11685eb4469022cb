//! Subcommand handlers.

use std::io::{self, Read};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use docsmith_dom::{DocumentCodec, DocxCodec};
use docsmith_engine::{Engine, EngineConfig, ExecutionResult};
use tracing::info;

use crate::cli::{LimitArgs, RunArgs};

/// File picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "docsmith.toml";

/// Exit status for a script that ran but produced a diagnostic.
const EXIT_DIAGNOSTIC: u8 = 2;

// ---------------------------------------------------------------------------
// Subcommand: run
// ---------------------------------------------------------------------------

pub async fn cmd_run(args: RunArgs) -> Result<ExitCode> {
    let engine = build_engine(&args.limits)?;
    let code = read_script(&args.script)?;

    match engine.execute_async(code).await {
        ExecutionResult::Success(bytes) => {
            std::fs::write(&args.output, &bytes)
                .with_context(|| format!("failed to write {}", args.output.display()))?;
            info!(
                path = %args.output.display(),
                bytes = bytes.len(),
                "document written"
            );
            Ok(ExitCode::SUCCESS)
        }
        ExecutionResult::Failure(diagnostic) => {
            println!("{}", serde_json::to_string_pretty(&diagnostic)?);
            Ok(ExitCode::from(EXIT_DIAGNOSTIC))
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand: check
// ---------------------------------------------------------------------------

pub fn cmd_check(script: &Path, limits: &LimitArgs) -> Result<ExitCode> {
    let engine = build_engine(limits)?;
    let code = read_script(script)?;

    match engine.check(&code) {
        Ok(()) => {
            println!("ok");
            Ok(ExitCode::SUCCESS)
        }
        Err(diagnostic) => {
            println!("{}", serde_json::to_string_pretty(&diagnostic)?);
            Ok(ExitCode::from(EXIT_DIAGNOSTIC))
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand: inspect
// ---------------------------------------------------------------------------

pub fn cmd_inspect(file: &Path) -> Result<ExitCode> {
    let bytes =
        std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let outline = DocxCodec
        .decode(&bytes)
        .with_context(|| format!("{} is not a readable .docx package", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&outline)?);
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Subcommand: namespace
// ---------------------------------------------------------------------------

pub fn cmd_namespace() -> Result<ExitCode> {
    let description = docsmith_sandbox::describe_namespace();
    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_engine(limits: &LimitArgs) -> Result<Engine> {
    let cwd = std::env::current_dir().context("failed to resolve the working directory")?;
    let config = resolve_config(limits, &cwd, |key| std::env::var(key).ok())?;
    Engine::new(config).context("invalid engine configuration")
}

/// Layer the configuration sources: file, then environment, then flags.
pub fn resolve_config(
    limits: &LimitArgs,
    cwd: &Path,
    var: impl Fn(&str) -> Option<String>,
) -> Result<EngineConfig> {
    let mut config = match &limits.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => {
            let default = cwd.join(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                EngineConfig::load(&default)
                    .with_context(|| format!("failed to load config from {}", default.display()))?
            } else {
                EngineConfig::default()
            }
        }
    };

    config = config
        .with_env_overrides(var)
        .context("invalid DOCSMITH_* environment override")?;

    if let Some(ms) = limits.timeout_ms {
        config = config.with_timeout_ms(ms);
    }
    if let Some(objects) = limits.max_objects {
        config = config.with_max_objects(objects);
    }
    if let Some(bytes) = limits.max_output_bytes {
        config = config.with_max_output_bytes(bytes);
    }
    Ok(config)
}

fn read_script(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut code = String::new();
        io::stdin()
            .read_to_string(&mut code)
            .context("failed to read the script from stdin")?;
        return Ok(code);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_without_any_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = resolve_config(&LimitArgs::default(), dir.path(), no_env).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn working_directory_file_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "timeout_ms = 1234\n").unwrap();
        let config = resolve_config(&LimitArgs::default(), dir.path(), no_env).unwrap();
        assert_eq!(config.timeout_ms, 1234);
    }

    #[test]
    fn flags_beat_environment_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("engine.toml");
        std::fs::write(&file, "timeout_ms = 1000\nmax_objects = 10\nmax_output_bytes = 4096\n")
            .unwrap();
        let limits = LimitArgs {
            config: Some(file),
            timeout_ms: Some(3000),
            ..LimitArgs::default()
        };
        let env = |key: &str| match key {
            "DOCSMITH_TIMEOUT_MS" => Some("2000".to_string()),
            "DOCSMITH_MAX_OBJECTS" => Some("20".to_string()),
            _ => None,
        };
        let config = resolve_config(&limits, dir.path(), env).unwrap();
        assert_eq!(config.timeout_ms, 3000);
        assert_eq!(config.max_objects, 20);
        assert_eq!(config.max_output_bytes, 4096);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let limits = LimitArgs {
            config: Some(PathBuf::from("/nonexistent/docsmith.toml")),
            ..LimitArgs::default()
        };
        let err = resolve_config(&limits, dir.path(), no_env).unwrap_err();
        assert!(format!("{err:#}").contains("failed to load config"));
    }

    #[test]
    fn malformed_environment_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let env = |key: &str| (key == "DOCSMITH_MAX_OBJECTS").then(|| "lots".to_string());
        assert!(resolve_config(&LimitArgs::default(), dir.path(), env).is_err());
    }

    #[test]
    fn inspect_rejects_non_packages() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not.docx");
        std::fs::write(&file, b"plain text").unwrap();
        assert!(cmd_inspect(&file).is_err());
    }
}
