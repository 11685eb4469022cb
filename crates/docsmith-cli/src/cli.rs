//! Command-line definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// docsmith: run generated document scripts in a sandbox.
#[derive(Debug, Parser)]
#[command(
    name = "docsmith",
    version,
    about = "Run generated document scripts and assemble .docx packages",
    long_about = "Executes python-docx style scripts inside a capability sandbox and \
                  writes the resulting .docx package, or prints a structured diagnostic \
                  describing why the script failed."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a script and write the document package.
    Run(RunArgs),

    /// Parse a script without executing it.
    Check {
        /// Script file, or `-` for stdin.
        script: PathBuf,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Print the outline of a .docx package as JSON.
    Inspect {
        /// Package to decode.
        file: PathBuf,
    },

    /// List the names and modules scripts may use.
    Namespace,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Script file, or `-` for stdin.
    pub script: PathBuf,

    /// Where to write the .docx package.
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub limits: LimitArgs,
}

/// Flags that override the engine configuration.
#[derive(Debug, Default, Args)]
pub struct LimitArgs {
    /// Engine configuration file (defaults to ./docsmith.toml when present).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Wall-clock limit for one execution.
    #[arg(long, value_name = "N")]
    pub timeout_ms: Option<u64>,

    /// Maximum number of document objects a script may create.
    #[arg(long, value_name = "N")]
    pub max_objects: Option<usize>,

    /// Maximum size of the produced package.
    #[arg(long, value_name = "N")]
    pub max_output_bytes: Option<usize>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_output_and_limits() {
        let cli = Cli::parse_from([
            "docsmith",
            "run",
            "report.py",
            "-o",
            "out.docx",
            "--timeout-ms",
            "250",
            "--max-objects",
            "40",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.script, PathBuf::from("report.py"));
        assert_eq!(args.output, PathBuf::from("out.docx"));
        assert_eq!(args.limits.timeout_ms, Some(250));
        assert_eq!(args.limits.max_objects, Some(40));
        assert_eq!(args.limits.max_output_bytes, None);
    }

    #[test]
    fn run_requires_output() {
        assert!(Cli::try_parse_from(["docsmith", "run", "report.py"]).is_err());
    }

    #[test]
    fn stdin_script_is_a_dash() {
        let cli = Cli::parse_from(["docsmith", "check", "-"]);
        assert!(matches!(cli.command, Commands::Check { ref script, .. } if script.as_os_str() == "-"));
    }
}
