//! CLI entry point for docsmith.
//!
//! This binary provides the `docsmith` command with subcommands for running
//! and checking generated scripts, inspecting packages and listing the
//! sandbox namespace.

mod cli;
mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env file is not an error.
    dotenvy::dotenv().ok();
    init_tracing("info");

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::cmd_run(args).await,
        Commands::Check { script, limits } => commands::cmd_check(&script, &limits),
        Commands::Inspect { file } => commands::cmd_inspect(&file),
        Commands::Namespace => commands::cmd_namespace(),
    }
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
