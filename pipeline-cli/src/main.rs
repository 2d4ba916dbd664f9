//! Binary crate for the `weather-pipeline` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments (one subcommand per pipeline stage)
//! - Loading configuration from the environment once at startup
//! - Human-friendly output formatting

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
