//! vsync - Vault secrets replicator
//!
//! Copies every KV v2 secret under a path from one Vault instance to
//! another. Built for keeping a disaster-recovery Vault in step.
//!
//! Exit status is 0 only when every secret was replicated. Fatal errors
//! and runs with failed paths exit with 1.

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize logging (stderr, so --json output stays clean)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vsync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new()?;
    let clean = rt.block_on(async { run_command(cli.command).await })?;

    if !clean {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_command(command: Commands) -> Result<bool> {
    match command {
        Commands::Kv(args) => cli::cmd_kv(args).await,
    }
}
