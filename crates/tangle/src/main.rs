//! Tangle CLI binary.

use anyhow::Result;
use tangle::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the tangle CLI.
///
/// Uses tokio's `current_thread` runtime: one command runs per invocation and
/// its I/O is sequential.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Controlled via RUST_LOG, e.g. RUST_LOG=tangle=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tangle=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::debug!("Starting tangle CLI");

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("Tangle CLI completed successfully");
    Ok(())
}
