//! Tangle MCP server binary.
//!
//! This binary runs the MCP server using stdio transport.

use tangle_mcp::TangleMcpServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tangle=info,tangle_mcp=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting tangle-mcp server");

    let server = TangleMcpServer::new();
    server.run().await?;

    Ok(())
}
