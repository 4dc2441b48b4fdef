//! Reqtrace MCP server binary.
//!
//! This binary runs the MCP server using stdio transport.

use reqtrace_mcp::ReqtraceMcpServer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Stdout carries the MCP protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting reqtrace-mcp server");

    let server = ReqtraceMcpServer::new();
    server.run().await?;

    Ok(())
}
