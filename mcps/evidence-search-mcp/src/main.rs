//! Evidence Search MCP Server
//!
//! Multi-backend evidence search over stdio.
//!
//! # Configuration
//! Set `EVIDENCE_SEARCH_CONFIG_PATH` or configure in `~/.binks/evidence-search.toml`

use rmcp::{transport::stdio, ServiceExt};

use evidence_search_mcp::{Config, EvidenceSearchMcpServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mcp_common::init_tracing("evidence_search_mcp")?;

    tracing::info!("Starting Evidence Search MCP Server");

    let config = Config::load()?;
    tracing::info!(
        baseline = %config.search.baseline_backend,
        backends = config.backends.values().filter(|b| b.enabled).count(),
        "Configuration loaded"
    );

    let server = EvidenceSearchMcpServer::new(config)?;
    let service = server.serve(stdio()).await?;

    tracing::info!("Server running, waiting for requests...");
    service.waiting().await?;

    tracing::info!("Server shutting down");
    Ok(())
}
