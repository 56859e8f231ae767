//! Streamable-HTTP entry mode for manual testing. Serves the identical tool
//! set as stdio mode, mounted at `/mcp`.

use anyhow::{Context, Result};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::StreamableHttpService;

use plaud_client::Config;

use crate::tools::PlaudService;

pub async fn serve(config: Config, addr: &str) -> Result<()> {
    let service = StreamableHttpService::new(
        move || Ok(PlaudService::new(&config)),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {addr}"))?;
    log::info!("running in HTTP mode on http://{addr}/mcp");

    axum::serve(listener, router)
        .await
        .context("HTTP server terminated")?;
    Ok(())
}
