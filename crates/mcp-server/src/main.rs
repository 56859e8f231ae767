//! Plaud MCP Server
//!
//! Exposes Plaud recordings, transcripts, and AI summaries to AI agents via
//! the MCP protocol. Authentication is borrowed from the locally installed
//! Plaud Desktop app; no API credentials are needed.
//!
//! ## Tools
//!
//! - `check_connection` - verify the desktop bridge end to end
//! - `get_file_count` / `get_recent_files` / `get_files` / `get_file`
//! - `get_transcript` / `get_summary`
//! - `search_transcripts` - client-side search over recent transcripts
//!
//! ## Usage
//!
//! Add to your MCP client configuration:
//! ```json
//! {
//!   "mcpServers": {
//!     "plaud": {
//!       "command": "plaud-mcp"
//!     }
//!   }
//! }
//! ```
//!
//! Pass `--http [addr]` to serve the same tool set over streamable HTTP for
//! manual testing.

use std::sync::Arc;

use anyhow::Result;
use rmcp::transport::stdio;
use rmcp::ServiceExt;

mod http;
mod tools;

use plaud_client::{Config, PlaudClient};
use tools::PlaudService;

#[tokio::main]
async fn main() -> Result<()> {
    // Configure logging to stderr only (stdout is for MCP protocol)
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("PLAUD_LOG_LEVEL", "info"),
    )
    .target(env_logger::Target::Stderr)
    .init();

    let config = Config::from_env();

    log::info!("starting Plaud MCP server");

    // Fail soft when the desktop app is missing: warn once at startup, then
    // let each call return a structured error instead of a dead server.
    let client = Arc::new(PlaudClient::new(&config));
    match client.ensure_session().await {
        Ok(session) => {
            log::info!("Plaud connection available via {} strategy", session.strategy_name())
        }
        Err(e) => log::warn!(
            "no Plaud auth source available at startup ({e}); tools will report errors until \
             Plaud Desktop is running and signed in"
        ),
    }

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("--http") => {
            let addr = args.next().unwrap_or_else(|| config.http_addr.clone());
            http::serve(config, &addr).await?;
        }
        Some(other) => {
            anyhow::bail!("unknown argument '{other}', expected --http [addr]");
        }
        None => {
            log::info!("running in stdio mode");
            let server = PlaudService::with_client(client).serve(stdio()).await?;
            server.waiting().await?;
        }
    }

    log::info!("Plaud MCP server stopped");
    Ok(())
}
