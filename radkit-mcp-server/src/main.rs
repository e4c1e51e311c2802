//! radkit-mcp server
//!
//! Exposes the remote service's device inventory and CLI execution as MCP
//! tools over stdio or HTTP.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use radkit_mcp_utils::{LogConfig, RadkitError, Result};

mod blocking;
mod config;
mod dispatch;
mod fleet;
mod mcp;
mod session;
#[cfg(test)]
mod testing;

use blocking::BlockingBridge;
use config::{ConfigLoader, ServerConfig, TransportMode};
use dispatch::ToolDispatcher;
use fleet::HttpConnector;
use mcp::{run_http, McpServer};
use session::SessionManager;

/// Blocking threads beyond the worker pool, for stdin/stdout and DNS lookups
const BLOCKING_HEADROOM: usize = 4;

/// How long in-flight blocking work may delay process exit
const EXIT_GRACE: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();

    // stdout belongs to the stdio transport
    radkit_mcp_utils::init_logging_with_config(LogConfig::mcp_server())?;

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Failed to load environment file"),
    }

    let config = ConfigLoader::load_and_validate().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(config.service.max_workers + BLOCKING_HEADROOM)
        .thread_name("radkit-mcp")
        .build()?;

    let result = runtime.block_on(run(config));

    // A blocked stdin read or hung remote call must not hold the process open
    runtime.shutdown_timeout(EXIT_GRACE);

    if let Err(e) = &result {
        error!(error = %e, "Server exited with error");
    }
    result
}

async fn run(config: ServerConfig) -> Result<()> {
    info!(
        username = %config.service.username,
        transport = %config.transport.mode,
        "RADKit MCP server starting"
    );

    let connector = HttpConnector::new(&config.service.base_url, config.service.call_timeout())
        .map_err(|e| RadkitError::config(e.to_string()))?;
    let bridge = BlockingBridge::new(config.service.max_workers, config.service.call_timeout());
    debug!(
        max_workers = bridge.max_workers(),
        call_timeout = ?bridge.call_timeout(),
        "Worker pool ready"
    );

    let sessions = Arc::new(SessionManager::new(
        connector,
        config.service.credentials(),
        bridge.clone(),
    ));
    let server = Arc::new(McpServer::new(ToolDispatcher::new(Arc::clone(&sessions), bridge)));

    let served = match config.transport.mode {
        TransportMode::Stdio => {
            info!("Starting MCP server with stdio transport");
            let stdin = BufReader::new(tokio::io::stdin());
            tokio::select! {
                result = Arc::clone(&server).serve(stdin, tokio::io::stdout()) => result,
                _ = shutdown_signal() => Ok(()),
            }
        }
        TransportMode::Http => {
            let addr = config.transport.bind_addr();
            info!(addr = %addr, "Starting MCP server with HTTP transport");
            let listener = TcpListener::bind(&addr)
                .await
                .map_err(|e| RadkitError::transport(format!("failed to bind {}: {}", addr, e)))?;
            run_http(server, listener, shutdown_signal()).await
        }
    };

    sessions.shutdown().await;
    info!("RADKit MCP server stopped");

    served.map_err(|e| RadkitError::transport(e.to_string()))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received interrupt, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for interrupt");
            std::future::pending::<()>().await;
        }
    }
}
