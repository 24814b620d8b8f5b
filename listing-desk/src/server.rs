//! HTTP server.
//!
//! Binds the listener, serves the API router and shuts down cleanly on Ctrl-C.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::api::{AppState, http_router};

/// Configuration for the HTTP server
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

/// Start the HTTP server and run until a shutdown signal arrives.
pub async fn run_server(config: ServerConfig, state: Arc<AppState>) -> Result<()> {
    let app = http_router(state);

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    info!(addr = %config.listen_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, keep serving until the process is killed
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
