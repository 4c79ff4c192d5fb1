//! BEDA Cache - HTTP facade over the TTL-aware cache client
//!
//! Serves a cache client built from `BEDA_*` environment settings.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beda_cache::api::{create_router, AppState};
use beda_cache::config::{BackendKind, ServerConfig};
use beda_cache::tasks::spawn_sweep_task;

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache client for the configured backend
/// 4. Start the eager sweep task (in-memory backend only)
/// 5. Serve the HTTP facade until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beda_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting BEDA cache server");

    let config = ServerConfig::from_env();
    let cache = &config.cache;
    info!(
        "Configuration loaded: backend={}, default_ttl={:?}, key_prefix={:?}, max_retries={}, port={}",
        cache.backend, cache.default_ttl, cache.key_prefix, cache.max_retries, config.server_port
    );

    let state = AppState::from_config(cache).context("failed to build cache client")?;
    match state.cache.ping().await {
        Ok(true) => info!("Cache backend reachable"),
        _ => warn!("Cache backend not reachable yet, requests will retry"),
    }

    let sweep_handle = match (cache.backend, cache.sweep_interval) {
        (BackendKind::InMemory, Some(interval)) => Some(spawn_sweep_task(state.cache.clone(), interval)),
        _ => None,
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(sweep_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then stops the sweep task.
async fn shutdown_signal(sweep_handle: Option<tokio::task::JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    if let Some(handle) = sweep_handle {
        handle.abort();
        warn!("Sweep task aborted");
    }
}
