//! SWR Cache Layer - caching proxy in front of a remote JSON API
//!
//! Serves upstream responses through the two-tier cache and exposes
//! invalidation and statistics endpoints.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::{signal, task::JoinHandle};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swr_cache_layer::api::create_router;
use swr_cache_layer::{spawn_invalidation_listener, AppState, Config};

/// Main entry point for the caching proxy.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache manager and upstream client
/// 4. Start the invalidation listener
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swr_cache_layer=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting SWR cache proxy");

    let config = Config::from_env();
    info!(
        "Configuration loaded: ttl={}ms, stale_threshold={}ms, max_entries={}, max_storage={}MB, upstream={}, port={}",
        config.cache.ttl.as_millis(),
        config.cache.stale_threshold.as_millis(),
        config.cache.max_entries,
        config.cache.max_storage_mb,
        config.upstream_url,
        config.server_port
    );

    let state = AppState::from_config(&config).context("failed to initialize cache")?;
    match &config.storage_path {
        Some(path) => info!("Persistent tier backed by {}", path),
        None => info!("Persistent tier held in memory"),
    }

    let listener_handle = spawn_invalidation_listener(state.cache.clone());

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(listener_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the invalidation listener.
async fn shutdown_signal(listener_handle: Option<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    if let Some(handle) = listener_handle {
        handle.abort();
        warn!("Invalidation listener aborted");
    }
}
