//! API Routes
//!
//! Configures the Axum router with the proxy and admin endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, fetch_handler, health_handler, invalidate_key_handler,
    invalidate_pattern_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /fetch/*path` - Upstream JSON through the cache
/// - `DELETE /cache/:key` - Invalidate one key
/// - `DELETE /cache` - Clear both tiers
/// - `POST /invalidate` - Invalidate keys matching a pattern
/// - `GET /stats` - Cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/fetch/*path", get(fetch_handler))
        .route("/cache", delete(clear_handler))
        .route("/cache/:key", delete(invalidate_key_handler))
        .route("/invalidate", post(invalidate_pattern_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
