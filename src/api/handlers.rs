//! API Handlers
//!
//! HTTP request handlers for the caching proxy and its admin endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;

use crate::bus::SharedOrigin;
use crate::cache::{CacheManager, CacheSnapshot};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    ClearResponse, FetchQuery, HealthResponse, InvalidateKeyResponse, InvalidatePatternResponse,
    InvalidateRequest,
};
use crate::storage::{FileStorage, MemoryStorage, StorageBackend};
use crate::upstream::UpstreamClient;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Request cache in front of the upstream API
    pub cache: CacheManager,
    /// Remote API client used as the cache fetcher
    pub upstream: UpstreamClient,
}

impl AppState {
    /// Creates a new AppState from its parts.
    pub fn new(cache: CacheManager, upstream: UpstreamClient) -> Self {
        Self { cache, upstream }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Opens the durable storage file when one is configured. The manager
    /// joins a storage-change origin so invalidations reach its listener.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage: Arc<dyn StorageBackend> = match &config.storage_path {
            Some(path) => Arc::new(FileStorage::open(path, None)?),
            None => Arc::new(MemoryStorage::new()),
        };
        let origin = SharedOrigin::new(storage);

        let cache = CacheManager::builder(config.cache.clone())
            .storage(origin.storage())
            .transport(origin.transport())
            .build();
        let upstream = UpstreamClient::new(config.upstream_url.as_str())?;

        Ok(Self::new(cache, upstream))
    }
}

/// Handler for GET /fetch/*path
///
/// Returns the upstream JSON for `path`, served through the cache.
pub async fn fetch_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<FetchQuery>,
) -> Result<Json<Value>> {
    let key = path.trim_matches('/').to_string();
    if key.is_empty() {
        return Err(CacheError::InvalidRequest("Path cannot be empty".to_string()));
    }

    let upstream = state.upstream.clone();
    let upstream_path = key.clone();
    let value = state
        .cache
        .get(
            &key,
            move || async move { upstream.fetch_json(&upstream_path).await },
            query.to_options(),
        )
        .await?;

    Ok(Json(value))
}

/// Handler for DELETE /cache/:key
pub async fn invalidate_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<InvalidateKeyResponse> {
    state.cache.invalidate(&key).await;
    Json(InvalidateKeyResponse::new(key))
}

/// Handler for POST /invalidate
///
/// Removes every key matching the pattern and broadcasts the invalidation.
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidatePatternResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let removed = state.cache.invalidate_pattern(&req.pattern).await?;
    Ok(Json(InvalidatePatternResponse::new(req.pattern, removed)))
}

/// Handler for DELETE /cache
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.cache.clear().await;
    Json(ClearResponse::cleared())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<CacheSnapshot> {
    Json(state.cache.stats().await)
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
