//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache layer and its HTTP surface.
///
/// Most of these never reach a `get` caller: the manager recovers from
/// storage and serialization failures locally and only logs them.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Persistent storage refused a write because it is full
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Payload could not be converted to or from JSON
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalidation pattern is not a valid regular expression
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Filesystem failure in a durable storage backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage backend failure other than quota
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote API call failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidRequest(_) | CacheError::InvalidPattern(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::Upstream(_) => StatusCode::BAD_GATEWAY,
            CacheError::QuotaExceeded(_) => StatusCode::INSUFFICIENT_STORAGE,
            CacheError::Serialization(_) | CacheError::Io(_) | CacheError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
