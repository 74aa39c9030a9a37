//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

/// Response body for key invalidation (DELETE /cache/:key)
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateKeyResponse {
    /// Success message
    pub message: String,
    /// The key that was invalidated
    pub key: String,
}

impl InvalidateKeyResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' invalidated", key),
            key,
        }
    }
}

/// Response body for pattern invalidation (POST /invalidate)
#[derive(Debug, Clone, Serialize)]
pub struct InvalidatePatternResponse {
    /// Success message
    pub message: String,
    /// The pattern that was applied
    pub pattern: String,
    /// Keys removed by this server
    pub removed: usize,
}

impl InvalidatePatternResponse {
    pub fn new(pattern: impl Into<String>, removed: usize) -> Self {
        let pattern = pattern.into();
        Self {
            message: format!("Invalidated {} keys matching '{}'", removed, pattern),
            pattern,
            removed,
        }
    }
}

/// Response body for a full reset (DELETE /cache)
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
}

impl ClearResponse {
    pub fn cleared() -> Self {
        Self {
            message: "Cache cleared".to_string(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
