//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheOptions;

/// Request body for pattern invalidation (POST /invalidate)
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    /// Regular expression source matched against cache keys
    pub pattern: String,
}

impl InvalidateRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.pattern.is_empty() {
            return Some("Pattern cannot be empty".to_string());
        }
        None
    }
}

/// Query string for cached reads (GET /fetch/*path)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchQuery {
    /// Bypass both cache tiers for this request
    #[serde(default)]
    pub skip_cache: bool,
    /// Per-request TTL override in milliseconds
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl FetchQuery {
    pub fn to_options(&self) -> CacheOptions {
        let mut options = CacheOptions::new();
        if let Some(ttl_ms) = self.ttl_ms {
            options = options.with_ttl(Duration::from_millis(ttl_ms));
        }
        if self.skip_cache {
            options = options.skip_cache();
        }
        options
    }
}
