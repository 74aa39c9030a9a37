//! Upstream Module
//!
//! Client for the remote API whose responses the server caches.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::{CacheError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON-over-HTTP client for the remote API.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CacheError::Upstream(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches `GET {base_url}/{path}` and decodes the body as JSON.
    ///
    /// Non-success statuses are errors.
    pub async fn fetch_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("Fetching {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CacheError::Upstream(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Upstream(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| CacheError::Upstream(format!("GET {} returned invalid JSON: {}", url, e)))
    }
}
