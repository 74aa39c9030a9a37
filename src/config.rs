//! Configuration Module
//!
//! Cache policy knobs and process configuration loaded from environment variables.

use std::env;
use std::time::Duration;

// == Cache Config ==
/// Freshness, capacity and persistence policy for one `CacheManager`.
///
/// Immutable once a manager is built; individual calls override `ttl` and
/// `stale_while_revalidate` through `CacheOptions`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Age at which an entry is EXPIRED
    pub ttl: Duration,
    /// Age at which an entry becomes STALE
    pub stale_threshold: Duration,
    /// Maximum number of in-memory entries
    pub max_entries: usize,
    /// Maximum persisted size in megabytes
    pub max_storage_mb: f64,
    /// Serve stale entries while refreshing them in the background
    pub stale_while_revalidate: bool,
    /// Persisted records older than this are never served as a fallback
    pub fallback_max_age: Duration,
    /// Keys starting with any of these prefixes bypass both tiers
    pub no_persist_prefixes: Vec<String>,
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_stale_threshold(mut self, stale_threshold: Duration) -> Self {
        self.stale_threshold = stale_threshold;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_storage_mb(mut self, max_storage_mb: f64) -> Self {
        self.max_storage_mb = max_storage_mb;
        self
    }

    pub fn with_stale_while_revalidate(mut self, enabled: bool) -> Self {
        self.stale_while_revalidate = enabled;
        self
    }

    pub fn with_fallback_max_age(mut self, max_age: Duration) -> Self {
        self.fallback_max_age = max_age;
        self
    }

    pub fn with_no_persist_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.no_persist_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    // == No-persist Predicate ==
    /// Returns true if `key` must never populate either cache tier.
    pub fn is_no_persist(&self, key: &str) -> bool {
        self.no_persist_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
    }

    /// Maximum persisted size in bytes.
    pub fn max_storage_bytes(&self) -> u64 {
        (self.max_storage_mb.max(0.0) * BYTES_PER_MB) as u64
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            stale_threshold: Duration::from_secs(60),
            max_entries: 100,
            max_storage_mb: 5.0,
            stale_while_revalidate: true,
            fallback_max_age: Duration::from_secs(60 * 60),
            no_persist_prefixes: vec!["search-".to_string()],
        }
    }
}

/// Bytes in one megabyte, as used for storage accounting.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Process configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache policy for the process-wide manager
    pub cache: CacheConfig,
    /// JSON file backing the persistent tier, None = in-memory storage
    pub storage_path: Option<String>,
    /// Base URL of the remote API being cached
    pub upstream_url: String,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL_MS` - Entry time-to-live (default: 300000)
    /// - `CACHE_STALE_THRESHOLD_MS` - Age at which entries turn stale (default: 60000)
    /// - `CACHE_MAX_ENTRIES` - Maximum in-memory entries (default: 100)
    /// - `CACHE_MAX_STORAGE_MB` - Persistent tier budget (default: 5.0)
    /// - `CACHE_STALE_WHILE_REVALIDATE` - Background refresh of stale hits (default: true)
    /// - `CACHE_FALLBACK_MAX_AGE_MS` - Ceiling for offline fallback data (default: 3600000)
    /// - `CACHE_NO_PERSIST_PREFIXES` - Comma-separated key prefixes never cached (default: "search-")
    /// - `CACHE_STORAGE_PATH` - JSON file for durable storage (default: unset, memory only)
    /// - `UPSTREAM_URL` - Remote API base URL (default: http://127.0.0.1:8080)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = CacheConfig::default();

        let cache = CacheConfig {
            ttl: env_millis("CACHE_TTL_MS").unwrap_or(defaults.ttl),
            stale_threshold: env_millis("CACHE_STALE_THRESHOLD_MS")
                .unwrap_or(defaults.stale_threshold),
            max_entries: env_parse("CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            max_storage_mb: env_parse("CACHE_MAX_STORAGE_MB").unwrap_or(defaults.max_storage_mb),
            stale_while_revalidate: env_parse("CACHE_STALE_WHILE_REVALIDATE")
                .unwrap_or(defaults.stale_while_revalidate),
            fallback_max_age: env_millis("CACHE_FALLBACK_MAX_AGE_MS")
                .unwrap_or(defaults.fallback_max_age),
            no_persist_prefixes: env::var("CACHE_NO_PERSIST_PREFIXES")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.no_persist_prefixes),
        };

        Self {
            cache,
            storage_path: env::var("CACHE_STORAGE_PATH")
                .ok()
                .filter(|p| !p.is_empty()),
            upstream_url: env::var("UPSTREAM_URL")
                .unwrap_or_else(|_| DEFAULT_UPSTREAM_URL.to_string()),
            server_port: env_parse("SERVER_PORT").unwrap_or(3000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            storage_path: None,
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            server_port: 3000,
        }
    }
}

const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:8080";

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_millis(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}
