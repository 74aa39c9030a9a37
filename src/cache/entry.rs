//! Cache Entry Module
//!
//! Defines cache entries and the age-based FRESH / STALE / EXPIRED classification.

use std::time::Duration;

// == Cache Entry ==
/// A single in-memory cache entry.
///
/// Entries are replaced, never mutated, when a key is refreshed.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The key this entry is stored under
    pub key: String,
    /// The cached payload
    pub data: T,
    /// Fetch timestamp (Unix milliseconds)
    pub timestamp: u64,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates a new entry fetched at `timestamp`.
    pub fn new(key: impl Into<String>, data: T, timestamp: u64) -> Self {
        Self {
            key: key.into(),
            data,
            timestamp,
        }
    }
}

// == Freshness ==
/// Age-based state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served without any network activity
    Fresh,
    /// Still servable, but due for a refresh
    Stale,
    /// Must not be served without a new fetch, except as a failure fallback
    Expired,
}

// == Freshness Policy ==
/// Thresholds used to classify entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub stale_after_ms: u64,
    pub expire_after_ms: u64,
}

impl FreshnessPolicy {
    /// Builds a policy; the stale threshold never exceeds the TTL.
    pub fn new(stale_threshold: Duration, ttl: Duration) -> Self {
        let expire_after_ms = ttl.as_millis() as u64;
        let stale_after_ms = (stale_threshold.as_millis() as u64).min(expire_after_ms);
        Self {
            stale_after_ms,
            expire_after_ms,
        }
    }

    // == Classify ==
    /// Classifies an entry fetched at `timestamp` as seen at `now`.
    ///
    /// Boundaries are inclusive on the older side: an entry is STALE once
    /// `age >= stale_after_ms` and EXPIRED once `age >= expire_after_ms`.
    pub fn classify(&self, timestamp: u64, now: u64) -> Freshness {
        let age = now.saturating_sub(timestamp);
        if age >= self.expire_after_ms {
            Freshness::Expired
        } else if age >= self.stale_after_ms {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}
