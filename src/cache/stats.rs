//! Cache Statistics Module
//!
//! Tracks lookup outcomes and evictions, and defines the diagnostic snapshot.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from memory (fresh or stale)
    pub hits: u64,
    /// Lookups that required a foreground fetch (absent or expired)
    pub misses: u64,
    /// Subset of hits that served a stale entry
    pub stale_hits: u64,
    /// Number of entries evicted by the capacity bound
    pub evictions: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_stale_hit(&mut self) {
        self.hits += 1;
        self.stale_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }
}

// == Cache Snapshot ==
/// Read-only diagnostic view of a cache manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSnapshot {
    /// Entries currently held in memory
    pub size: usize,
    /// In-memory capacity
    pub max_size: usize,
    /// Default time-to-live in milliseconds
    pub ttl_ms: u64,
    /// Persistent tier usage, formatted with two decimals
    pub storage_usage_mb: String,
    /// In-memory keys, sorted
    pub keys: Vec<String>,
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    pub evictions: u64,
    /// Background refreshes currently running
    pub revalidations_in_flight: usize,
    pub hit_rate: f64,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.stale_hits, 0);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_stale_hit_counts_as_hit() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_stale_hit();
        stats.record_miss();
        stats.record_miss();

        assert_eq!(stats.hits, 2);
        assert_eq!(stats.stale_hits, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_record_evictions() {
        let mut stats = CacheStats::new();
        stats.record_evictions(3);
        stats.record_evictions(1);
        assert_eq!(stats.evictions, 4);
    }
}
