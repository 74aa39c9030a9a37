//! Cache Store Module
//!
//! Bounded in-memory map of live entries with oldest-quarter eviction.

use std::collections::HashMap;

use crate::cache::{CacheEntry, CacheStats};

/// Fraction of entries removed by one eviction pass.
pub const EVICTION_FRACTION: usize = 4;

// == Cache Store ==
/// In-memory tier holding at most one entry per key.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key to latest entry
    entries: HashMap<String, CacheEntry<V>>,
    /// Lookup and eviction counters
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
}

impl<V> CacheStore<V> {
    // == Constructor ==
    /// Creates an empty store holding at most `max_entries` entries.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
            max_entries: max_entries.max(1),
        }
    }

    // == Get ==
    /// Returns the entry for `key`, if any. Never classifies or removes.
    pub fn get(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    // == Insert ==
    /// Stores `entry`, replacing any previous entry for the same key.
    ///
    /// When a new key would exceed capacity, the oldest quarter is evicted
    /// first. Returns the number of evicted entries.
    pub fn insert(&mut self, entry: CacheEntry<V>) -> usize {
        let evicted = if !self.entries.contains_key(&entry.key)
            && self.entries.len() >= self.max_entries
        {
            self.evict_oldest()
        } else {
            0
        };

        self.entries.insert(entry.key.clone(), entry);
        evicted
    }

    // == Evict Oldest ==
    /// Removes the oldest 25% of entries by timestamp (at least one).
    ///
    /// Returns the number of entries removed.
    pub fn evict_oldest(&mut self) -> usize {
        if self.entries.is_empty() {
            return 0;
        }

        let mut by_age: Vec<(u64, &String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.timestamp, key))
            .collect();
        by_age.sort();

        let count = (self.entries.len() / EVICTION_FRACTION).max(1);
        let victims: Vec<String> = by_age
            .into_iter()
            .take(count)
            .map(|(_, key)| key.clone())
            .collect();

        for key in &victims {
            self.entries.remove(key);
        }

        self.stats.record_evictions(victims.len());
        victims.len()
    }

    // == Remove ==
    /// Removes `key`. Returns true if an entry was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    // == Remove Where ==
    /// Removes every entry whose key satisfies `predicate`.
    ///
    /// Returns the removed keys.
    pub fn remove_where<P>(&mut self, mut predicate: P) -> Vec<String>
    where
        P: FnMut(&str) -> bool,
    {
        let victims: Vec<String> = self
            .entries
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        for key in &victims {
            self.entries.remove(key);
        }
        victims
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns all keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
