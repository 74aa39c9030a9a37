//! Persistent Backend Module
//!
//! Durable mirror of cache entries with size accounting, oldest-quarter
//! trimming and an offline fallback read path.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::store::EVICTION_FRACTION;
use crate::config::BYTES_PER_MB;
use crate::error::{CacheError, Result};
use crate::storage::{item_size, StorageBackend};

/// Prefix of every storage key owned by the persistent tier.
pub const STORAGE_KEY_PREFIX: &str = "cache_";

// == Persisted Record ==
/// Wire format of a persisted entry: `{"data": ..., "timestamp": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord<T> {
    pub data: T,
    /// Fetch time (Unix milliseconds)
    pub timestamp: u64,
}

/// Timestamp-only view used when ordering records for trimming.
#[derive(Deserialize)]
struct RecordStamp {
    timestamp: u64,
}

/// Result of a persist attempt that did not hit a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    /// Storage budget exhausted; the write was dropped and old records trimmed
    Dropped,
}

// == Persistent Backend ==
pub struct PersistentBackend {
    storage: Arc<dyn StorageBackend>,
    max_bytes: u64,
    fallback_max_age_ms: u64,
    /// Bytes used by `cache_` records
    usage_bytes: Mutex<u64>,
}

impl PersistentBackend {
    // == Constructor ==
    /// Wraps `storage`, measuring records already present.
    pub fn new(storage: Arc<dyn StorageBackend>, max_bytes: u64, fallback_max_age: Duration) -> Self {
        let backend = Self {
            storage,
            max_bytes,
            fallback_max_age_ms: fallback_max_age.as_millis() as u64,
            usage_bytes: Mutex::new(0),
        };
        if let Err(e) = backend.recompute_usage() {
            warn!("Could not measure persistent cache usage: {}", e);
        }
        backend
    }

    /// Storage key for cache key `key`.
    pub fn storage_key(key: &str) -> String {
        format!("{}{}", STORAGE_KEY_PREFIX, key)
    }

    fn usage(&self) -> MutexGuard<'_, u64> {
        self.usage_bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // == Persist ==
    /// Writes `data` fetched at `timestamp` under `key`.
    ///
    /// Fails only on serialization or non-quota storage errors. Budget
    /// exhaustion (ours or the backend's) drops the write and trims.
    pub fn persist<T: Serialize>(&self, key: &str, data: &T, timestamp: u64) -> Result<PersistOutcome> {
        let value = serde_json::to_string(&PersistedRecord { data, timestamp })?;
        let storage_key = Self::storage_key(key);
        let size = item_size(&storage_key, &value) as u64;

        let mut usage = self.usage();
        // Other contexts write to the same storage
        *usage = self.measure()?;
        let replaced = self
            .storage
            .get_item(&storage_key)?
            .map(|old| item_size(&storage_key, &old) as u64)
            .unwrap_or(0);
        let projected = usage.saturating_sub(replaced) + size;

        if projected > self.max_bytes {
            drop(usage);
            warn!(
                "Persistent cache budget exceeded ({} > {} bytes), skipping write of '{}'",
                projected, self.max_bytes, key
            );
            self.trim_after_overflow();
            return Ok(PersistOutcome::Dropped);
        }

        match self.storage.set_item(&storage_key, &value) {
            Ok(()) => {
                *usage = projected;
                Ok(PersistOutcome::Written)
            }
            Err(CacheError::QuotaExceeded(msg)) => {
                drop(usage);
                warn!("Storage quota exceeded writing '{}': {}", key, msg);
                self.trim_after_overflow();
                Ok(PersistOutcome::Dropped)
            }
            Err(e) => Err(e),
        }
    }

    fn trim_after_overflow(&self) {
        if let Err(e) = self.clear_old_storage_items() {
            warn!("Failed to trim persistent cache: {}", e);
        }
    }

    // == Load Fallback ==
    /// Reads the persisted value for `key`, used only when a live fetch failed.
    ///
    /// Records older than the fallback ceiling, unparsable records and
    /// records of another type are treated as absent.
    pub fn load_fallback<T: DeserializeOwned>(&self, key: &str, now: u64) -> Option<T> {
        let raw = match self.storage.get_item(&Self::storage_key(key)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read persisted fallback for '{}': {}", key, e);
                return None;
            }
        };

        let record: PersistedRecord<T> = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                debug!("Ignoring unreadable persisted record for '{}': {}", key, e);
                return None;
            }
        };

        let age = now.saturating_sub(record.timestamp);
        if age > self.fallback_max_age_ms {
            debug!(
                "Persisted record for '{}' is {} ms old, beyond fallback ceiling",
                key, age
            );
            return None;
        }

        Some(record.data)
    }

    // == Remove ==
    /// Removes the record for `key`. No-op if absent.
    pub fn remove(&self, key: &str) -> Result<()> {
        let storage_key = Self::storage_key(key);
        let mut usage = self.usage();
        if let Some(old) = self.storage.get_item(&storage_key)? {
            self.storage.remove_item(&storage_key)?;
            *usage = usage.saturating_sub(item_size(&storage_key, &old) as u64);
        }
        Ok(())
    }

    // == Remove Where ==
    /// Removes every record whose cache key satisfies `predicate`.
    ///
    /// Returns the cache keys (without prefix) of the removed records.
    pub fn remove_where<P>(&self, mut predicate: P) -> Result<Vec<String>>
    where
        P: FnMut(&str) -> bool,
    {
        let victims: Vec<String> = self
            .cache_keys()?
            .into_iter()
            .map(|storage_key| storage_key[STORAGE_KEY_PREFIX.len()..].to_string())
            .filter(|key| predicate(key))
            .collect();

        for key in &victims {
            self.storage.remove_item(&Self::storage_key(key))?;
        }
        self.recompute_usage()?;
        Ok(victims)
    }

    // == Clear ==
    /// Removes every record owned by the cache, leaving foreign keys alone.
    ///
    /// Returns the number of records removed.
    pub fn clear(&self) -> Result<usize> {
        Ok(self.remove_where(|_| true)?.len())
    }

    // == Clear Old Storage Items ==
    /// Removes the oldest 25% of records (at least one) by stored timestamp.
    ///
    /// Unparsable records sort as timestamp 0 and go first.
    pub fn clear_old_storage_items(&self) -> Result<usize> {
        let mut stamped: Vec<(u64, String)> = Vec::new();
        for storage_key in self.cache_keys()? {
            let timestamp = self
                .storage
                .get_item(&storage_key)?
                .and_then(|raw| serde_json::from_str::<RecordStamp>(&raw).ok())
                .map(|stamp| stamp.timestamp)
                .unwrap_or(0);
            stamped.push((timestamp, storage_key));
        }

        if stamped.is_empty() {
            return Ok(0);
        }

        stamped.sort();
        let count = (stamped.len() / EVICTION_FRACTION).max(1);
        for (_, storage_key) in stamped.iter().take(count) {
            self.storage.remove_item(storage_key)?;
        }

        let usage = self.recompute_usage()?;
        info!(
            "Trimmed {} persisted cache records, {:.2} MB in use",
            count,
            usage as f64 / BYTES_PER_MB
        );
        Ok(count)
    }

    // == Recompute Usage ==
    /// Re-measures usage from the backend and returns it in bytes.
    pub fn recompute_usage(&self) -> Result<u64> {
        let total = self.measure()?;
        *self.usage() = total;
        Ok(total)
    }

    /// Sums the size of every `cache_` record in the backend.
    fn measure(&self) -> Result<u64> {
        let mut total = 0u64;
        for storage_key in self.cache_keys()? {
            if let Some(value) = self.storage.get_item(&storage_key)? {
                total += item_size(&storage_key, &value) as u64;
            }
        }
        Ok(total)
    }

    pub fn usage_bytes(&self) -> u64 {
        *self.usage()
    }

    pub fn usage_mb(&self) -> f64 {
        self.usage_bytes() as f64 / BYTES_PER_MB
    }

    fn cache_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .storage
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(STORAGE_KEY_PREFIX))
            .collect())
    }
}
