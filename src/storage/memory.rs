//! In-memory storage backend with an optional byte quota.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{item_size, StorageBackend};
use crate::error::{CacheError, Result};

/// Process-local storage.
///
/// Shared between managers through an `Arc`, it stands in for a single
/// origin's storage when every context lives in one process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStorage {
    /// Creates an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes beyond `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently used (keys + values).
    pub fn used_bytes(&self) -> Result<usize> {
        let items = self.lock()?;
        Ok(items.iter().map(|(k, v)| item_size(k, v)).sum())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.items
            .lock()
            .map_err(|e| CacheError::Storage(format!("Lock poisoned: {}", e)))
    }
}

impl StorageBackend for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.lock()?;

        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| item_size(k, v))
                .sum();
            let needed = item_size(key, value);
            if used + needed > quota {
                return Err(CacheError::QuotaExceeded(format!(
                    "writing '{}' needs {} bytes, {} of {} in use",
                    key, needed, used, quota
                )));
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}
