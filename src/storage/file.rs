//! File-backed storage: one JSON document per store, rewritten on every mutation.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use super::{item_size, StorageBackend};
use crate::error::{CacheError, Result};

/// Storage that survives process restarts.
///
/// Every mutation rewrites the whole document with blocking `std::fs` calls
/// while the item lock is held, so a write costs time proportional to the
/// store size (up to the persistent budget, 5 MB by default) and runs on
/// the calling tokio worker. Suited to a single-node proxy with a modest
/// budget; larger stores want a real embedded database.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl FileStorage {
    /// Opens (or creates) the store at `path`.
    ///
    /// A missing file is an empty store; an unreadable one is an error.
    pub fn open(path: impl Into<PathBuf>, quota_bytes: Option<usize>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let items = match fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Opened file storage at {} with {} items",
            path.display(),
            items.len()
        );

        Ok(Self {
            path,
            items: Mutex::new(items),
            quota_bytes,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.items
            .lock()
            .map_err(|e| CacheError::Storage(format!("Lock poisoned: {}", e)))
    }

    /// Writes the whole map through a temp file so readers never see a torn document.
    fn flush(&self, items: &HashMap<String, String>) -> Result<()> {
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec(items)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Flushed {} items to {}", items.len(), self.path.display());
        Ok(())
    }
}

impl StorageBackend for FileStorage {
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
            if used + item_size(key, value) > quota {
                return Err(CacheError::QuotaExceeded(format!(
                    "{} is full ({} of {} bytes in use)",
                    self.path.display(),
                    used,
                    quota
                )));
            }
        }

        let previous = items.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&items) {
            // Keep memory and disk in agreement
            match previous {
                Some(old) => items.insert(key.to_string(), old),
                None => items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.lock()?;
        if let Some(old) = items.remove(key) {
            if let Err(e) = self.flush(&items) {
                items.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}
