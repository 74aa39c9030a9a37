//! Storage Module
//!
//! Durable string key/value stores backing the persistent cache tier.
//!
//! The contract mirrors a browser origin's local storage: synchronous,
//! string keyed, string valued, shared by every context of the same origin.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;

/// Host storage capability.
pub trait StorageBackend: Send + Sync {
    /// Returns the value stored under `key`.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`.
    ///
    /// Fails with `CacheError::QuotaExceeded` when the store is full; the
    /// previous value (if any) is left in place.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Missing keys are not an error.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Lists every stored key.
    fn keys(&self) -> Result<Vec<String>>;
}

/// Size of a stored item for quota accounting.
pub(crate) fn item_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}
