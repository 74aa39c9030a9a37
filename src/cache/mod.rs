//! Cache Module
//!
//! Two-tier request cache with stale-while-revalidate semantics.

mod clock;
mod entry;
mod manager;
mod persistent;
mod revalidation;
mod stats;
mod store;


// Re-export public types
pub use clock::{current_timestamp_ms, Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, Freshness, FreshnessPolicy};
pub use manager::{CacheManager, CacheManagerBuilder, CacheOptions, ErasedValue};
pub use persistent::{PersistOutcome, PersistedRecord, PersistentBackend, STORAGE_KEY_PREFIX};
pub use revalidation::RevalidationCoordinator;
pub use stats::{CacheSnapshot, CacheStats};
pub use store::{CacheStore, EVICTION_FRACTION};
