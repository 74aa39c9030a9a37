//! SWR Cache Layer - A stale-while-revalidate cache for remote API responses
//!
//! Two tiers: a bounded in-memory store and a JSON persistent store used as
//! an offline fallback. Stale hits are served immediately while one
//! background refresh per key updates both tiers, and pattern invalidations
//! propagate to every context sharing the persistent store.

pub mod api;
pub mod bus;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod models;
pub mod storage;
pub mod tasks;
pub mod upstream;

pub use api::AppState;
pub use cache::{CacheManager, CacheManagerBuilder, CacheOptions};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};
pub use tasks::spawn_invalidation_listener;
