//! Invalidation Listener Task
//!
//! Background task that replays invalidations published by other contexts.

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::CacheManager;

/// Spawns a task applying every signal other contexts publish to `manager`.
///
/// Returns None when the manager's transport never delivers signals. The
/// task runs until the transport closes; abort the handle to stop it early.
///
/// # Example
/// ```ignore
/// let origin = SharedOrigin::new(Arc::new(MemoryStorage::new()));
/// let manager = CacheManager::builder(CacheConfig::default())
///     .storage(origin.storage())
///     .transport(origin.transport())
///     .build();
/// let listener = spawn_invalidation_listener(manager.clone());
/// // Later, during shutdown:
/// if let Some(handle) = listener { handle.abort(); }
/// ```
pub fn spawn_invalidation_listener(manager: CacheManager) -> Option<JoinHandle<()>> {
    let mut subscription = manager.subscribe()?;

    Some(tokio::spawn(async move {
        info!("Starting invalidation listener");

        while let Some(signal) = subscription.recv().await {
            if let Err(e) = manager.apply_signal(&signal).await {
                warn!(
                    "Ignoring invalidation signal with pattern '{}': {}",
                    signal.pattern, e
                );
            }
        }

        info!("Invalidation channel closed, listener stopping");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InvalidationSignal, InvalidationTransport, SharedOrigin};
    use crate::cache::CacheOptions;
    use crate::config::CacheConfig;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;
    use std::time::Duration;

    fn context(origin: &SharedOrigin) -> CacheManager {
        CacheManager::builder(CacheConfig::default())
            .storage(origin.storage())
            .transport(origin.transport())
            .build()
    }

    async fn wait_for_size(manager: &CacheManager, size: usize) {
        for _ in 0..200 {
            if manager.stats().await.size == size {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cache never reached size {}", size);
    }

    #[tokio::test]
    async fn test_listener_applies_remote_signal() {
        let origin = SharedOrigin::new(Arc::new(MemoryStorage::new()));
        let tab = context(&origin);
        let handle = spawn_invalidation_listener(tab.clone()).unwrap();

        for key in ["products-a", "users-list"] {
            tab.get(key, || async { Ok::<_, String>(1u32) }, CacheOptions::new())
                .await
                .unwrap();
        }

        let other = origin.transport();
        other
            .publish(&InvalidationSignal::new("^products", 1))
            .unwrap();

        wait_for_size(&tab, 1).await;
        assert_eq!(tab.stats().await.keys, vec!["users-list"]);

        handle.abort();
    }

    #[tokio::test]
    async fn test_listener_survives_bad_pattern() {
        let origin = SharedOrigin::new(Arc::new(MemoryStorage::new()));
        let tab = context(&origin);
        let handle = spawn_invalidation_listener(tab.clone()).unwrap();

        tab.get("products-a", || async { Ok::<_, String>(1u32) }, CacheOptions::new())
            .await
            .unwrap();

        let other = origin.transport();
        other
            .publish(&InvalidationSignal::new("(unclosed", 1))
            .unwrap();
        other
            .publish(&InvalidationSignal::new("^products", 2))
            .unwrap();

        wait_for_size(&tab, 0).await;
        assert!(!handle.is_finished());

        handle.abort();
    }

    #[tokio::test]
    async fn test_no_listener_without_subscription() {
        let manager = CacheManager::new(CacheConfig::default());
        assert!(spawn_invalidation_listener(manager).is_none());
    }

    #[tokio::test]
    async fn test_listener_can_be_aborted() {
        let origin = SharedOrigin::new(Arc::new(MemoryStorage::new()));
        let handle = spawn_invalidation_listener(context(&origin)).unwrap();

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
