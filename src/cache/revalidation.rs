//! Revalidation Coordinator Module
//!
//! Runs background refreshes, at most one in flight per key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// == Revalidation Coordinator ==
/// Registry of in-flight background refreshes keyed by cache key.
///
/// The registry owns each task's lifecycle: a task removes its own
/// registration when it settles, so a later stale hit can schedule again.
#[derive(Debug, Default, Clone)]
pub struct RevalidationCoordinator {
    in_flight: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl RevalidationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    // == Schedule ==
    /// Spawns `refresh` for `key` unless one is already running.
    ///
    /// Returns true if a new task was started. `refresh` is expected to
    /// handle its own failures; nothing it produces reaches the caller.
    pub async fn schedule<Fut>(&self, key: &str, refresh: Fut) -> bool
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.contains_key(key) {
            debug!("Revalidation for '{}' already in flight", key);
            return false;
        }

        let registry = Arc::clone(&self.in_flight);
        let owned_key = key.to_string();
        // The registry lock is held until the handle is inserted, so the
        // task cannot deregister before it is registered.
        let handle = tokio::spawn(async move {
            // Inner task so a panicking refresh still deregisters
            if let Err(e) = tokio::spawn(refresh).await {
                warn!("Revalidation task for '{}' aborted: {}", owned_key, e);
            }
            registry.lock().await.remove(&owned_key);
            debug!("Revalidation for '{}' settled", owned_key);
        });

        in_flight.insert(key.to_string(), handle);
        true
    }

    /// Returns true while a refresh for `key` is running.
    pub async fn is_pending(&self, key: &str) -> bool {
        self.in_flight.lock().await.contains_key(key)
    }

    /// Number of refreshes currently running.
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}
