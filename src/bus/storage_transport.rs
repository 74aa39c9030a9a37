//! Storage-change transport.
//!
//! Models an origin whose contexts share one storage and are told about
//! each other's writes through a change notification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::{InvalidationSignal, InvalidationSubscription, InvalidationTransport, INVALIDATION_CHANNEL_KEY};
use crate::error::Result;
use crate::storage::StorageBackend;

const EVENT_CAPACITY: usize = 64;

/// Notification that a context wrote a storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
    /// Context that performed the write
    pub origin: u64,
}

// == Shared Origin ==
/// Storage plus change notifications shared by every context of one origin.
#[derive(Clone)]
pub struct SharedOrigin {
    storage: Arc<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
    next_context: Arc<AtomicU64>,
}

impl SharedOrigin {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            storage,
            events,
            next_context: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The storage every context of this origin persists to.
    pub fn storage(&self) -> Arc<dyn StorageBackend> {
        Arc::clone(&self.storage)
    }

    /// Creates the transport for a new context.
    pub fn transport(&self) -> StorageTransport {
        StorageTransport {
            storage: Arc::clone(&self.storage),
            events: self.events.clone(),
            origin: self.next_context.fetch_add(1, Ordering::SeqCst),
        }
    }
}

// == Storage Transport ==
/// One context's view of a `SharedOrigin`.
pub struct StorageTransport {
    storage: Arc<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
    origin: u64,
}

impl StorageTransport {
    pub fn origin(&self) -> u64 {
        self.origin
    }
}

impl InvalidationTransport for StorageTransport {
    fn publish(&self, signal: &InvalidationSignal) -> Result<()> {
        let raw = serde_json::to_string(signal)?;
        self.storage.set_item(INVALIDATION_CHANNEL_KEY, &raw)?;

        let event = StorageEvent {
            key: INVALIDATION_CHANNEL_KEY.to_string(),
            new_value: Some(raw),
            origin: self.origin,
        };
        if self.events.send(event).is_err() {
            debug!("No contexts listening for invalidation signals");
        }
        Ok(())
    }

    fn subscribe(&self) -> Option<InvalidationSubscription> {
        Some(InvalidationSubscription::new(
            self.events.subscribe(),
            self.origin,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::time::Duration;

    fn origin() -> SharedOrigin {
        SharedOrigin::new(Arc::new(MemoryStorage::new()))
    }

    #[test]
    fn test_transports_get_distinct_origins() {
        let origin = origin();
        assert_ne!(origin.transport().origin(), origin.transport().origin());
    }

    #[tokio::test]
    async fn test_publish_writes_channel_key() {
        let origin = origin();
        let transport = origin.transport();

        transport
            .publish(&InvalidationSignal::new("^products", 42))
            .unwrap();

        let raw = origin
            .storage()
            .get_item(INVALIDATION_CHANNEL_KEY)
            .unwrap()
            .unwrap();
        let stored: InvalidationSignal = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, InvalidationSignal::new("^products", 42));
    }

    #[tokio::test]
    async fn test_other_context_receives_signal() {
        let origin = origin();
        let sender = origin.transport();
        let receiver = origin.transport();
        let mut subscription = receiver.subscribe().unwrap();

        sender
            .publish(&InvalidationSignal::new("^memorabilia", 7))
            .unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
            .await
            .unwrap();
        assert_eq!(signal, Some(InvalidationSignal::new("^memorabilia", 7)));
    }

    #[tokio::test]
    async fn test_own_signals_are_not_delivered() {
        let origin = origin();
        let transport = origin.transport();
        let mut own = transport.subscribe().unwrap();

        transport.publish(&InvalidationSignal::new("^a", 1)).unwrap();

        let result = tokio::time::timeout(Duration::from_millis(50), own.recv()).await;
        assert!(result.is_err(), "own signal should be filtered out");
    }

    #[tokio::test]
    async fn test_malformed_and_foreign_events_skipped() {
        let origin = origin();
        let receiver = origin.transport();
        let mut subscription = receiver.subscribe().unwrap();

        let events = origin.events.clone();
        for event in [
            StorageEvent {
                key: "cache_products".to_string(),
                new_value: Some("{}".to_string()),
                origin: 999,
            },
            StorageEvent {
                key: INVALIDATION_CHANNEL_KEY.to_string(),
                new_value: Some("not json".to_string()),
                origin: 999,
            },
            StorageEvent {
                key: INVALIDATION_CHANNEL_KEY.to_string(),
                new_value: None,
                origin: 999,
            },
            StorageEvent {
                key: INVALIDATION_CHANNEL_KEY.to_string(),
                new_value: Some(r#"{"pattern":"^ok","timestamp":3}"#.to_string()),
                origin: 999,
            },
        ] {
            events.send(event).unwrap();
        }

        let signal = subscription.recv().await;
        assert_eq!(signal, Some(InvalidationSignal::new("^ok", 3)));
    }
}
