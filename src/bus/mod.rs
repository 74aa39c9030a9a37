//! Invalidation Bus Module
//!
//! Broadcast-and-reapply propagation of pattern invalidations between
//! execution contexts sharing one persistent store.
//!
//! A context that invalidates a pattern removes its own matches, then
//! publishes an `InvalidationSignal`. Every other subscribed context
//! recompiles the pattern and removes its own matches. Removal is idempotent,
//! so delivery order between contexts does not matter and nothing is queued
//! for contexts that are not listening.

mod storage_transport;

pub use storage_transport::{SharedOrigin, StorageEvent, StorageTransport};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::error::Result;

/// Shared storage key the signal is written to.
pub const INVALIDATION_CHANNEL_KEY: &str = "cache-invalidation";

// == Invalidation Signal ==
/// Wire format: `{"pattern": "<regex source>", "timestamp": <epoch ms>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationSignal {
    pub pattern: String,
    pub timestamp: u64,
}

impl InvalidationSignal {
    pub fn new(pattern: impl Into<String>, timestamp: u64) -> Self {
        Self {
            pattern: pattern.into(),
            timestamp,
        }
    }
}

// == Transport ==
/// Cross-context signalling capability.
pub trait InvalidationTransport: Send + Sync {
    /// Announces `signal` to every other context.
    fn publish(&self, signal: &InvalidationSignal) -> Result<()>;

    /// Starts receiving signals published by other contexts.
    ///
    /// Returns None for transports that never deliver anything.
    fn subscribe(&self) -> Option<InvalidationSubscription>;
}

/// Transport for single-context hosts: publishing is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

impl InvalidationTransport for NoopTransport {
    fn publish(&self, _signal: &InvalidationSignal) -> Result<()> {
        Ok(())
    }

    fn subscribe(&self) -> Option<InvalidationSubscription> {
        None
    }
}

// == Subscription ==
/// Stream of signals published by other contexts.
pub struct InvalidationSubscription {
    receiver: broadcast::Receiver<StorageEvent>,
    origin: u64,
}

impl InvalidationSubscription {
    pub(crate) fn new(receiver: broadcast::Receiver<StorageEvent>, origin: u64) -> Self {
        Self { receiver, origin }
    }

    /// Waits for the next signal from another context.
    ///
    /// Own events, events for other keys and malformed signals are skipped.
    /// Returns None once the channel is closed.
    pub async fn recv(&mut self) -> Option<InvalidationSignal> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    warn!("Invalidation listener lagged, {} storage events missed", missed);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            };

            if event.origin == self.origin || event.key != INVALIDATION_CHANNEL_KEY {
                continue;
            }

            let Some(raw) = event.new_value else {
                continue;
            };

            match serde_json::from_str::<InvalidationSignal>(&raw) {
                Ok(signal) => return Some(signal),
                Err(e) => warn!("Ignoring malformed invalidation signal {:?}: {}", raw, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_wire_format() {
        let signal = InvalidationSignal::new("^products", 1_700_000_000_000);
        let json = serde_json::to_value(&signal).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"pattern": "^products", "timestamp": 1_700_000_000_000u64})
        );
    }

    #[test]
    fn test_noop_transport() {
        let transport = NoopTransport;
        assert!(transport
            .publish(&InvalidationSignal::new("^a", 1))
            .is_ok());
        assert!(transport.subscribe().is_none());
    }
}
