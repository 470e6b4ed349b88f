//! Subscriber registry and non-blocking fan-out.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::broadcast::events::NeuralEvent;

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Identifier of a registered subscriber.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving side of a registration. Frames are pre-serialized JSON.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Arc<str>>,
}

impl Subscription {
    /// Identifier to pass to [`BroadcastHub::unregister`].
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next frame. `None` once the hub has dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }

    /// Take a queued frame without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.receiver.try_recv().ok()
    }
}

/// Set of live subscribers.
///
/// Delivery is best-effort and at-most-once: a subscriber only sees events
/// published while it is registered, and one whose queue is full or closed
/// is dropped instead of waited on.
pub struct BroadcastHub {
    subscribers: DashMap<SubscriberId, mpsc::Sender<Arc<str>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl BroadcastHub {
    /// Create a hub whose subscribers queue at most `buffer` frames each.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a new subscriber.
    pub fn register(&self) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, receiver) = mpsc::channel(self.buffer);
        self.subscribers.insert(id, tx);
        tracing::info!(subscriber = %id, total = self.subscribers.len(), "Subscriber registered");
        Subscription { id, receiver }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unregister(&self, id: SubscriberId) {
        if self.subscribers.remove(&id).is_some() {
            tracing::info!(subscriber = %id, total = self.subscribers.len(), "Subscriber unregistered");
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Push `event` to every subscriber and return how many accepted it.
    ///
    /// Never waits; subscribers that cannot take the frame right now are
    /// unregistered.
    pub fn publish(&self, event: &NeuralEvent) -> usize {
        let frame: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => Arc::from(json),
            Err(err) => {
                tracing::error!("Failed to serialize broadcast event: {err}");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut dropped = Vec::new();
        for entry in &self.subscribers {
            match entry.value().try_send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = %entry.key(), "Subscriber queue full, dropping");
                    dropped.push(*entry.key());
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(subscriber = %entry.key(), "Subscriber closed, dropping");
                    dropped.push(*entry.key());
                }
            }
        }

        // Removal must wait until the iteration guards are released.
        for id in dropped {
            self.unregister(id);
        }

        if delivered > 0 {
            tracing::debug!(kind = ?event.kind, delivered, "Broadcast event");
        }
        delivered
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("subscribers", &self.subscribers.len())
            .field("buffer", &self.buffer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{AgentId, ConversationId};

    fn event(chunk: &str) -> NeuralEvent {
        NeuralEvent::chunk(AgentId::from("a1"), "Agent", chunk, ConversationId::from("c1"))
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = BroadcastHub::default();
        assert_eq!(hub.publish(&event("x")), 0);
    }

    #[test]
    fn test_publish_reaches_every_subscriber_in_order() {
        let hub = BroadcastHub::default();
        let mut first = hub.register();
        let mut second = hub.register();

        assert_eq!(hub.publish(&event("a")), 2);
        assert_eq!(hub.publish(&event("b")), 2);

        for sub in [&mut first, &mut second] {
            let a: NeuralEvent = serde_json::from_str(&sub.try_recv().unwrap()).unwrap();
            let b: NeuralEvent = serde_json::from_str(&sub.try_recv().unwrap()).unwrap();
            assert_eq!(a.data.chunk.as_deref(), Some("a"));
            assert_eq!(b.data.chunk.as_deref(), Some("b"));
        }
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let hub = BroadcastHub::default();
        hub.publish(&event("early"));
        let mut late = hub.register();
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn test_closed_subscriber_is_dropped() {
        let hub = BroadcastHub::default();
        let gone = hub.register();
        let mut alive = hub.register();
        drop(gone);

        assert_eq!(hub.publish(&event("x")), 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert!(alive.try_recv().is_some());
    }

    #[test]
    fn test_full_subscriber_is_dropped_without_blocking() {
        let hub = BroadcastHub::new(1);
        let _slow = hub.register();
        let mut fast = hub.register();

        assert_eq!(hub.publish(&event("1")), 2);
        assert!(fast.try_recv().is_some());
        // `_slow` never reads, so its single slot is still taken.
        assert_eq!(hub.publish(&event("2")), 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert!(fast.try_recv().is_some());
    }

    #[test]
    fn test_unregister() {
        let hub = BroadcastHub::default();
        let sub = hub.register();
        hub.unregister(sub.id());
        hub.unregister(sub.id());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_publish_and_register() {
        let hub = Arc::new(BroadcastHub::default());
        let mut handles = Vec::new();
        for i in 0..8 {
            let hub = Arc::clone(&hub);
            handles.push(tokio::spawn(async move {
                let mut sub = hub.register();
                hub.publish(&event(&i.to_string()));
                let received = sub.recv().await.is_some();
                hub.unregister(sub.id());
                received
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(hub.subscriber_count(), 0);
    }
}
