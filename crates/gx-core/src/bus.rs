//! In-process typed publish/subscribe.
//!
//! Built on `tokio::sync::broadcast`:
//!
//! - [`EventBus::publish`] never blocks and never waits on subscribers.
//! - Each [`Subscription`] has its own bounded buffer. A subscriber that falls
//!   behind loses the *oldest* events; the loss is logged at the subscriber,
//!   the publisher is unaffected.
//! - Delivery order to one subscriber matches publish order.
//! - Subscribing and dropping subscriptions is synchronized internally and
//!   may happen concurrently with publishes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

use crate::types::{AggregationResult, CredentialKey, ValidationStatus};

/// Default per-subscriber buffer length.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// GatewayEvent
// ---------------------------------------------------------------------------

/// Everything the gateway announces to downstream consumers.
#[derive(Debug, Clone, Serialize)]
pub enum GatewayEvent {
    /// A new metric value (possibly degraded).
    MetricUpdated(AggregationResult),

    /// A balance payload fetched for one credential.
    AccountSnapshot {
        key: CredentialKey,
        payload: serde_json::Value,
        fetched_at: DateTime<Utc>,
    },

    /// A provider call made on behalf of a credential did not succeed.
    ProviderCallFailed {
        key: CredentialKey,
        /// Outcome variant label (`"rate_limited"`, `"ip_restricted"`, ...).
        outcome: String,
        detail: String,
    },

    /// The Key Validator reached a verdict (or deferred one).
    CredentialValidated {
        key: CredentialKey,
        status: ValidationStatus,
        reason: Option<String>,
    },

    /// One iteration of a supervised task failed.
    TaskFailed { task: String, error: String },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Cloneable publisher handle.
#[derive(Debug, Clone)]
pub struct EventBus<E: Clone = GatewayEvent> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish without blocking. Returns how many subscribers will see it.
    pub fn publish(&self, event: E) -> usize {
        // `send` only fails when nobody is subscribed, which is not an error.
        self.tx.send(event).unwrap_or(0)
    }

    /// Register a new subscriber. It sees events published after this call.
    pub fn subscribe(&self, label: impl Into<String>) -> Subscription<E> {
        Subscription { rx: self.tx.subscribe(), label: label.into(), dropped: 0 }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Receiving end owned by one consumer.
pub struct Subscription<E: Clone> {
    rx: broadcast::Receiver<E>,
    label: String,
    dropped: u64,
}

impl<E: Clone> Subscription<E> {
    /// Next event, skipping over any gap caused by lag. `None` once every
    /// publisher handle has been dropped.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(n)) => self.note_lag(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` if nothing is
    /// buffered right now.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(n)) => self.note_lag(n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Total events this subscriber lost to lag.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn note_lag(&mut self, n: u64) {
        self.dropped += n;
        warn!("[bus] subscriber '{}' lagging, dropped {n} oldest event(s)", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus: EventBus<u32> = EventBus::new(16);
        let mut sub = bus.subscribe("order");
        for i in 0..10 {
            bus.publish(i);
        }
        for i in 0..10 {
            assert_eq!(sub.recv().await, Some(i));
        }
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus: EventBus<u32> = EventBus::new(4);
        assert_eq!(bus.publish(1), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest_not_publisher() {
        let bus: EventBus<u32> = EventBus::new(4);
        let mut slow = bus.subscribe("slow");

        // Publisher pushes far more than the buffer holds without blocking.
        for i in 0..100 {
            bus.publish(i);
        }

        // Oldest were overwritten; the subscriber resumes at the newest window.
        let first = slow.recv().await.unwrap();
        assert_eq!(first, 96);
        assert_eq!(slow.dropped(), 96);
        assert_eq!(slow.try_recv(), Some(97));
    }

    #[tokio::test]
    async fn each_subscriber_sees_every_event() {
        let bus: EventBus<&'static str> = EventBus::new(8);
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish("x");
        assert_eq!(a.recv().await, Some("x"));
        assert_eq!(b.recv().await, Some("x"));

        drop(b);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn closed_bus_ends_subscription() {
        let bus: EventBus<u8> = EventBus::new(2);
        let mut sub = bus.subscribe("tail");
        bus.publish(1);
        drop(bus);
        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, None);
    }
}
