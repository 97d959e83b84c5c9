//! In-process pub/sub transport.
//!
//! Each channel with at least one subscriber has a `tokio::sync::broadcast`
//! sender. Senders are created on first subscribe and dropped once the last
//! subscriber releases the channel, so the map only holds live channels.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bazaar_sdk::objects::{Channel, EventEnvelope};
use thiserror::Error;
use tokio::sync::broadcast;

/// Frames buffered per channel before slow subscribers start lagging.
pub const CHANNEL_CAPACITY: usize = 128;

/// Failure reported by a [`Transport`].
///
/// [`ChannelHub`] never fails: a channel without subscribers simply reaches
/// nobody. Transports that relay to an external broker (Redis pub/sub, a
/// hosted push service) report their outages here, and the broadcaster logs
/// them per channel and carries on.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Delivers sealed envelopes to a channel's current subscribers.
///
/// The broadcaster only sees this trait, so the in-process [`ChannelHub`]
/// can be replaced by a transport that fans out across server instances.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the number of subscribers reached. Zero is not an error.
    async fn deliver(
        &self,
        channel: &Channel,
        envelope: Arc<EventEnvelope>,
    ) -> Result<usize, TransportError>;
}

type Senders = HashMap<Channel, broadcast::Sender<Arc<EventEnvelope>>>;

#[derive(Debug, Clone)]
pub struct ChannelHub {
    channels: Arc<Mutex<Senders>>,
    capacity: usize,
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }
}

impl ChannelHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Senders> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, channel: &Channel) -> broadcast::Receiver<Arc<EventEnvelope>> {
        let capacity = self.capacity;
        self.lock()
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe()
    }

    /// Drop the channel's sender if nobody is subscribed any more.
    ///
    /// Call after dropping the receiver obtained from [`subscribe`](Self::subscribe).
    pub fn release(&self, channel: &Channel) {
        let mut channels = self.lock();
        if channels
            .get(channel)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            channels.remove(channel);
        }
    }

    /// Send to the channel's subscribers; returns how many were reached.
    pub fn publish(&self, channel: &Channel, envelope: Arc<EventEnvelope>) -> usize {
        let sender = self.lock().get(channel).cloned();
        sender.map_or(0, |tx| tx.send(envelope).unwrap_or(0))
    }

    /// Number of channels with live subscribers.
    pub fn channel_count(&self) -> usize {
        self.lock().len()
    }

    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.lock().get(channel).map_or(0, |tx| tx.receiver_count())
    }
}

#[async_trait]
impl Transport for ChannelHub {
    async fn deliver(
        &self,
        channel: &Channel,
        envelope: Arc<EventEnvelope>,
    ) -> Result<usize, TransportError> {
        Ok(self.publish(channel, envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn envelope(n: i64) -> Arc<EventEnvelope> {
        Arc::new(EventEnvelope {
            version: 1,
            event_id: Uuid::now_v7(),
            occurred_at: n,
            event: "x".to_owned(),
            data: serde_json::Value::Null,
        })
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let hub = ChannelHub::new();
        assert_eq!(hub.publish(&Channel::FraudAdmin, envelope(1)), 0);
        assert_eq!(hub.channel_count(), 0);
    }

    #[test]
    fn test_order_is_preserved_per_channel() {
        let hub = ChannelHub::new();
        let mut rx = hub.subscribe(&Channel::AiUser(5));
        for n in 0..10 {
            assert_eq!(hub.publish(&Channel::AiUser(5), envelope(n)), 1);
        }
        let seen: Vec<i64> = (0..10).map(|_| rx.try_recv().unwrap().occurred_at).collect();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_channels_are_isolated_and_pruned() {
        let hub = ChannelHub::new();
        let a = hub.subscribe(&Channel::AiUser(1));
        let mut b = hub.subscribe(&Channel::AiUser(2));
        hub.publish(&Channel::AiUser(1), envelope(1));
        assert!(b.try_recv().is_err());

        // Still subscribed: release is a no-op.
        hub.release(&Channel::AiUser(1));
        assert_eq!(hub.channel_count(), 2);

        drop(a);
        hub.release(&Channel::AiUser(1));
        assert_eq!(hub.channel_count(), 1);
        assert_eq!(hub.subscriber_count(&Channel::AiUser(2)), 1);
    }

    #[test]
    fn test_slow_subscriber_lags_instead_of_blocking() {
        let hub = ChannelHub::with_capacity(2);
        let mut rx = hub.subscribe(&Channel::FraudAdmin);
        for n in 0..5 {
            hub.publish(&Channel::FraudAdmin, envelope(n));
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(3))
        ));
        assert_eq!(rx.try_recv().unwrap().occurred_at, 3);
    }

    #[tokio::test]
    async fn test_hub_delivery_never_fails() {
        let hub = ChannelHub::new();
        let reached = hub.deliver(&Channel::FraudAdmin, envelope(1)).await.unwrap();
        assert_eq!(reached, 0);

        let _rx = hub.subscribe(&Channel::FraudAdmin);
        let reached = hub.deliver(&Channel::FraudAdmin, envelope(2)).await.unwrap();
        assert_eq!(reached, 1);
    }
}
