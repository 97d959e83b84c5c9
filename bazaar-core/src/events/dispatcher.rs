//! Non-blocking publish entry point.

use bazaar_sdk::objects::{DomainEvent, RecommendationRoute};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::channels::BroadcastSender;
use super::types::{PendingBroadcast, Queued};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The broadcaster has stopped; the event was not queued.
    #[error("broadcast queue is closed")]
    Closed,
}

/// Cloneable handle for publishing domain events.
#[derive(Debug, Clone)]
pub struct BroadcastDispatcher {
    tx: BroadcastSender,
}

impl BroadcastDispatcher {
    pub fn new(tx: BroadcastSender) -> Self {
        Self { tx }
    }

    /// Queue `event` for broadcast.
    ///
    /// Target channels are resolved here with `route` and travel with the
    /// event. Never blocks and never waits for delivery. Subscribers are not
    /// consulted: an event nobody listens to is still a successful publish.
    pub fn publish(
        &self,
        event: DomainEvent,
        route: RecommendationRoute,
    ) -> Result<Queued, DispatchError> {
        let pending = PendingBroadcast {
            event_id: Uuid::now_v7(),
            occurred_at: time::OffsetDateTime::now_utc().unix_timestamp(),
            channels: event.target_channels(route),
            event,
        };
        let queued = Queued {
            event_id: pending.event_id,
            channels: pending.channels.clone(),
        };
        let name = pending.event.event_name();

        if self.tx.send(pending).is_err() {
            warn!(event = name, event_id = %queued.event_id, "broadcast queue closed, event dropped");
            return Err(DispatchError::Closed);
        }
        debug!(event = name, event_id = %queued.event_id, "event queued for broadcast");
        Ok(queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::broadcast_queue;
    use bazaar_sdk::objects::{
        Channel, RecommendationGenerated, Sentiment, SentimentAnalysisComplete,
    };

    fn sentiment(product_id: u64) -> DomainEvent {
        DomainEvent::SentimentAnalysisComplete(SentimentAnalysisComplete {
            product_id,
            seller_id: 9,
            total_reviews: 3,
            overall_sentiment: Sentiment::Positive,
            sentiment_breakdown: Default::default(),
            fake_reviews_detected: 0,
        })
    }

    #[test]
    fn test_publish_queues_in_order_with_distinct_ids() {
        let (tx, mut rx) = broadcast_queue();
        let dispatcher = BroadcastDispatcher::new(tx);

        let first = dispatcher.publish(sentiment(1), RecommendationRoute::User).unwrap();
        let second = dispatcher.publish(sentiment(2), RecommendationRoute::User).unwrap();
        assert_ne!(first.event_id, second.event_id);
        assert_eq!(first.channels.as_slice(), [Channel::SentimentSeller(9)]);

        let a = rx.try_recv().unwrap();
        let b = rx.try_recv().unwrap();
        assert_eq!((a.event_id, b.event_id), (first.event_id, second.event_id));
        assert!(matches!(a.event, DomainEvent::SentimentAnalysisComplete(ref e) if e.product_id == 1));
    }

    #[test]
    fn test_publish_after_close_reports_error() {
        let (tx, rx) = broadcast_queue();
        drop(rx);
        let dispatcher = BroadcastDispatcher::new(tx);
        assert!(matches!(
            dispatcher.publish(sentiment(1), RecommendationRoute::User),
            Err(DispatchError::Closed)
        ));
    }

    #[test]
    fn test_route_is_fixed_at_publish_time() {
        let (tx, mut rx) = broadcast_queue();
        let dispatcher = BroadcastDispatcher::new(tx);
        let event = DomainEvent::RecommendationGenerated(RecommendationGenerated {
            user_id: 4,
            recommendations: Vec::new(),
            algorithm: "neural".to_owned(),
            processing_time_seconds: 0.0,
        });

        let queued = dispatcher
            .publish(event, RecommendationRoute::Notifications)
            .unwrap();

        let pending = rx.try_recv().unwrap();
        assert_eq!(pending.channels.as_slice(), [Channel::AiNotifications(4)]);
        assert_eq!(queued.channels, pending.channels);
    }
}
