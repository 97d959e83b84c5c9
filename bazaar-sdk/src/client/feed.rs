//! Client-visible marketplace state fed by broadcast events.
//!
//! Applying an event is idempotent: alerts are keyed by alert id, and
//! per-user recommendations and per-product sentiment keep the newest
//! snapshot by `occurred_at`. Re-delivering an event, or delivering an
//! older one late, leaves the state unchanged.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::watch;

use super::handlers::EventHandlers;
use crate::objects::events::{
    DomainEvent, EventEnvelope, EventError, FraudAlertCreated, RecommendationGenerated,
    SentimentAnalysisComplete,
};

#[derive(Debug, Clone, PartialEq)]
struct Stamped<T> {
    occurred_at: i64,
    value: T,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketplaceFeed {
    recommendations: HashMap<u64, Stamped<RecommendationGenerated>>,
    fraud_alerts: BTreeMap<u64, FraudAlertCreated>,
    sentiment: HashMap<u64, Stamped<SentimentAnalysisComplete>>,
}

impl MarketplaceFeed {
    /// Fold one envelope into the state.
    pub fn apply(&mut self, envelope: &EventEnvelope) -> Result<(), EventError> {
        let at = envelope.occurred_at;
        match envelope.decode()? {
            DomainEvent::RecommendationGenerated(e) => {
                keep_newest(&mut self.recommendations, e.user_id, at, e);
            }
            DomainEvent::FraudAlertCreated(e) => {
                self.fraud_alerts.insert(e.alert_id, e);
            }
            DomainEvent::SentimentAnalysisComplete(e) => {
                keep_newest(&mut self.sentiment, e.product_id, at, e);
            }
        }
        Ok(())
    }

    pub fn recommendations_for(&self, user_id: u64) -> Option<&RecommendationGenerated> {
        self.recommendations.get(&user_id).map(|s| &s.value)
    }

    /// Fraud alerts ordered by alert id.
    pub fn fraud_alerts(&self) -> impl Iterator<Item = &FraudAlertCreated> {
        self.fraud_alerts.values()
    }

    pub fn sentiment_for(&self, product_id: u64) -> Option<&SentimentAnalysisComplete> {
        self.sentiment.get(&product_id).map(|s| &s.value)
    }

    /// Handlers that fold every known event into the feed behind `tx`.
    ///
    /// Watchers of the paired receiver are notified on every change.
    pub fn handlers(tx: watch::Sender<MarketplaceFeed>) -> EventHandlers {
        let mut handlers = EventHandlers::new();
        for name in [
            crate::objects::events::RECOMMENDATION_GENERATED,
            crate::objects::events::FRAUD_ALERT_CREATED,
            crate::objects::events::SENTIMENT_ANALYSIS_COMPLETE,
        ] {
            let tx = tx.clone();
            handlers = handlers.on(name, move |channel, envelope| {
                tx.send_if_modified(|feed| {
                    let before = feed.clone();
                    if let Err(e) = feed.apply(envelope) {
                        tracing::warn!(channel, error = %e, "feed rejected event");
                    }
                    *feed != before
                });
            });
        }
        handlers
    }
}

fn keep_newest<T>(map: &mut HashMap<u64, Stamped<T>>, key: u64, occurred_at: i64, value: T) {
    match map.get(&key) {
        Some(current) if current.occurred_at > occurred_at => {}
        _ => {
            map.insert(key, Stamped { occurred_at, value });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::events::{RiskLevel, RiskScore, Sentiment};
    use uuid::Uuid;

    fn sealed(event: &DomainEvent, at: i64) -> EventEnvelope {
        EventEnvelope::seal(Uuid::now_v7(), at, event).unwrap()
    }

    fn recommendation(algorithm: &str) -> DomainEvent {
        DomainEvent::RecommendationGenerated(RecommendationGenerated {
            user_id: 5,
            recommendations: vec![],
            algorithm: algorithm.to_owned(),
            processing_time_seconds: 0.2,
        })
    }

    #[test]
    fn test_duplicate_delivery_is_harmless() {
        let alert = DomainEvent::FraudAlertCreated(FraudAlertCreated {
            alert_id: 1,
            transaction_id: 2,
            seller_id: 7,
            risk_score: RiskScore::new(88.0).unwrap(),
            risk_level: RiskLevel::Critical,
            indicators: Default::default(),
        });
        let envelope = sealed(&alert, 100);

        let mut feed = MarketplaceFeed::default();
        feed.apply(&envelope).unwrap();
        let once = feed.clone();
        feed.apply(&envelope).unwrap();
        assert_eq!(feed, once);
        assert_eq!(feed.fraud_alerts().count(), 1);
    }

    #[test]
    fn test_late_older_snapshot_does_not_win() {
        let mut feed = MarketplaceFeed::default();
        feed.apply(&sealed(&recommendation("neural"), 200)).unwrap();
        feed.apply(&sealed(&recommendation("collaborative"), 100)).unwrap();
        assert_eq!(feed.recommendations_for(5).unwrap().algorithm, "neural");

        feed.apply(&sealed(&recommendation("hybrid"), 300)).unwrap();
        assert_eq!(feed.recommendations_for(5).unwrap().algorithm, "hybrid");
    }

    #[test]
    fn test_sentiment_is_keyed_by_product() {
        let sentiment = |product_id, overall_sentiment| {
            DomainEvent::SentimentAnalysisComplete(SentimentAnalysisComplete {
                product_id,
                seller_id: 7,
                total_reviews: 12,
                overall_sentiment,
                sentiment_breakdown: Default::default(),
                fake_reviews_detected: 1,
            })
        };
        let mut feed = MarketplaceFeed::default();
        feed.apply(&sealed(&sentiment(1, Sentiment::Positive), 10)).unwrap();
        feed.apply(&sealed(&sentiment(2, Sentiment::Negative), 10)).unwrap();

        assert_eq!(feed.sentiment_for(1).unwrap().overall_sentiment, Sentiment::Positive);
        assert_eq!(feed.sentiment_for(2).unwrap().overall_sentiment, Sentiment::Negative);
        assert!(feed.sentiment_for(3).is_none());
    }

    #[test]
    fn test_handlers_notify_only_on_change() {
        let (tx, mut rx) = watch::channel(MarketplaceFeed::default());
        let mut handlers = MarketplaceFeed::handlers(tx);
        let envelope = sealed(&recommendation("neural"), 10);

        handlers.dispatch("private-ai.user.5", &envelope);
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        handlers.dispatch("private-ai.user.5", &envelope);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(rx.borrow().recommendations_for(5).unwrap().algorithm, "neural");
    }
}
