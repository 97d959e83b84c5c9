//! Domain events broadcast to subscribers.
//!
//! A [`DomainEvent`] is created by the business operation that detected the
//! change, published once and then dropped. Each variant decides its own
//! target channels from its payload; nothing else routes events.
//!
//! On the wire every event travels inside an [`EventEnvelope`]:
//!
//! ```json
//! {
//!   "version": 1,
//!   "event_id": "0190c6c4-...",
//!   "occurred_at": 1760000000,
//!   "event": "fraud.alert.created",
//!   "data": { "alert_id": 3, "seller_id": 7, ... }
//! }
//! ```
//!
//! `event` is the routing discriminator on the client side. `event_id` is
//! unique per publish, so a consumer can recognise a re-delivery.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use uuid::Uuid;

use super::channel::Channel;

/// Envelope format version written by this crate.
pub const ENVELOPE_VERSION: u16 = 1;

pub const RECOMMENDATION_GENERATED: &str = "recommendation.generated";
pub const FRAUD_ALERT_CREATED: &str = "fraud.alert.created";
pub const SENTIMENT_ANALYSIS_COMPLETE: &str = "sentiment.analysis.complete";

/// Errors produced while building or decoding events.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("risk score {0} is outside 0..=100")]
    InvalidRiskScore(f64),
    #[error("unknown event type `{0}`")]
    UnknownEvent(String),
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u16),
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which per-user channel receives recommendation events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationRoute {
    /// `ai.user.{id}`
    #[default]
    User,
    /// `ai.notifications.user.{id}`
    Notifications,
}

/// Channels an event fans out to. No variant targets more than two.
pub type TargetChannels = SmallVec<[Channel; 2]>;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedProduct {
    pub id: u64,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationGenerated {
    pub user_id: u64,
    #[serde(default)]
    pub recommendations: Vec<RecommendedProduct>,
    pub algorithm: String,
    #[serde(default)]
    pub processing_time_seconds: f64,
}

/// A fraud risk score in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct RiskScore(f64);

impl RiskScore {
    pub fn new(score: f64) -> Result<Self, EventError> {
        if score.is_finite() && (0.0..=100.0).contains(&score) {
            Ok(Self(score))
        } else {
            Err(EventError::InvalidRiskScore(score))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for RiskScore {
    type Error = EventError;

    fn try_from(score: f64) -> Result<Self, Self::Error> {
        Self::new(score)
    }
}

impl From<RiskScore> for f64 {
    fn from(score: RiskScore) -> Self {
        score.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Conventional banding for producers that do not grade scores themselves.
    pub fn from_score(score: RiskScore) -> Self {
        match score.value() {
            s if s < 30.0 => RiskLevel::Low,
            s if s < 60.0 => RiskLevel::Medium,
            s if s < 85.0 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAlertCreated {
    pub alert_id: u64,
    pub transaction_id: u64,
    pub seller_id: u64,
    pub risk_score: RiskScore,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub indicators: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentAnalysisComplete {
    pub product_id: u64,
    pub seller_id: u64,
    pub total_reviews: u64,
    pub overall_sentiment: Sentiment,
    #[serde(default)]
    pub sentiment_breakdown: BTreeMap<Sentiment, u64>,
    #[serde(default)]
    pub fake_reviews_detected: u64,
}

// ---------------------------------------------------------------------------
// DomainEvent
// ---------------------------------------------------------------------------

/// The closed set of events the real-time layer broadcasts.
///
/// Serialized adjacently tagged (`{"event": ..., "data": ...}`), which is the
/// body accepted by the service publish endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum DomainEvent {
    #[serde(rename = "recommendation.generated")]
    RecommendationGenerated(RecommendationGenerated),
    #[serde(rename = "fraud.alert.created")]
    FraudAlertCreated(FraudAlertCreated),
    #[serde(rename = "sentiment.analysis.complete")]
    SentimentAnalysisComplete(SentimentAnalysisComplete),
}

impl crate::signature::Signature for DomainEvent {}

impl DomainEvent {
    /// The event-type discriminator used for client-side routing.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::RecommendationGenerated(_) => RECOMMENDATION_GENERATED,
            DomainEvent::FraudAlertCreated(_) => FRAUD_ALERT_CREATED,
            DomainEvent::SentimentAnalysisComplete(_) => SENTIMENT_ANALYSIS_COMPLETE,
        }
    }

    /// Channels this event is delivered to.
    pub fn target_channels(&self, route: RecommendationRoute) -> TargetChannels {
        match self {
            DomainEvent::RecommendationGenerated(e) => match route {
                RecommendationRoute::User => smallvec![Channel::AiUser(e.user_id)],
                RecommendationRoute::Notifications => {
                    smallvec![Channel::AiNotifications(e.user_id)]
                }
            },
            DomainEvent::FraudAlertCreated(e) => {
                smallvec![Channel::FraudSeller(e.seller_id), Channel::FraudAdmin]
            }
            DomainEvent::SentimentAnalysisComplete(e) => {
                smallvec![Channel::SentimentSeller(e.seller_id)]
            }
        }
    }

    /// Serialize the variant's payload (the envelope's `data` field).
    pub fn payload(&self) -> Result<serde_json::Value, EventError> {
        let value = match self {
            DomainEvent::RecommendationGenerated(e) => serde_json::to_value(e)?,
            DomainEvent::FraudAlertCreated(e) => serde_json::to_value(e)?,
            DomainEvent::SentimentAnalysisComplete(e) => serde_json::to_value(e)?,
        };
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// EventEnvelope
// ---------------------------------------------------------------------------

/// Versioned wire form of a published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub version: u16,
    pub event_id: Uuid,
    /// Unix timestamp (seconds) at which the event was published.
    pub occurred_at: i64,
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// Seal `event` into an envelope with the given identity.
    pub fn seal(event_id: Uuid, occurred_at: i64, event: &DomainEvent) -> Result<Self, EventError> {
        Ok(Self {
            version: ENVELOPE_VERSION,
            event_id,
            occurred_at,
            event: event.event_name().to_owned(),
            data: event.payload()?,
        })
    }

    /// `true` if the envelope names one of the events this crate knows.
    pub fn is_known(&self) -> bool {
        matches!(
            self.event.as_str(),
            RECOMMENDATION_GENERATED | FRAUD_ALERT_CREATED | SENTIMENT_ANALYSIS_COMPLETE
        )
    }

    /// Decode the typed event carried by this envelope.
    pub fn decode(&self) -> Result<DomainEvent, EventError> {
        if self.version > ENVELOPE_VERSION {
            return Err(EventError::UnsupportedVersion(self.version));
        }
        let data = self.data.clone();
        let event = match self.event.as_str() {
            RECOMMENDATION_GENERATED => {
                DomainEvent::RecommendationGenerated(serde_json::from_value(data)?)
            }
            FRAUD_ALERT_CREATED => DomainEvent::FraudAlertCreated(serde_json::from_value(data)?),
            SENTIMENT_ANALYSIS_COMPLETE => {
                DomainEvent::SentimentAnalysisComplete(serde_json::from_value(data)?)
            }
            other => return Err(EventError::UnknownEvent(other.to_owned())),
        };
        Ok(event)
    }
}
