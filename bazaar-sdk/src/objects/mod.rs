pub mod auth;
pub mod channel;
pub mod events;
pub mod principal;
pub mod ws;

pub use auth::{BroadcastAuthRequest, BroadcastAuthResponse, ErrorBody, PresenceMember, PublishReceipt};
pub use channel::{Channel, ChannelName, ChannelParseError, Visibility};
pub use events::{
    DomainEvent, EventEnvelope, EventError, FraudAlertCreated, RecommendationGenerated,
    RecommendationRoute, RecommendedProduct, RiskLevel, RiskScore, Sentiment,
    SentimentAnalysisComplete, TargetChannels,
};
pub use principal::{Principal, Role};
pub use ws::{ClientFrame, ServerFrame, WsCloseCode};
