//! Channel grant signing and event routing.

use bazaar_sdk::objects::RecommendationRoute;

#[derive(Debug, Clone)]
pub struct BroadcastingConfig {
    /// Public key prefixed to every `auth` grant.
    pub app_key: String,
    /// HMAC secret for channel grants.
    pub app_secret: String,
    /// Per-user channel that carries recommendation events.
    pub recommendation_route: RecommendationRoute,
    /// Seconds between client pings, announced in `connection_established`.
    pub activity_timeout: u64,
}
