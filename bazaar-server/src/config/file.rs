//! TOML file configuration structures.
//!
//! These structs directly map to the `bazaar-config.toml` file format.

use bazaar_sdk::objects::RecommendationRoute;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub broadcasting: BroadcastingConfig,
    pub tokens: TokenConfig,
    pub service: ServiceConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Channel grant signing and event routing.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastingConfig {
    pub app_key: String,
    pub app_secret: String,
    /// `user` (default) sends recommendations to `ai.user.{id}`,
    /// `notifications` to `ai.notifications.user.{id}`.
    #[serde(default)]
    pub recommendation_route: RecommendationRoute,
    #[serde(default = "default_activity_timeout")]
    pub activity_timeout: u64,
}

fn default_activity_timeout() -> u64 {
    30
}

/// Bearer token verification.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
}

/// Signed publishing from marketplace backends.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub secret: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[broadcasting]
app_key = "bazaar"
app_secret = "0123456789abcdef0123"
recommendation_route = "notifications"

[tokens]
secret = "token-secret-token-secret"

[service]
secret = "service-secret-service"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.broadcasting.app_key, "bazaar");
        assert_eq!(
            config.broadcasting.recommendation_route,
            RecommendationRoute::Notifications
        );
        assert_eq!(config.broadcasting.activity_timeout, 30);
    }

    #[test]
    fn test_defaults() {
        let toml_str = r#"
[broadcasting]
app_key = "bazaar"
app_secret = "0123456789abcdef0123"

[tokens]
secret = "token-secret-token-secret"

[service]
secret = "service-secret-service"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.broadcasting.recommendation_route, RecommendationRoute::User);
    }
}
