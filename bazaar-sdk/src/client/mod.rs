//! Clients for the broadcast service.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `reqwest` or `tokio-tungstenite`.
//!
//! - [`AuthClient`] – `POST /broadcasting/auth` on behalf of a bearer token.
//! - [`ServiceClient`] – signed event publishing for marketplace backends.
//! - [`SubscriptionManager`] – the reconnecting WebSocket subscriber.

mod auth;
mod backoff;
mod book;
mod feed;
mod handlers;
mod service;
mod subscription;

pub use auth::{AuthClient, ChannelAuthorizer};
pub use backoff::ReconnectPolicy;
pub use book::ChannelState;
pub use feed::MarketplaceFeed;
pub use handlers::EventHandlers;
pub use service::ServiceClient;
pub use subscription::{ClientNotice, ConnectionState, ManagerConfig, SubscriptionManager};

use reqwest::StatusCode;

use crate::objects::channel::ChannelParseError;
use crate::signature::SignatureError;

/// Errors produced by the SDK clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// HMAC signature could not be computed or verified.
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    /// The server refused a channel grant.
    #[error("forbidden")]
    Forbidden,

    /// The server rejected the bearer credential.
    #[error("unauthorized")]
    Unauthorized,

    /// The server returned a non-2xx status code.
    #[error("api error: status {status}, body: {body}")]
    Api { status: StatusCode, body: String },

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// A channel name could not be parsed.
    #[error("invalid channel: {0}")]
    Channel(#[from] ChannelParseError),

    /// The subscription manager has stopped.
    #[error("subscription manager stopped")]
    Stopped,
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    match status {
        StatusCode::FORBIDDEN => return Err(ClientError::Forbidden),
        StatusCode::UNAUTHORIZED => return Err(ClientError::Unauthorized),
        _ => {}
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
