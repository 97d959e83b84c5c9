//! Channel authorization client (subscriber → broadcast server).

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::{ClientError, parse_response};
use crate::objects::auth::{BroadcastAuthRequest, BroadcastAuthResponse};
use crate::objects::channel::ChannelName;

/// Obtains channel grants for a connected socket.
///
/// [`AuthClient`] is the HTTP implementation; the subscription manager only
/// depends on this trait.
#[async_trait]
pub trait ChannelAuthorizer: Send + Sync {
    /// Request a grant for `channel` bound to `socket_id`.
    ///
    /// Must return [`ClientError::Forbidden`] when the server refuses.
    async fn authorize(
        &self,
        socket_id: &str,
        channel: &ChannelName,
    ) -> Result<BroadcastAuthResponse, ClientError>;
}

/// Typed HTTP client for `POST /broadcasting/auth`.
///
/// Every request carries `Authorization: Bearer {token}`. The server
/// re-evaluates the grant on every call; nothing is cached here.
#[derive(Debug, Clone)]
pub struct AuthClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl AuthClient {
    /// Create a new `AuthClient`.
    ///
    /// * `base_url` – root URL of the broadcast server.
    /// * `token` – the principal's bearer token.
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            token: token.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }
}

#[async_trait]
impl ChannelAuthorizer for AuthClient {
    async fn authorize(
        &self,
        socket_id: &str,
        channel: &ChannelName,
    ) -> Result<BroadcastAuthResponse, ClientError> {
        let url = self.base_url.join("/broadcasting/auth")?;

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&BroadcastAuthRequest {
                channel_name: channel.to_string(),
                socket_id: socket_id.to_owned(),
            })
            .send()
            .await?;

        parse_response(resp).await
    }
}
