//! Service API client (marketplace backend → broadcast server).
//!
//! Requests use body-signed HMAC-SHA256 authentication via
//! [`SignedObject`].

use reqwest::Client;
use url::Url;

use super::{ClientError, parse_response};
use crate::objects::auth::PublishReceipt;
use crate::objects::events::DomainEvent;
use crate::signature::{SIGNATURE_HEADER, SignedObject};

/// Typed HTTP client for the **Service API**.
///
/// Used by the jobs and request handlers that detect a state change to hand
/// the resulting [`DomainEvent`] to the broadcast server. The server only
/// enqueues the event; the call returns before any subscriber sees it.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    base_url: Url,
    secret: Vec<u8>,
}

impl ServiceClient {
    /// Create a new `ServiceClient`.
    ///
    /// * `base_url` – root URL of the broadcast server.
    /// * `service_secret` – the shared HMAC secret for body signing.
    pub fn new(base_url: Url, service_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret: service_secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one (e.g. to
    /// configure timeouts or a proxy).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/v1/service/events` – enqueue an event for broadcast.
    pub async fn publish(&self, event: DomainEvent) -> Result<PublishReceipt, ClientError> {
        let signed = SignedObject::new(event, &self.secret)?;

        let url = self.base_url.join("/api/v1/service/events")?;

        let resp = self
            .http
            .post(url)
            .header(SIGNATURE_HEADER, signed.to_header())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(signed.json)
            .send()
            .await?;

        parse_response(resp).await
    }
}
