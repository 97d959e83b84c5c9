//! Request and response bodies of the HTTP endpoints.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `POST /broadcasting/auth` request body.
///
/// `channel_name` stays a plain string so that names the server cannot parse
/// still reach the authorization gate and are answered with `403`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAuthRequest {
    pub channel_name: String,
    pub socket_id: String,
}

/// `POST /broadcasting/auth` success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastAuthResponse {
    /// `{app_key}:{hex_hmac}` over `{socket_id}:{channel_name}[:{channel_data}]`.
    pub auth: String,
    /// JSON-encoded [`PresenceMember`], present for presence channels only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
}

/// Member data attached to presence-channel grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMember {
    pub user_id: u64,
}

/// `POST /api/v1/service/events` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub event_id: Uuid,
    /// Unprefixed names of the channels the event was queued for.
    pub channels: Vec<String>,
}

/// Error body returned by the HTTP endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
