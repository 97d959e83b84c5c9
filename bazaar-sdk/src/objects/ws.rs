//! WebSocket frames for the channel transport.
//!
//! The `GET /app` endpoint upgrades to a WebSocket after the bearer token
//! has been verified (an invalid or expired token is answered with `401`
//! before the upgrade).
//!
//! # Protocol
//!
//! 1. The server sends [`ServerFrame::ConnectionEstablished`] carrying the
//!    `socket_id` that channel grants must be signed for.
//! 2. The client obtains a grant from `POST /broadcasting/auth` and sends
//!    [`ClientFrame::Subscribe`] with it. The server answers
//!    [`ServerFrame::SubscriptionSucceeded`] or
//!    [`ServerFrame::SubscriptionError`] (status `403`).
//! 3. Events published to a subscribed channel arrive as
//!    [`ServerFrame::Event`], in publish order per channel.
//! 4. [`ClientFrame::Unsubscribe`] releases a channel. It is idempotent and
//!    never answered.
//!
//! All frames are internally tagged JSON text frames:
//!
//! ```json
//! {"type":"subscribe","channel":"private-ai.user.42","auth":"app:9f..."}
//! {"type":"event","channel":"private-ai.user.42","data":{ ... }}
//! ```

use serde::{Deserialize, Serialize};

use super::events::EventEnvelope;

/// Client-to-server frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        channel: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel_data: Option<String>,
    },
    Unsubscribe {
        channel: String,
    },
    Ping,
}

/// Server-to-client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ConnectionEstablished {
        socket_id: String,
        /// Seconds of silence after which the client should send a ping.
        activity_timeout: u64,
    },
    SubscriptionSucceeded {
        channel: String,
    },
    SubscriptionError {
        channel: String,
        /// HTTP-equivalent status, `403` for a refused grant.
        status: u16,
    },
    Event {
        channel: String,
        data: EventEnvelope,
    },
    Pong,
    /// A protocol error that does not close the connection.
    Error {
        code: u16,
        message: String,
    },
}

/// Application error and close codes used by the channel transport.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct WsCloseCode;

impl WsCloseCode {
    pub const NORMAL: u16 = 1000;

    /// The server is shutting down.
    pub const GOING_AWAY: u16 = 1001;

    /// A client frame could not be parsed.
    pub const MALFORMED_FRAME: u16 = 4000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_shapes() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe","channel":"private-ai.user.1","auth":"k:00"}"#)
                .unwrap();
        assert_eq!(
            frame,
            ClientFrame::Subscribe {
                channel: "private-ai.user.1".to_owned(),
                auth: Some("k:00".to_owned()),
                channel_data: None,
            }
        );

        let json = serde_json::to_string(&ClientFrame::Ping).unwrap();
        assert_eq!(json, r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_unknown_frame_type_is_an_error() {
        assert!(serde_json::from_str::<ServerFrame>(r#"{"type":"member_added"}"#).is_err());
    }
}
