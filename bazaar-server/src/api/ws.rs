//! WebSocket channel transport.
//!
//! # Endpoints
//!
//! - `GET /app` – upgrade to the channel protocol described in
//!   [`bazaar_sdk::objects::ws`]
//!
//! The bearer token is verified before the upgrade, so a rejected
//! credential surfaces to the client as an HTTP `401` handshake failure.
//! Each connection then subscribes to hub channels on behalf of its own
//! principal, checking every `subscribe` frame against a grant signed for
//! this connection's `socket_id`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use bazaar_core::config::BroadcastingConfig;
use bazaar_sdk::objects::{
    Channel, ChannelName, ClientFrame, EventEnvelope, Principal, ServerFrame, WsCloseCode,
};
use bazaar_sdk::signature::verify_channel_grant;
use futures_util::stream::SplitSink;
use futures_util::{FutureExt, SinkExt, StreamExt};
use rand::Rng;
use tokio::time::Instant;
use tokio_stream::StreamMap;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use super::extractors::BearerPrincipal;
use crate::state::AppState;

type Sink = SplitSink<WebSocket, Message>;

pub fn router() -> Router<AppState> {
    Router::new().route("/app", get(connect))
}

/// A fresh socket id: two random `u32`s joined by `.`.
pub(crate) fn new_socket_id() -> String {
    let mut rng = rand::rng();
    format!("{}.{}", rng.random::<u32>(), rng.random::<u32>())
}

/// `true` if `socket_id` has the shape produced by [`new_socket_id`].
pub(crate) fn is_socket_id(socket_id: &str) -> bool {
    socket_id
        .split_once('.')
        .is_some_and(|(a, b)| a.parse::<u32>().is_ok() && b.parse::<u32>().is_ok())
}

/// `GET /app`
async fn connect(
    State(state): State<AppState>,
    BearerPrincipal(principal): BearerPrincipal,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| Connection::new(state, principal).run(socket))
}

struct Connection {
    state: AppState,
    principal: Principal,
    socket_id: String,
    /// Hub subscriptions keyed by the wire name the client used.
    streams: StreamMap<String, BroadcastStream<Arc<EventEnvelope>>>,
    channels: HashMap<String, Channel>,
}

impl Connection {
    fn new(state: AppState, principal: Principal) -> Self {
        Self {
            state,
            principal,
            socket_id: new_socket_id(),
            streams: StreamMap::new(),
            channels: HashMap::new(),
        }
    }

    async fn run(mut self, socket: WebSocket) {
        let (mut sink, mut inbound) = socket.split();
        let mut shutdown_rx = self.state.shutdown_rx.clone();
        let activity_timeout = self.state.config.broadcasting.read().await.activity_timeout;
        // Clients ping every `activity_timeout`; allow one missed ping.
        let idle_limit = Duration::from_secs(activity_timeout.saturating_mul(2).max(1));
        let idle = tokio::time::sleep(idle_limit);
        tokio::pin!(idle);

        tracing::info!(socket_id = %self.socket_id, user_id = self.principal.id, "WS: connected");

        let established = ServerFrame::ConnectionEstablished {
            socket_id: self.socket_id.clone(),
            activity_timeout,
        };
        if send_frame(&mut sink, &established).await.is_err() {
            self.release_all();
            return;
        }

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        self.flush_ready(&mut sink).await;
                        close(&mut sink, WsCloseCode::GOING_AWAY, "server shutting down").await;
                        break;
                    }
                }

                message = inbound.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        idle.as_mut().reset(Instant::now() + idle_limit);
                        if self.on_client_frame(text.as_str(), &mut sink).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => idle.as_mut().reset(Instant::now() + idle_limit),
                    Some(Err(e)) => {
                        tracing::debug!(socket_id = %self.socket_id, error = %e, "WS: receive failed");
                        break;
                    }
                },

                Some((channel, delivery)) = self.streams.next(), if !self.streams.is_empty() => {
                    match delivery {
                        Ok(envelope) => {
                            let frame = event_frame(channel, &envelope);
                            if send_frame(&mut sink, &frame).await.is_err() {
                                break;
                            }
                        }
                        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                socket_id = %self.socket_id,
                                %channel,
                                skipped,
                                "WS: subscriber lagged, frames dropped"
                            );
                        }
                    }
                }

                _ = &mut idle => {
                    tracing::info!(socket_id = %self.socket_id, "WS: idle timeout");
                    close(&mut sink, WsCloseCode::NORMAL, "idle timeout").await;
                    break;
                }
            }
        }

        self.release_all();
        tracing::info!(socket_id = %self.socket_id, "WS: disconnected");
    }

    /// Send every hub frame that is already waiting, without blocking.
    ///
    /// The broadcaster has drained by the time connections are told to close,
    /// so this hands over the last queued events before the close frame.
    async fn flush_ready(&mut self, sink: &mut Sink) {
        while let Some(Some((channel, delivery))) = self.streams.next().now_or_never() {
            let Ok(envelope) = delivery else { continue };
            if send_frame(sink, &event_frame(channel, &envelope)).await.is_err() {
                return;
            }
        }
    }

    async fn on_client_frame(&mut self, text: &str, sink: &mut Sink) -> Result<(), axum::Error> {
        let frame = match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(socket_id = %self.socket_id, error = %e, "WS: malformed frame");
                let error = ServerFrame::Error {
                    code: WsCloseCode::MALFORMED_FRAME,
                    message: e.to_string(),
                };
                return send_frame(sink, &error).await;
            }
        };

        match frame {
            ClientFrame::Subscribe {
                channel,
                auth,
                channel_data,
            } => {
                let reply = self.subscribe(channel, auth, channel_data).await;
                send_frame(sink, &reply).await
            }
            ClientFrame::Unsubscribe { channel } => {
                self.unsubscribe(&channel);
                Ok(())
            }
            ClientFrame::Ping => send_frame(sink, &ServerFrame::Pong).await,
        }
    }

    async fn subscribe(
        &mut self,
        channel: String,
        auth: Option<String>,
        channel_data: Option<String>,
    ) -> ServerFrame {
        let name = match channel.parse::<ChannelName>() {
            Ok(name) => name,
            Err(_) => return ServerFrame::SubscriptionError { channel, status: 403 },
        };

        let granted = {
            let broadcasting = self.state.config.broadcasting.read().await;
            auth.as_deref().is_some_and(|auth| {
                grant_is_valid(&broadcasting, auth, &self.socket_id, &channel, channel_data.as_deref())
            })
        };
        if !granted {
            tracing::info!(
                socket_id = %self.socket_id,
                user_id = self.principal.id,
                %channel,
                "WS: subscription refused"
            );
            return ServerFrame::SubscriptionError { channel, status: 403 };
        }

        if !self.streams.contains_key(&channel) {
            let receiver = self.state.hub.subscribe(&name.channel);
            self.streams
                .insert(channel.clone(), BroadcastStream::new(receiver));
            self.channels.insert(channel.clone(), name.channel);
        }
        tracing::debug!(socket_id = %self.socket_id, %channel, "WS: subscribed");
        ServerFrame::SubscriptionSucceeded { channel }
    }

    /// Idempotent; unknown channels are ignored.
    fn unsubscribe(&mut self, channel: &str) {
        if let Some(hub_channel) = self.channels.remove(channel) {
            self.streams.remove(channel);
            self.state.hub.release(&hub_channel);
            tracing::debug!(socket_id = %self.socket_id, %channel, "WS: unsubscribed");
        }
    }

    fn release_all(&mut self) {
        for (name, hub_channel) in self.channels.drain() {
            self.streams.remove(&name);
            self.state.hub.release(&hub_channel);
        }
    }
}

fn grant_is_valid(
    config: &BroadcastingConfig,
    auth: &str,
    socket_id: &str,
    channel: &str,
    channel_data: Option<&str>,
) -> bool {
    verify_channel_grant(
        auth,
        &config.app_key,
        config.app_secret.as_bytes(),
        socket_id,
        channel,
        channel_data,
    )
    .is_ok()
}

/// Serialize `frame` as JSON and send it as a text WebSocket frame.
async fn send_frame(sink: &mut Sink, frame: &ServerFrame) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sink.send(Message::Text(json.into())).await
}

fn event_frame(channel: String, envelope: &EventEnvelope) -> ServerFrame {
    ServerFrame::Event {
        channel,
        data: envelope.clone(),
    }
}

async fn close(sink: &mut Sink, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_id_shape() {
        for _ in 0..32 {
            assert!(is_socket_id(&new_socket_id()));
        }
        assert!(is_socket_id("0.4294967295"));
        assert!(!is_socket_id("1.4294967296"));
        assert!(!is_socket_id("123"));
        assert!(!is_socket_id("a.b"));
        assert!(!is_socket_id("1.2.3"));
    }
}
