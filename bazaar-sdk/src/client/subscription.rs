//! Reconnecting WebSocket subscriber.
//!
//! A [`SubscriptionManager`] owns one transport connection for one client
//! session. All connection work happens on a single driver task:
//!
//! ```text
//! Connecting ──handshake ok──▶ Connected ──transport lost──▶ Reconnecting{n}
//!     │                            ▲                              │
//!     │                            └────────backoff elapsed───────┘
//!     └─handshake rejected / retries exhausted / shutdown──▶ Disconnected
//! ```
//!
//! Because only the driver reconnects, attempts are serialized, and
//! reconnect requests that arrive while one is already under way are
//! folded into it.
//!
//! Channel grants are per connection. After every reconnect each wanted
//! channel is authorized again before it is reported `Subscribed`.
//!
//! A completed handshake alone does not clear the failure count. It is
//! cleared once the session has proven itself stable: a subscription was
//! confirmed, the server answered a ping or delivered an event, or the
//! connection stayed up for a full keepalive interval. A server that
//! accepts the upgrade and then drops every connection right away is
//! therefore backed off and eventually given up on.
//!
//! Duplicate suppression is keyed by `(channel, event_id)`: one event fanned
//! out to several subscribed channels reaches each channel's handler once.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::ClientError;
use super::auth::ChannelAuthorizer;
use super::backoff::ReconnectPolicy;
use super::book::{ChannelState, SubscriptionBook};
use super::handlers::EventHandlers;
use crate::objects::auth::BroadcastAuthResponse;
use crate::objects::channel::ChannelName;
use crate::objects::ws::{ClientFrame, ServerFrame};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Sink = SplitSink<Socket, Message>;
type Source = SplitStream<Socket>;

/// Connection-level state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { socket_id: String },
    /// The transport was lost; waiting before attempt `attempt`.
    Reconnecting { attempt: u32 },
}

/// Out-of-band signals for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientNotice {
    /// The server refused a channel. Recoverable: call
    /// [`SubscriptionManager::subscribe`] again to retry.
    Forbidden { channel: String },
    /// A grant could not be obtained for a reason other than a refusal.
    AuthorizationFailed { channel: String, reason: String },
    /// An established connection dropped; reconnection follows.
    ConnectionLost { reason: String },
    /// The server rejected the bearer credential. Terminal: re-authenticate
    /// and start a new manager.
    HandshakeRejected { status: u16 },
    /// The reconnect policy gave up. Terminal.
    RetriesExhausted { attempts: u32 },
}

/// Settings for a [`SubscriptionManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// WebSocket endpoint, e.g. `wss://broadcast.example.com/app`.
    pub url: Url,
    /// Bearer token presented during the handshake.
    pub token: String,
    pub reconnect: ReconnectPolicy,
    /// How long to wait for `connection_established` after the upgrade.
    pub handshake_timeout: Duration,
    /// Number of recent `(channel, event_id)` pairs remembered for duplicate
    /// suppression. `0` disables it.
    pub dedup_window: usize,
}

impl ManagerConfig {
    pub fn new(url: Url, token: impl Into<String>) -> Self {
        Self {
            url,
            token: token.into(),
            reconnect: ReconnectPolicy::default(),
            handshake_timeout: Duration::from_secs(10),
            dedup_window: 1024,
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

enum Command {
    Subscribe(String),
    Unsubscribe(String),
    Reconnect,
    Shutdown,
}

struct AuthOutcome {
    channel: String,
    ticket: u64,
    result: Result<BroadcastAuthResponse, ClientError>,
}

/// Handle to a running subscriber.
///
/// Dropping every handle stops the driver, the same as [`shutdown`](Self::shutdown)
/// without waiting for it.
pub struct SubscriptionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    channels: watch::Receiver<BTreeMap<String, ChannelState>>,
    notices: mpsc::UnboundedReceiver<ClientNotice>,
    driver: JoinHandle<()>,
}

impl SubscriptionManager {
    /// Start connecting with `config.token`.
    ///
    /// Returns immediately in [`ConnectionState::Connecting`]. Must be called
    /// inside a Tokio runtime.
    pub fn start(
        config: ManagerConfig,
        authorizer: Arc<dyn ChannelAuthorizer>,
        handlers: EventHandlers,
    ) -> Result<Self, ClientError> {
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| ClientError::Unauthorized)?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (channels_tx, channels_rx) = watch::channel(BTreeMap::new());
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            recent: RecentEvents::new(config.dedup_window),
            settled: false,
            config,
            bearer,
            authorizer,
            handlers,
            book: SubscriptionBook::default(),
            commands: commands_rx,
            state: state_tx,
            channels: channels_tx,
            notices: notices_tx,
            auth_tx,
            auth_rx,
        };

        Ok(Self {
            commands: commands_tx,
            state: state_rx,
            channels: channels_rx,
            notices: notices_rx,
            driver: tokio::spawn(driver.run()),
        })
    }

    /// Ask for `channel` (a full wire name such as `private-ai.user.42`).
    ///
    /// The channel is authorized as soon as a connection is available.
    /// Subscribing to a `Forbidden` channel retries it.
    pub fn subscribe(&self, channel: &str) -> Result<(), ClientError> {
        let name: ChannelName = channel.parse()?;
        self.commands
            .send(Command::Subscribe(name.to_string()))
            .map_err(|_| ClientError::Stopped)
    }

    /// Release `channel`. Calling it again, or for a channel that was never
    /// subscribed, does nothing.
    pub fn unsubscribe(&self, channel: &str) {
        let _ = self.commands.send(Command::Unsubscribe(channel.to_owned()));
    }

    /// Drop the current connection and reconnect now, skipping any pending
    /// backoff. Ignored while a connection attempt is in flight.
    pub fn reconnect(&self) -> Result<(), ClientError> {
        self.commands
            .send(Command::Reconnect)
            .map_err(|_| ClientError::Stopped)
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn channel_state(&self, channel: &str) -> Option<ChannelState> {
        self.channels.borrow().get(channel).copied()
    }

    pub fn watch_channels(&self) -> watch::Receiver<BTreeMap<String, ChannelState>> {
        self.channels.clone()
    }

    /// Next notice, or `None` once the driver has stopped and every notice
    /// has been read.
    pub async fn next_notice(&mut self) -> Option<ClientNotice> {
        self.notices.recv().await
    }

    /// Close the connection and wait for the driver to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.driver.await {
            warn!(error = %e, "subscription driver ended abnormally");
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

enum Exit {
    Shutdown,
    /// The handshake was refused with this HTTP status.
    Rejected(u16),
    /// The application asked for a fresh connection.
    Reconnect,
    /// A connection attempt failed before it was established.
    Failed(String),
    /// An established connection dropped.
    Lost(String),
}

struct Driver {
    config: ManagerConfig,
    bearer: HeaderValue,
    authorizer: Arc<dyn ChannelAuthorizer>,
    handlers: EventHandlers,
    book: SubscriptionBook,
    recent: RecentEvents,
    /// Set once the current session has shown signs of life.
    settled: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    channels: watch::Sender<BTreeMap<String, ChannelState>>,
    notices: mpsc::UnboundedSender<ClientNotice>,
    auth_tx: mpsc::UnboundedSender<AuthOutcome>,
    auth_rx: mpsc::UnboundedReceiver<AuthOutcome>,
}

impl Driver {
    async fn run(mut self) {
        let mut failures: u32 = 0;

        loop {
            let exit = match self.connect().await {
                Ok((sink, source, socket_id, activity_timeout)) => {
                    info!(%socket_id, "connected");
                    self.state.send_replace(ConnectionState::Connected {
                        socket_id: socket_id.clone(),
                    });
                    self.settled = false;
                    let opened = Instant::now();
                    let exit = self
                        .session(sink, source, &socket_id, activity_timeout)
                        .await;
                    if self.settled || opened.elapsed() >= keepalive(activity_timeout) {
                        failures = 0;
                    }
                    self.book.reset_for_reconnect();
                    self.publish_channels();
                    exit
                }
                Err(exit) => exit,
            };

            match exit {
                Exit::Shutdown => break,
                Exit::Rejected(status) => {
                    warn!(status, "handshake rejected, giving up");
                    self.notify(ClientNotice::HandshakeRejected { status });
                    break;
                }
                Exit::Reconnect => {
                    debug!("reconnecting on request");
                    self.state.send_replace(ConnectionState::Connecting);
                }
                Exit::Failed(reason) => {
                    warn!(%reason, attempt = failures + 1, "connection attempt failed");
                    if !self.wait_before_retry(&mut failures).await {
                        break;
                    }
                }
                Exit::Lost(reason) => {
                    warn!(%reason, attempt = failures + 1, "connection lost");
                    self.notify(ClientNotice::ConnectionLost { reason });
                    if !self.wait_before_retry(&mut failures).await {
                        break;
                    }
                }
            }
        }

        self.state.send_replace(ConnectionState::Disconnected);
        self.publish_channels();
        debug!("subscription driver stopped");
    }

    /// Count a failure and sleep per the policy. `false` means stop.
    async fn wait_before_retry(&mut self, failures: &mut u32) -> bool {
        *failures += 1;
        let policy = self.config.reconnect;
        if policy.exhausted(*failures) {
            warn!(attempts = *failures, "reconnect attempts exhausted");
            self.notify(ClientNotice::RetriesExhausted {
                attempts: *failures,
            });
            return false;
        }
        self.state.send_replace(ConnectionState::Reconnecting {
            attempt: *failures,
        });
        self.backoff(policy.delay(*failures - 1)).await
    }

    /// Sleep for `delay` while still recording commands. Returns `false` on
    /// shutdown; a reconnect request cuts the wait short.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => return true,
                    other => {
                        if self.apply_offline(other) {
                            return false;
                        }
                    }
                },
            }
        }
    }

    /// Apply a command while no connection is up. Returns `true` on shutdown.
    fn apply_offline(&mut self, command: Option<Command>) -> bool {
        match command {
            Some(Command::Subscribe(channel)) => {
                self.book.want(&channel);
                self.publish_channels();
            }
            Some(Command::Unsubscribe(channel)) => {
                self.book.release(&channel);
                self.publish_channels();
            }
            Some(Command::Reconnect) => debug!("reconnect already in progress"),
            Some(Command::Shutdown) | None => return true,
        }
        false
    }

    async fn connect(&mut self) -> Result<(Sink, Source, String, u64), Exit> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Exit::Failed(e.to_string()))?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.bearer.clone());

        let connecting = tokio_tungstenite::connect_async(request);
        tokio::pin!(connecting);
        let socket = loop {
            tokio::select! {
                result = &mut connecting => match result {
                    Ok((socket, _)) => break socket,
                    Err(tungstenite::Error::Http(response))
                        if matches!(
                            response.status(),
                            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
                        ) =>
                    {
                        return Err(Exit::Rejected(response.status().as_u16()));
                    }
                    Err(e) => return Err(Exit::Failed(e.to_string())),
                },
                command = self.commands.recv() => {
                    if self.apply_offline(command) {
                        return Err(Exit::Shutdown);
                    }
                }
            }
        };

        let (sink, mut source) = socket.split();
        let established = tokio::time::timeout(self.config.handshake_timeout, async {
            loop {
                match source.next().await {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(ServerFrame::ConnectionEstablished {
                            socket_id,
                            activity_timeout,
                        }) => return Ok((socket_id, activity_timeout)),
                        Ok(other) => debug!(?other, "ignoring frame before connection_established"),
                        Err(e) => warn!(error = %e, "dropping malformed frame"),
                    },
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.to_string()),
                    None => return Err("closed during handshake".to_owned()),
                }
            }
        })
        .await;

        match established {
            Ok(Ok((socket_id, activity_timeout))) => Ok((sink, source, socket_id, activity_timeout)),
            Ok(Err(reason)) => Err(Exit::Failed(reason)),
            Err(_) => Err(Exit::Failed("timed out waiting for connection_established".to_owned())),
        }
    }

    async fn session(
        &mut self,
        mut sink: Sink,
        mut source: Source,
        socket_id: &str,
        activity_timeout: u64,
    ) -> Exit {
        for channel in self.book.pending() {
            self.authorize(channel, socket_id);
        }
        self.publish_channels();

        let period = keepalive(activity_timeout);
        let mut ping = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.on_frame(&text),
                    Some(Ok(Message::Close(frame))) => {
                        return Exit::Lost(format!("closed by server: {frame:?}"));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Exit::Lost(e.to_string()),
                    None => return Exit::Lost("stream ended".to_owned()),
                },
                Some(outcome) = self.auth_rx.recv() => {
                    if let Err(e) = self.on_authorized(outcome, &mut sink).await {
                        return Exit::Lost(e.to_string());
                    }
                }
                command = self.commands.recv() => match command {
                    Some(Command::Subscribe(channel)) => {
                        if self.book.want(&channel) {
                            self.authorize(channel, socket_id);
                        }
                        self.publish_channels();
                    }
                    Some(Command::Unsubscribe(channel)) => {
                        let previous = self.book.release(&channel);
                        self.publish_channels();
                        if matches!(previous, Some(ChannelState::Authorizing | ChannelState::Subscribed)) {
                            let frame = ClientFrame::Unsubscribe { channel };
                            if let Err(e) = send_frame(&mut sink, &frame).await {
                                return Exit::Lost(e.to_string());
                            }
                        }
                    }
                    Some(Command::Reconnect) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return Exit::Reconnect;
                    }
                    Some(Command::Shutdown) | None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return Exit::Shutdown;
                    }
                },
                _ = ping.tick() => {
                    if let Err(e) = send_frame(&mut sink, &ClientFrame::Ping).await {
                        return Exit::Lost(e.to_string());
                    }
                }
            }
        }
    }

    /// Start the grant round-trip for a pending channel on a separate task.
    fn authorize(&mut self, channel: String, socket_id: &str) {
        let Some(ticket) = self.book.begin_authorization(&channel) else {
            return;
        };
        let name = match channel.parse::<ChannelName>() {
            Ok(name) => name,
            Err(e) => {
                warn!(%channel, error = %e, "cannot authorize unparseable channel");
                self.book.fail(&channel);
                return;
            }
        };

        let authorizer = Arc::clone(&self.authorizer);
        let tx = self.auth_tx.clone();
        let socket_id = socket_id.to_owned();
        tokio::spawn(async move {
            let result = authorizer.authorize(&socket_id, &name).await;
            let _ = tx.send(AuthOutcome {
                channel,
                ticket,
                result,
            });
        });
    }

    async fn on_authorized(
        &mut self,
        outcome: AuthOutcome,
        sink: &mut Sink,
    ) -> Result<(), tungstenite::Error> {
        let AuthOutcome {
            channel,
            ticket,
            result,
        } = outcome;
        if !self.book.is_current(&channel, ticket) {
            debug!(%channel, "discarding stale authorization result");
            return Ok(());
        }

        match result {
            Ok(grant) => {
                let frame = ClientFrame::Subscribe {
                    channel,
                    auth: Some(grant.auth),
                    channel_data: grant.channel_data,
                };
                send_frame(sink, &frame).await?;
            }
            Err(ClientError::Forbidden) => {
                info!(%channel, "channel authorization refused");
                self.book.refuse(&channel);
                self.publish_channels();
                self.notify(ClientNotice::Forbidden { channel });
            }
            Err(e) => {
                warn!(%channel, error = %e, "channel authorization failed");
                self.book.fail(&channel);
                self.publish_channels();
                self.notify(ClientNotice::AuthorizationFailed {
                    channel,
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    fn on_frame(&mut self, text: &str) {
        let frame = match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        match frame {
            ServerFrame::SubscriptionSucceeded { channel } => {
                self.settled = true;
                if self.book.confirm(&channel) {
                    debug!(%channel, "subscribed");
                    self.publish_channels();
                }
            }
            ServerFrame::SubscriptionError { channel, status } => {
                if self.book.refuse(&channel) {
                    info!(%channel, status, "subscription refused");
                    self.publish_channels();
                    self.notify(ClientNotice::Forbidden { channel });
                }
            }
            ServerFrame::Event { channel, data } => {
                self.settled = true;
                if !self.recent.insert(&channel, data.event_id) {
                    debug!(%channel, event_id = %data.event_id, "duplicate event suppressed");
                    return;
                }
                if !self.handlers.dispatch(&channel, &data) {
                    debug!(%channel, event = %data.event, "no handler for event, ignored");
                }
            }
            ServerFrame::Error { code, message } => {
                warn!(code, %message, "server reported a protocol error");
            }
            ServerFrame::Pong => self.settled = true,
            ServerFrame::ConnectionEstablished { .. } => {}
        }
    }

    fn publish_channels(&self) {
        self.channels.send_replace(self.book.snapshot());
    }

    fn notify(&self, notice: ClientNotice) {
        let _ = self.notices.send(notice);
    }
}

/// Ping period for a connection; the server's `activity_timeout`, at least 1s.
fn keepalive(activity_timeout: u64) -> Duration {
    Duration::from_secs(activity_timeout.max(1))
}

async fn send_frame(sink: &mut Sink, frame: &ClientFrame) -> Result<(), tungstenite::Error> {
    let json = serde_json::to_string(frame)
        .map_err(|e| tungstenite::Error::Io(std::io::Error::other(e)))?;
    sink.send(Message::Text(json.into())).await
}

/// Bounded memory of recently delivered `(channel, event_id)` pairs.
struct RecentEvents {
    order: VecDeque<(String, Uuid)>,
    seen: HashSet<(String, Uuid)>,
    capacity: usize,
}

impl RecentEvents {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `id` as delivered on `channel`; `false` if it already was.
    fn insert(&mut self, channel: &str, id: Uuid) -> bool {
        if self.capacity == 0 {
            return true;
        }
        let key = (channel.to_owned(), id);
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: &str = "private-ai.user.5";

    #[test]
    fn test_recent_events_window() {
        let mut recent = RecentEvents::new(2);
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        assert!(recent.insert(USER, a));
        assert!(!recent.insert(USER, a));
        assert!(recent.insert(USER, b));
        assert!(recent.insert(USER, c));
        // `a` fell out of the window.
        assert!(recent.insert(USER, a));
        assert!(!recent.insert(USER, c));
    }

    #[test]
    fn test_disabled_window_accepts_everything() {
        let mut recent = RecentEvents::new(0);
        let id = Uuid::now_v7();
        assert!(recent.insert(USER, id));
        assert!(recent.insert(USER, id));
    }

    #[test]
    fn test_one_event_on_two_channels_is_not_a_duplicate() {
        let mut recent = RecentEvents::new(8);
        let id = Uuid::now_v7();
        assert!(recent.insert("private-ai.fraud.seller.7", id));
        assert!(recent.insert("private-ai.fraud.admin", id));
        assert!(!recent.insert("private-ai.fraud.admin", id));
    }

    #[test]
    fn test_keepalive_has_a_floor() {
        assert_eq!(keepalive(0), Duration::from_secs(1));
        assert_eq!(keepalive(30), Duration::from_secs(30));
    }
}
