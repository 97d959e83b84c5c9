//! Application state shared across all request handlers.

use std::future::Future;
use std::sync::Arc;

use bazaar_core::config::SharedConfig;
use bazaar_core::events::{BroadcastDispatcher, broadcast_queue};
use bazaar_core::gate::{ChannelGate, ConversationOwnership};
use bazaar_core::hub::ChannelHub;
use bazaar_core::processors::Broadcaster;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::watch;

/// Application state that is shared across all request handlers.
///
/// Cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration (reloaded on SIGHUP).
    pub config: SharedConfig,
    pub gate: ChannelGate,
    /// Live channel subscriptions of every WebSocket connection.
    pub hub: ChannelHub,
    pub dispatcher: BroadcastDispatcher,
    /// Flips to `true` when WebSocket connections should close.
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Handle to the background tasks started by [`AppState::assemble`].
///
/// Shutdown runs in two steps: the broadcaster drains the queue into the
/// hub first, then WebSocket connections flush what they hold and close.
pub struct Background {
    drain_tx: Arc<watch::Sender<bool>>,
    close_tx: Arc<watch::Sender<bool>>,
    drained: Shared<BoxFuture<'static, ()>>,
}

impl Background {
    /// Stop the broadcaster and close connections at once, without waiting
    /// for the queue to drain.
    pub fn signal_shutdown(&self) {
        let _ = self.drain_tx.send(true);
        let _ = self.close_tx.send(true);
    }

    /// Wrap `signal` so an orderly wind-down starts as soon as it fires.
    ///
    /// Pass the result to `with_graceful_shutdown`: open WebSocket
    /// connections then close themselves instead of holding the server up.
    pub fn shutdown_after<F>(&self, signal: F) -> impl Future<Output = ()> + Send + 'static
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let wind_down = self.wind_down();
        async move {
            signal.await;
            wind_down.await;
        }
    }

    /// Drain queued events into the hub, then close connections.
    pub async fn stop(self) {
        self.wind_down().await;
    }

    fn wind_down(&self) -> impl Future<Output = ()> + Send + 'static {
        let drain_tx = Arc::clone(&self.drain_tx);
        let close_tx = Arc::clone(&self.close_tx);
        let drained = self.drained.clone();
        async move {
            let _ = drain_tx.send(true);
            drained.await;
            let _ = close_tx.send(true);
        }
    }
}

impl AppState {
    /// Wire the gate, hub, dispatcher and broadcaster together.
    ///
    /// Must be called inside a Tokio runtime: the broadcaster is spawned here.
    pub fn assemble(
        config: SharedConfig,
        conversations: Arc<dyn ConversationOwnership>,
    ) -> (Self, Background) {
        let (drain_tx, drain_rx) = watch::channel(false);
        let (close_tx, close_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = broadcast_queue();
        let hub = ChannelHub::new();

        let broadcaster = Broadcaster::new(queue_rx, Arc::new(hub.clone()), drain_rx);
        let drained = tokio::spawn(broadcaster.run())
            .map(|result| {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Broadcaster task failed");
                }
            })
            .boxed()
            .shared();

        let state = Self {
            config,
            gate: ChannelGate::new(conversations),
            hub,
            dispatcher: BroadcastDispatcher::new(queue_tx),
            shutdown_rx: close_rx,
        };
        (
            state,
            Background {
                drain_tx: Arc::new(drain_tx),
                close_tx: Arc::new(close_tx),
                drained,
            },
        )
    }
}
