//! Broadcaster processor.
//!
//! The Broadcaster is responsible for:
//! - Receiving `PendingBroadcast` from the queue, one at a time
//! - Sealing each event into its `EventEnvelope`
//! - Handing the envelope to the transport once per channel resolved when
//!   the event was published
//!
//! A single task drains the queue, so events reach any given channel in the
//! order they were published. A failed delivery is logged and the loop
//! moves on; it never takes other channels down with it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::events::{BroadcastReceiver, PendingBroadcast};
use crate::hub::Transport;

pub struct Broadcaster {
    queue_rx: BroadcastReceiver,
    transport: Arc<dyn Transport>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Broadcaster {
    pub fn new(
        queue_rx: BroadcastReceiver,
        transport: Arc<dyn Transport>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue_rx,
            transport,
            shutdown_rx,
        }
    }

    /// Run until shutdown or until every dispatcher is dropped.
    ///
    /// Events already queued when shutdown is signalled are still delivered.
    pub async fn run(mut self) {
        info!("Broadcaster started");

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Broadcaster received shutdown signal");
                        break;
                    }
                }

                pending = self.queue_rx.recv() => match pending {
                    Some(pending) => self.broadcast(pending).await,
                    None => {
                        info!("Broadcast queue closed");
                        break;
                    }
                },
            }
        }

        self.queue_rx.close();
        while let Some(pending) = self.queue_rx.recv().await {
            self.broadcast(pending).await;
        }

        info!("Broadcaster shutdown complete");
    }

    async fn broadcast(&self, pending: PendingBroadcast) {
        let envelope = match pending.envelope() {
            Ok(envelope) => Arc::new(envelope),
            Err(e) => {
                error!(event_id = %pending.event_id, error = %e, "Failed to seal event");
                return;
            }
        };
        for channel in &pending.channels {
            match self.transport.deliver(channel, Arc::clone(&envelope)).await {
                Ok(reached) => debug!(
                    %channel,
                    event = %envelope.event,
                    event_id = %envelope.event_id,
                    reached,
                    "Event broadcast"
                ),
                Err(e) => warn!(
                    %channel,
                    event_id = %envelope.event_id,
                    error = %e,
                    "Event delivery failed"
                ),
            }
        }
    }
}
