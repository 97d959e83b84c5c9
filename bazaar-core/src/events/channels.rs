//! Broadcast queue factory.

use super::types::PendingBroadcast;
use tokio::sync::mpsc;

/// Sender handle for queued broadcasts.
pub type BroadcastSender = mpsc::UnboundedSender<PendingBroadcast>;
/// Receiver handle for queued broadcasts.
pub type BroadcastReceiver = mpsc::UnboundedReceiver<PendingBroadcast>;

/// Create the broadcast queue.
///
/// Unbounded: publishing never waits, and a single FIFO keeps every
/// channel's events in publish order. Memory is bounded in practice by the
/// broadcaster draining faster than AI jobs produce.
pub fn broadcast_queue() -> (BroadcastSender, BroadcastReceiver) {
    mpsc::unbounded_channel()
}
