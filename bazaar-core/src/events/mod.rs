//! Broadcast queue between publishers and the broadcaster.
//!
//! # Event Flow
//!
//! 1. A publisher calls [`BroadcastDispatcher::publish`], which stamps the
//!    event with an id and time, resolves its target channels and enqueues
//!    a [`PendingBroadcast`].
//! 2. The `Broadcaster` processor drains the queue in order, seals each
//!    event into an envelope and delivers it to the channels resolved at
//!    publish time.

pub mod channels;
pub mod dispatcher;
pub mod types;

pub use channels::{BroadcastReceiver, BroadcastSender, broadcast_queue};
pub use dispatcher::{BroadcastDispatcher, DispatchError};
pub use types::{PendingBroadcast, Queued};
