//! Long-running processors.
//!
//! - `Broadcaster`: drains the broadcast queue and fans each event out to
//!   its target channels.

pub mod broadcaster;

pub use broadcaster::Broadcaster;
