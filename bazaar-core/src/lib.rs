#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod conversations;
pub mod events;
pub mod gate;
pub mod hub;
pub mod processors;
