//! Bazaar broadcast server.
//!
//! Exposed as a library so integration tests can build the same router the
//! binary serves.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod server;
pub mod shutdown;
pub mod state;
