//! Bazaar broadcast SDK.
//!
//! Shared wire types for the marketplace real-time layer (domain events,
//! channel names, principals, WebSocket frames) and the signing schemes used
//! by every endpoint. Enable the `client` feature for the HTTP clients and the
//! reconnecting [`client::SubscriptionManager`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod objects;
pub mod signature;
pub mod token;

#[cfg(feature = "client")]
pub mod client;
