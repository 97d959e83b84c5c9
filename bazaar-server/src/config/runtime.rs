//! Runtime configuration re-exports.
//!
//! The validated types live in `bazaar-core::config` so processors can read
//! them without depending on the server crate.

pub use bazaar_core::config::{
    BroadcastingConfig, ServerConfig, ServiceConfig, SharedConfig, TokenConfig,
};
