//! Runtime configuration for the broadcast service.
//!
//! These are validated values shared across crates. Loading and parsing the
//! TOML file is the server crate's job.

mod broadcasting;
mod secrets;
mod server;

pub use broadcasting::BroadcastingConfig;
pub use secrets::{ServiceConfig, TokenConfig};
pub use server::ServerConfig;

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared configuration with a separate lock per section, so a reload of
/// one section never blocks readers of another.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    /// Channel grant signing and event routing.
    pub broadcasting: Arc<RwLock<BroadcastingConfig>>,
    /// Bearer token verification.
    pub tokens: Arc<RwLock<TokenConfig>>,
    /// Signed publishing from marketplace backends.
    pub service: Arc<RwLock<ServiceConfig>>,
}

impl SharedConfig {
    pub fn new(
        server: ServerConfig,
        broadcasting: BroadcastingConfig,
        tokens: TokenConfig,
        service: ServiceConfig,
    ) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            broadcasting: Arc::new(RwLock::new(broadcasting)),
            tokens: Arc::new(RwLock::new(tokens)),
            service: Arc::new(RwLock::new(service)),
        }
    }
}
