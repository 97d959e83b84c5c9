use std::net::SocketAddr;

/// Listener settings. Changing `listen` requires a restart.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}
