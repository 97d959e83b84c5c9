/// Secret for verifying bearer tokens issued by the marketplace.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
}

/// Shared secret for signed event publishing.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub secret: String,
}
