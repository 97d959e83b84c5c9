//! Configuration module for bazaar-server.
//!
//! Handles loading configuration from TOML files, CLI arguments, and
//! environment variables.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{
    BroadcastingConfig, ServerConfig, ServiceConfig, SharedConfig, TokenConfig,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub broadcasting: BroadcastingConfig,
    pub tokens: TokenConfig,
    pub service: ServiceConfig,
}

impl LoadedConfig {
    /// Validate a parsed file and convert it to runtime types.
    pub fn from_file(file_config: FileConfig) -> Result<Self, ConfigError> {
        validate(&file_config)?;
        let FileConfig {
            server,
            broadcasting,
            tokens,
            service,
        } = file_config;

        Ok(Self {
            server: ServerConfig {
                listen: server.listen,
            },
            broadcasting: BroadcastingConfig {
                app_key: broadcasting.app_key,
                app_secret: broadcasting.app_secret,
                recommendation_route: broadcasting.recommendation_route,
                activity_timeout: broadcasting.activity_timeout,
            },
            tokens: TokenConfig {
                secret: tokens.secret,
            },
            service: ServiceConfig {
                secret: service.secret,
            },
        })
    }

    /// Convert into a SharedConfig with Arc<RwLock<T>> wrappers.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig::new(self.server, self.broadcasting, self.tokens, self.service)
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides, validate and convert.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        LoadedConfig::from_file(file_config)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let app_key = &config.broadcasting.app_key;
    if app_key.is_empty() || app_key.contains(':') {
        return Err(ConfigError::ValidationError(
            "broadcasting.app_key must be non-empty and must not contain ':'".to_owned(),
        ));
    }

    for (name, secret) in [
        ("broadcasting.app_secret", &config.broadcasting.app_secret),
        ("tokens.secret", &config.tokens.secret),
        ("service.secret", &config.service.secret),
    ] {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::ValidationError(format!(
                "{name} must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
    }

    if config.broadcasting.activity_timeout == 0 {
        return Err(ConfigError::ValidationError(
            "broadcasting.activity_timeout must be positive".to_owned(),
        ));
    }
    Ok(())
}

/// Get the database URL from the environment, if one is configured.
///
/// Without it the server runs with no conversation lookup and every
/// `ai.chat.*` channel is refused.
pub fn get_database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<LoadedConfig, ConfigError> {
        LoadedConfig::from_file(toml::from_str(toml_str)?)
    }

    const VALID: &str = r#"
[broadcasting]
app_key = "bazaar"
app_secret = "0123456789abcdef0123"

[tokens]
secret = "token-secret-token-secret"

[service]
secret = "service-secret-service"
"#;

    #[test]
    fn test_valid_config_converts() {
        let loaded = parse(VALID).unwrap();
        assert_eq!(loaded.broadcasting.app_key, "bazaar");
        assert_eq!(loaded.broadcasting.activity_timeout, 30);
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let short = VALID.replace("token-secret-token-secret", "short");
        let err = parse(&short).unwrap_err();
        assert!(err.to_string().contains("tokens.secret"), "{err}");
    }

    #[test]
    fn test_app_key_with_colon_is_rejected() {
        let bad = VALID.replace("app_key = \"bazaar\"", "app_key = \"a:b\"");
        assert!(matches!(parse(&bad), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_loader_applies_listen_override() {
        let path = std::env::temp_dir().join(format!("bazaar-config-{}.toml", std::process::id()));
        std::fs::write(&path, VALID).unwrap();

        let listen: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loaded = ConfigLoader::new(&path, Some(listen)).load().unwrap();
        assert_eq!(loaded.server.listen, listen);

        std::fs::remove_file(&path).unwrap();
    }
}
