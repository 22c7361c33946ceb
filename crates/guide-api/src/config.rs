//! # API Configuration
//!
//! Environment-based configuration for the guide API service.

use std::env;
use std::net::{AddrParseError, SocketAddr};

use guide_persistence::StorageConfig;

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub server_addr: SocketAddr,

    /// Logging level used when `RUST_LOG` is unset
    pub log_level: String,

    /// CORS allowed origins, `*` for any
    pub cors_origins: Vec<String>,

    /// Storage backend selection
    pub storage: StorageConfig,
}

/// Invalid configuration value
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid SERVER_ADDR '{value}': {source}")]
    InvalidServerAddr {
        value: String,
        #[source]
        source: AddrParseError,
    },
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `SERVER_ADDR` is not a socket address.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// Returns an error if `SERVER_ADDR` is not a socket address.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server_addr = lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let server_addr = server_addr
            .parse::<SocketAddr>()
            .map_err(|source| ConfigError::InvalidServerAddr {
                value: server_addr.clone(),
                source,
            })?;

        Ok(Self {
            server_addr,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            cors_origins: lookup("CORS_ORIGINS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect(),

            storage: StorageConfig::from_lookup(&lookup),
        })
    }
}
