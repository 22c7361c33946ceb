//! Persistence layer error types

use guide_domain::ValidationError;
use thiserror::Error;

/// Persistence layer errors.
///
/// A missing guide is not an error: lookups return `None` and deletes
/// return `false`.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Guide with this ID already exists: {id}")]
    Conflict { id: String },

    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("KV REST request failed: {0}")]
    Http(String),

    #[error("KV REST service returned an error: {0}")]
    Upstream(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend '{0}' is not compiled into this build")]
    BackendUnavailable(&'static str),
}

impl PersistenceError {
    /// Whether the active driver failed, as opposed to the caller's input
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        !matches!(
            self,
            Self::Validation(_) | Self::Conflict { .. } | Self::InvalidKey(_)
        )
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for PersistenceError {
    fn from(err: redis::RedisError) -> Self {
        Self::Redis(err.to_string())
    }
}

#[cfg(feature = "rest")]
impl From<reqwest::Error> for PersistenceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
