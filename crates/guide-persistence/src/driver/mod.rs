//! # Key-Value Drivers
//!
//! One uniform get/set/delete interface over the storage backends. Values are
//! JSON documents; each driver serializes them the way its backend needs.
//!
//! Exactly one driver is active per process, chosen by [`StorageConfig`].

pub mod config;
pub mod filesystem;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_client;
#[cfg(feature = "rest")]
pub mod rest_client;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::{PersistenceError, Result};

pub use config::{BackendKind, FilesystemConfig, RedisConfig, RestConfig, StorageConfig};
pub use filesystem::FilesystemDriver;
pub use memory::MemoryDriver;
#[cfg(feature = "redis")]
pub use redis_client::RedisDriver;
#[cfg(feature = "rest")]
pub use rest_client::RestDriver;

/// Key holding the guide index
pub const INDEX_KEY: &str = "guides_index";

/// Prefix of per-guide record keys
pub const GUIDE_KEY_PREFIX: &str = "guide:";

/// Record key for a guide id
pub fn guide_key(id: &str) -> String {
    format!("{GUIDE_KEY_PREFIX}{id}")
}

/// Storage backend contract
#[async_trait]
pub trait KvDriver: Send + Sync {
    /// Which backend this driver talks to
    fn backend(&self) -> BackendKind;

    /// Read a value, `None` if the key is absent
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Remove a key. Returns whether a value was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All keys starting with `prefix`, in no particular order
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Driver shared across repositories and handlers
pub type SharedDriver = Arc<dyn KvDriver>;

static SHARED_DRIVER: OnceCell<SharedDriver> = OnceCell::const_new();

/// Construct a driver for `config`.
///
/// # Errors
///
/// Returns an error if the backend cannot be reached or was compiled out.
pub async fn connect(config: &StorageConfig) -> Result<SharedDriver> {
    tracing::info!(backend = %config.backend(), "Connecting storage driver");

    match config {
        StorageConfig::Filesystem(fs) => Ok(Arc::new(FilesystemDriver::new(fs.data_dir.clone()))),
        #[cfg(feature = "redis")]
        StorageConfig::Redis(redis) => Ok(Arc::new(RedisDriver::new(redis).await?)),
        #[cfg(not(feature = "redis"))]
        StorageConfig::Redis(_) => Err(PersistenceError::BackendUnavailable("redis")),
        #[cfg(feature = "rest")]
        StorageConfig::Rest(rest) => Ok(Arc::new(RestDriver::new(rest.clone())?)),
        #[cfg(not(feature = "rest"))]
        StorageConfig::Rest(_) => Err(PersistenceError::BackendUnavailable("rest")),
    }
}

/// Process-wide driver, connected on first call.
///
/// Later calls return the same driver and ignore `config`.
///
/// # Errors
///
/// Returns the connection error when this call had to connect and failed.
/// Nothing is cached on failure, so the next call tries again.
pub async fn shared_driver(config: &StorageConfig) -> Result<SharedDriver> {
    SHARED_DRIVER
        .get_or_try_init(|| connect(config))
        .await
        .map(Arc::clone)
}

/// Decode a stored value, naming the key on failure
pub(crate) fn decode<T: serde::de::DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| PersistenceError::Serialization(format!("{key}: {e}")))
}
