//! # Redis Driver
//!
//! Redis-protocol backend. Values are stored as JSON text under plain string
//! keys, with no expiry.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::Value;

use super::{BackendKind, KvDriver, RedisConfig};
use crate::error::{PersistenceError, Result};

/// Redis driver with an auto-reconnecting connection
#[derive(Clone)]
pub struct RedisDriver {
    conn: ConnectionManager,
}

impl RedisDriver {
    /// Connect to the server named by `config.url`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Redis connected");

        Ok(Self { conn })
    }
}

#[async_trait]
impl KvDriver for RedisDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        tracing::debug!(key, found = value.is_some(), "Redis GET");

        match value {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| PersistenceError::Serialization(format!("{key}: {e}"))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(value)?;
        let _: () = conn.set(key, json).await?;
        tracing::debug!(key, "Redis SET");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(key).await?;
        tracing::debug!(key, deleted, "Redis DEL");
        Ok(deleted > 0)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");

        let mut keys = Vec::new();
        let mut iter = conn.scan_match::<_, String>(&pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }
}
