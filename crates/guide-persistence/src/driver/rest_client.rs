//! # Managed KV REST Driver
//!
//! Talks to an Upstash-compatible REST endpoint (Vercel KV). Each command is
//! POSTed as a JSON array such as `["GET", "guides_index"]` and answered with
//! `{"result": ...}` or `{"error": "..."}`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{BackendKind, KvDriver, RestConfig};
use crate::error::{PersistenceError, Result};

/// Keys fetched per SCAN round trip
const SCAN_BATCH: &str = "100";

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// REST driver over a shared HTTP client
#[derive(Clone)]
pub struct RestDriver {
    http: reqwest::Client,
    config: RestConfig,
}

impl RestDriver {
    /// Build the HTTP client. No request is sent until first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: RestConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("guide-persistence/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    async fn command(&self, args: Value) -> Result<Value> {
        let resp = self
            .http
            .post(&self.config.url)
            .bearer_auth(&self.config.token)
            .json(&args)
            .send()
            .await?;

        let status = resp.status();
        let body: CommandResponse = resp.json().await?;

        if let Some(error) = body.error {
            return Err(PersistenceError::Upstream(format!("{status}: {error}")));
        }
        if !status.is_success() {
            return Err(PersistenceError::Upstream(status.to_string()));
        }
        Ok(body.result)
    }
}

#[async_trait]
impl KvDriver for RestDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Rest
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let result = self.command(json!(["GET", key])).await?;
        tracing::debug!(key, found = !result.is_null(), "KV GET");
        decode_stored(key, result)
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.command(json!(["SET", key, json])).await?;
        tracing::debug!(key, "KV SET");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = self.command(json!(["DEL", key])).await?;
        tracing::debug!(key, %result, "KV DEL");
        Ok(result.as_i64().unwrap_or_default() > 0)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{prefix}*");
        let mut cursor = "0".to_string();
        let mut keys = Vec::new();

        loop {
            let result = self
                .command(json!(["SCAN", cursor, "MATCH", pattern, "COUNT", SCAN_BATCH]))
                .await?;
            let (next, batch) = parse_scan(&result)?;
            keys.extend(batch);

            if next == "0" {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

/// Values are written as JSON text; anything else is taken as-is
fn decode_stored(key: &str, result: Value) -> Result<Option<Value>> {
    match result {
        Value::Null => Ok(None),
        Value::String(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| PersistenceError::Serialization(format!("{key}: {e}"))),
        other => Ok(Some(other)),
    }
}

/// SCAN answers `[cursor, [key, ...]]`; the cursor may be a string or number
fn parse_scan(result: &Value) -> Result<(String, Vec<String>)> {
    let malformed = || PersistenceError::Upstream(format!("unexpected SCAN reply: {result}"));

    let [cursor, batch] = result.as_array().map(Vec::as_slice).ok_or_else(malformed)? else {
        return Err(malformed());
    };

    let cursor = match cursor {
        Value::String(cursor) => cursor.clone(),
        Value::Number(cursor) => cursor.to_string(),
        _ => return Err(malformed()),
    };
    let keys = batch
        .as_array()
        .ok_or_else(malformed)?
        .iter()
        .filter_map(|key| key.as_str().map(str::to_string))
        .collect();

    Ok((cursor, keys))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json_text() {
        let value = decode_stored("k", json!(r#"{"_id":"a","title":"A"}"#)).unwrap();
        assert_eq!(value, Some(json!({"_id": "a", "title": "A"})));
    }

    #[test]
    fn test_decode_absent_and_structured() {
        assert_eq!(decode_stored("k", Value::Null).unwrap(), None);
        assert_eq!(decode_stored("k", json!([1, 2])).unwrap(), Some(json!([1, 2])));
        assert!(decode_stored("k", json!("{broken")).is_err());
    }

    #[test]
    fn test_parse_scan() {
        let (cursor, keys) = parse_scan(&json!(["17", ["guide:a", "guide:b"]])).unwrap();
        assert_eq!(cursor, "17");
        assert_eq!(keys, vec!["guide:a".to_string(), "guide:b".to_string()]);

        let (cursor, keys) = parse_scan(&json!([0, []])).unwrap();
        assert_eq!(cursor, "0");
        assert!(keys.is_empty());

        assert!(parse_scan(&json!({"cursor": 0})).is_err());
    }

    #[test]
    fn test_driver_builds_without_network() {
        let driver = RestDriver::new(RestConfig {
            url: "https://kv.example.com".into(),
            token: "t".into(),
        })
        .unwrap();
        assert_eq!(driver.backend(), BackendKind::Rest);
    }
}
