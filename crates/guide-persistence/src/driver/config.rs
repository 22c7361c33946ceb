//! Backend selection from configuration.

use std::fmt;
use std::path::PathBuf;

/// Default root for the filesystem backend
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Storage backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Filesystem,
    Redis,
    Rest,
    Memory,
}

impl BackendKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::Redis => "redis",
            Self::Rest => "rest",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Managed KV REST endpoint (Upstash / Vercel KV)
#[derive(Clone)]
pub struct RestConfig {
    pub url: String,
    pub token: String,
}

impl fmt::Debug for RestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Redis-protocol connection
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Local JSON file storage
#[derive(Debug, Clone)]
pub struct FilesystemConfig {
    pub data_dir: PathBuf,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

/// Which driver to construct, and how
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Rest(RestConfig),
    Redis(RedisConfig),
    Filesystem(FilesystemConfig),
}

impl StorageConfig {
    /// Select a backend from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Select a backend from an arbitrary variable source.
    ///
    /// Precedence: a REST URL+token pair (`KV_REST_API_*`, then
    /// `UPSTASH_REDIS_REST_*`), then a connection URL (`KV_URL`, then
    /// `REDIS_URL`), then the filesystem under `DATA_DIR`. Empty values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let rest_url = var("KV_REST_API_URL").or_else(|| var("UPSTASH_REDIS_REST_URL"));
        let rest_token = var("KV_REST_API_TOKEN").or_else(|| var("UPSTASH_REDIS_REST_TOKEN"));
        if let (Some(url), Some(token)) = (rest_url, rest_token) {
            return Self::Rest(RestConfig {
                url: url.trim_end_matches('/').to_string(),
                token,
            });
        }

        if let Some(url) = var("KV_URL").or_else(|| var("REDIS_URL")) {
            return Self::Redis(RedisConfig { url });
        }

        Self::Filesystem(FilesystemConfig {
            data_dir: var("DATA_DIR").map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
        })
    }

    pub const fn backend(&self) -> BackendKind {
        match self {
            Self::Rest(_) => BackendKind::Rest,
            Self::Redis(_) => BackendKind::Redis,
            Self::Filesystem(_) => BackendKind::Filesystem,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem(FilesystemConfig::default())
    }
}
