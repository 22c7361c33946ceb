//! # Guide Persistence Library
//!
//! Stores guide documents and keeps the shared guide index consistent with
//! them, over one of several interchangeable key-value backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Application Layer                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   GuideRepository trait                      │
//! │     (validation + defaults from guide_domain::contract)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      KvDriver trait                          │
//! │        guide:<id>  (record)     guides_index  (index)        │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                    │
//!          ▼                   ▼                    ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌──────────────────────┐
//! │   Filesystem    │ │      Redis      │ │   Managed KV (REST)  │
//! │ (atomic rename) │ │                 │ │                      │
//! └─────────────────┘ └─────────────────┘ └──────────────────────┘
//! ```
//!
//! ## Features
//!
//! - `redis`: Enable the Redis-protocol driver (default)
//! - `rest`: Enable the managed KV REST driver (default)
//!
//! The filesystem and in-memory drivers are always available.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use guide_persistence::{GuideRepository, StorageConfig};
//! use guide_domain::GuideInput;
//!
//! let repo = guide_persistence::open_repository(&StorageConfig::from_env()).await?;
//!
//! let guide = repo.create(GuideInput::new("Getting started")).await?;
//! let summaries = repo.list_summaries().await;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod driver;
pub mod error;
pub mod repository;

// Re-export commonly used types
pub use driver::{BackendKind, KvDriver, MemoryDriver, SharedDriver, StorageConfig};
pub use error::{PersistenceError, Result};
pub use repository::{GuideRepository, KvGuideRepository, ReconcileReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Repository over the process-wide driver for `config`
///
/// # Errors
///
/// Returns an error if the selected backend cannot be connected.
pub async fn open_repository(config: &StorageConfig) -> Result<KvGuideRepository> {
    let driver = driver::shared_driver(config).await?;
    Ok(KvGuideRepository::new(driver))
}
