//! # Repository Traits
//!
//! Abstract guide repository. Implementations can be swapped for different
//! storage (key-value drivers, mocks).

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use guide_domain::{Guide, GuideInput, IndexEntry};

/// Repository for Guide entity operations.
///
/// Each guide is stored twice: the full record, and an `{id, title}` entry
/// in a shared index. Every completed operation leaves the two in agreement.
#[async_trait]
pub trait GuideRepository: Send + Sync {
    /// Index entries in insertion order.
    ///
    /// Never fails: an absent or unreadable index yields an empty list.
    async fn list_summaries(&self) -> Vec<IndexEntry>;

    /// Get guide by ID, with defaults filled in
    async fn get_by_id(&self, id: &str) -> Result<Option<Guide>>;

    /// Create a new guide and add it to the index
    async fn create(&self, input: GuideInput) -> Result<Guide>;

    /// Replace a guide's title and chapters. `None` if no such guide.
    async fn update(&self, id: &str, input: GuideInput) -> Result<Option<Guide>>;

    /// Delete a guide and its index entry. `false` if no such guide.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Rebuild the index from the stored records
    async fn reconcile_index(&self) -> Result<ReconcileReport>;
}

/// What [`GuideRepository::reconcile_index`] changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Records that had no index entry
    pub added: Vec<String>,
    /// Entries with no record behind them, or duplicates
    pub removed: Vec<String>,
    /// Entries whose title disagreed with the record
    pub retitled: Vec<String>,
}

impl ReconcileReport {
    /// True when the index already matched the records
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.retitled.is_empty()
    }
}
