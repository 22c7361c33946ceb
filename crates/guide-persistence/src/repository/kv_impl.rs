//! Key-value repository implementation.
//!
//! Writes are ordered record first, index second. A failure between the two
//! leaves a record without an index entry, never an entry without a record;
//! [`GuideRepository::reconcile_index`] repairs the former.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use super::traits::{GuideRepository, ReconcileReport};
use crate::driver::{GUIDE_KEY_PREFIX, INDEX_KEY, SharedDriver, decode, guide_key};
use crate::error::{PersistenceError, Result};
use guide_domain::{
    Guide, GuideInput, GuideRecord, IndexEntry, generate_id, validate_guide_input,
    with_default_home_page,
};

/// Guide repository backed by a [`KvDriver`](crate::driver::KvDriver)
#[derive(Clone)]
pub struct KvGuideRepository {
    driver: SharedDriver,
}

impl KvGuideRepository {
    pub fn new(driver: SharedDriver) -> Self {
        Self { driver }
    }

    async fn load_record(&self, id: &str) -> Result<Option<GuideRecord>> {
        let key = guide_key(id);
        let Some(value) = self.driver.get(&key).await? else {
            return Ok(None);
        };

        let mut record: GuideRecord = decode(&key, value)?;
        // the key is authoritative
        record.id = id.to_string();
        Ok(Some(record))
    }

    async fn store_guide(&self, guide: &Guide) -> Result<()> {
        let value = serde_json::to_value(guide)?;
        self.driver.set(&guide_key(&guide.id), &value).await
    }

    async fn read_index(&self) -> Result<Vec<IndexEntry>> {
        match self.driver.get(INDEX_KEY).await? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => decode(INDEX_KEY, value),
        }
    }

    async fn write_index(&self, index: &[IndexEntry]) -> Result<()> {
        let value = serde_json::to_value(index)?;
        self.driver.set(INDEX_KEY, &value).await
    }
}

#[async_trait]
impl GuideRepository for KvGuideRepository {
    async fn list_summaries(&self) -> Vec<IndexEntry> {
        match self.read_index().await {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backend = %self.driver.backend(),
                    "Failed to read guide index, returning empty list"
                );
                Vec::new()
            }
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Guide>> {
        let record = self.load_record(id).await?;
        if record.as_ref().is_some_and(|r| r.home_page.is_none()) {
            tracing::debug!(guide_id = id, "Guide has no home page, adding default");
        }
        Ok(record.map(with_default_home_page))
    }

    async fn create(&self, input: GuideInput) -> Result<Guide> {
        validate_guide_input(&input)?;

        let GuideInput {
            id,
            title,
            home_page,
            chapters,
        } = input;
        let id = id.unwrap_or_else(generate_id);

        if self.driver.get(&guide_key(&id)).await?.is_some() {
            tracing::warn!(guide_id = %id, "Attempted to create a guide with an existing ID");
            return Err(PersistenceError::Conflict { id });
        }

        let guide = Guide {
            id,
            title: title.unwrap_or_default(),
            home_page: home_page.unwrap_or_default(),
            chapters: chapters.unwrap_or_default(),
        };
        self.store_guide(&guide).await?;

        let mut index = self.read_index().await?;
        index.retain(|entry| entry.id != guide.id);
        index.push(guide.summary());
        self.write_index(&index).await?;

        tracing::info!(guide_id = %guide.id, title = %guide.title, "Guide created");
        Ok(guide)
    }

    async fn update(&self, id: &str, input: GuideInput) -> Result<Option<Guide>> {
        validate_guide_input(&input)?;

        let Some(existing) = self.load_record(id).await? else {
            tracing::debug!(guide_id = id, "Guide not found for update");
            return Ok(None);
        };

        let GuideInput {
            title,
            home_page,
            chapters,
            ..
        } = input;
        let guide = Guide {
            id: id.to_string(),
            title: title.unwrap_or_default(),
            home_page: home_page.or(existing.home_page).unwrap_or_default(),
            chapters: chapters.unwrap_or_default(),
        };
        self.store_guide(&guide).await?;

        if existing.title != guide.title {
            let mut index = self.read_index().await?;
            let mut found = false;
            for entry in index.iter_mut().filter(|entry| entry.id == id) {
                entry.title.clone_from(&guide.title);
                found = true;
            }
            if !found {
                tracing::warn!(guide_id = id, "Guide had no index entry, restoring it");
                index.push(guide.summary());
            }
            self.write_index(&index).await?;
        }

        tracing::info!(guide_id = id, title = %guide.title, "Guide updated");
        Ok(Some(guide))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        if !self.driver.delete(&guide_key(id)).await? {
            tracing::debug!(guide_id = id, "Guide not found for deletion");
            return Ok(false);
        }

        let mut index = self.read_index().await?;
        let before = index.len();
        index.retain(|entry| entry.id != id);
        if index.len() != before {
            self.write_index(&index).await?;
        }

        tracing::info!(guide_id = id, "Guide deleted");
        Ok(true)
    }

    async fn reconcile_index(&self) -> Result<ReconcileReport> {
        let mut titles = BTreeMap::new();
        for key in self.driver.list_keys(GUIDE_KEY_PREFIX).await? {
            let Some(id) = key.strip_prefix(GUIDE_KEY_PREFIX) else {
                continue;
            };
            match self.load_record(id).await {
                Ok(Some(record)) => {
                    titles.insert(record.id, record.title);
                }
                Ok(None) => {}
                Err(PersistenceError::Serialization(e)) => {
                    tracing::warn!(guide_id = id, error = %e, "Skipping undecodable guide record");
                }
                Err(e) => return Err(e),
            }
        }

        let (current, corrupt) = match self.read_index().await {
            Ok(index) => (index, false),
            Err(PersistenceError::Serialization(e)) => {
                tracing::warn!(error = %e, "Guide index is corrupt, rebuilding from records");
                (Vec::new(), true)
            }
            Err(e) => return Err(e),
        };

        let mut report = ReconcileReport::default();
        let mut rebuilt = Vec::with_capacity(titles.len());
        let mut seen = HashSet::new();

        for entry in &current {
            match titles.get(&entry.id) {
                Some(title) if seen.insert(entry.id.clone()) => {
                    if *title != entry.title {
                        report.retitled.push(entry.id.clone());
                    }
                    rebuilt.push(IndexEntry::new(entry.id.clone(), title.clone()));
                }
                _ => report.removed.push(entry.id.clone()),
            }
        }

        for (id, title) in &titles {
            if !seen.contains(id) {
                report.added.push(id.clone());
                rebuilt.push(IndexEntry::new(id.clone(), title.clone()));
            }
        }

        if corrupt || rebuilt != current {
            self.write_index(&rebuilt).await?;
        }

        tracing::info!(
            added = report.added.len(),
            removed = report.removed.len(),
            retitled = report.retitled.len(),
            "Guide index reconciled"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{FilesystemDriver, MemoryDriver};
    use fake::Fake;
    use fake::faker::lorem::en::{Paragraph, Sentence};
    use guide_domain::{Chapter, HomePage, Section};
    use serde_json::json;
    use std::sync::Arc;

    fn repo() -> (Arc<MemoryDriver>, KvGuideRepository) {
        let driver = Arc::new(MemoryDriver::new());
        let repo = KvGuideRepository::new(driver.clone());
        (driver, repo)
    }

    fn chapter(id: &str, title: &str, sections: Vec<Section>) -> Chapter {
        Chapter {
            id: id.to_string(),
            title: title.to_string(),
            sections,
        }
    }

    fn section(id: &str, title: &str, content: &str) -> Section {
        Section {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
        }
    }

    fn index_of(driver: &MemoryDriver) -> Vec<IndexEntry> {
        serde_json::from_value(driver.snapshot(INDEX_KEY).unwrap_or(json!([]))).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get_returns_same_structure() {
        let (_driver, repo) = repo();
        let chapters = vec![chapter("c1", "Ch1", vec![section("s1", "S1", "hello")])];

        let created = repo
            .create(GuideInput::new("Intro").with_chapters(chapters.clone()))
            .await
            .unwrap();

        assert!(!created.id.is_empty());
        assert_eq!(created.title, "Intro");
        assert_eq!(created.home_page, HomePage::welcome());
        assert_eq!(created.chapters, chapters);

        let fetched = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_defaults_missing_chapters() {
        let (_driver, repo) = repo();
        let created = repo.create(GuideInput::new("A")).await.unwrap();
        assert!(created.chapters.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (_driver, repo) = repo();
        assert_eq!(repo.get_by_id("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_backfills_home_page_without_writing() {
        let (driver, repo) = repo();
        driver.seed(
            "guide:legacy",
            json!({"_id": "legacy", "title": "Old", "chapters": [{"id": "c1", "title": "One"}]}),
        );

        let guide = repo.get_by_id("legacy").await.unwrap().unwrap();
        assert_eq!(guide.home_page, HomePage::welcome());
        assert!(guide.chapters[0].sections.is_empty());
        assert_eq!(driver.total_writes(), 0);

        let again = repo.get_by_id("legacy").await.unwrap().unwrap();
        assert_eq!(again, guide);
    }

    #[tokio::test]
    async fn test_list_tracks_create_and_delete() {
        let (_driver, repo) = repo();
        assert!(repo.list_summaries().await.is_empty());

        let guide = repo.create(GuideInput::new("A")).await.unwrap();
        assert_eq!(
            repo.list_summaries().await,
            vec![IndexEntry::new(guide.id.clone(), "A")]
        );

        assert!(repo.delete(&guide.id).await.unwrap());
        assert!(repo.list_summaries().await.is_empty());
        assert_eq!(repo.get_by_id(&guide.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order() {
        let (_driver, repo) = repo();
        for title in ["first", "second", "third"] {
            repo.create(GuideInput::new(title)).await.unwrap();
        }

        let titles: Vec<String> = repo
            .list_summaries()
            .await
            .into_iter()
            .map(|entry| entry.title)
            .collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_create_with_existing_id_conflicts() {
        let (driver, repo) = repo();
        let original = repo
            .create(GuideInput::new("Original").with_id("fixed"))
            .await
            .unwrap();
        let writes_before = driver.total_writes();

        let err = repo
            .create(GuideInput::new("Impostor").with_id("fixed"))
            .await
            .unwrap_err();

        assert!(matches!(err, PersistenceError::Conflict { ref id } if id == "fixed"));
        assert_eq!(driver.total_writes(), writes_before);
        assert_eq!(repo.get_by_id("fixed").await.unwrap(), Some(original));
        assert_eq!(index_of(&driver), vec![IndexEntry::new("fixed", "Original")]);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input_without_writing() {
        let (driver, repo) = repo();

        let err = repo.create(GuideInput::default()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Validation(_)));
        let err = repo.create(GuideInput::new("")).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Validation(_)));

        assert_eq!(driver.total_writes(), 0);
    }

    #[tokio::test]
    async fn test_create_replaces_stale_index_entry() {
        let (driver, repo) = repo();
        driver.seed(INDEX_KEY, json!([{"_id": "x", "title": "ghost"}]));

        repo.create(GuideInput::new("real").with_id("x")).await.unwrap();
        assert_eq!(index_of(&driver), vec![IndexEntry::new("x", "real")]);
    }

    #[tokio::test]
    async fn test_update_missing_is_none_and_writes_nothing() {
        let (driver, repo) = repo();
        let result = repo.update("ghost", GuideInput::new("B")).await.unwrap();
        assert_eq!(result, None);
        assert_eq!(driver.total_writes(), 0);
    }

    #[tokio::test]
    async fn test_update_validates_before_lookup() {
        let (_driver, repo) = repo();
        let err = repo.update("ghost", GuideInput::default()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_title_rewrites_only_matching_entry() {
        let (driver, repo) = repo();
        let a = repo.create(GuideInput::new("A")).await.unwrap();
        let b = repo.create(GuideInput::new("B")).await.unwrap();
        let c = repo.create(GuideInput::new("C")).await.unwrap();
        let index_writes = driver.writes_to(INDEX_KEY);

        let updated = repo
            .update(&b.id, GuideInput::new("B2").with_id("ignored"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.id, b.id);
        assert_eq!(driver.writes_to(INDEX_KEY), index_writes + 1);
        assert_eq!(
            index_of(&driver),
            vec![
                IndexEntry::new(a.id, "A"),
                IndexEntry::new(b.id.clone(), "B2"),
                IndexEntry::new(c.id, "C"),
            ]
        );
        assert_eq!(driver.snapshot("guide:ignored"), None);
    }

    #[tokio::test]
    async fn test_update_same_title_skips_index() {
        let (driver, repo) = repo();
        let guide = repo.create(GuideInput::new("Same")).await.unwrap();
        let index_writes = driver.writes_to(INDEX_KEY);

        let chapters = vec![chapter("c9", "New", vec![])];
        let updated = repo
            .update(&guide.id, GuideInput::new("Same").with_chapters(chapters.clone()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.chapters, chapters);
        assert_eq!(driver.writes_to(INDEX_KEY), index_writes);
        assert_eq!(driver.writes_to(&guide_key(&guide.id)), 2);
    }

    #[tokio::test]
    async fn test_update_resolves_home_page() {
        let (driver, repo) = repo();
        let custom = HomePage::new("Custom", "Body");
        let guide = repo
            .create(GuideInput::new("T").with_home_page(custom.clone()))
            .await
            .unwrap();

        let kept = repo.update(&guide.id, GuideInput::new("T")).await.unwrap().unwrap();
        assert_eq!(kept.home_page, custom);

        let replacement = HomePage::new("Other", "");
        let replaced = repo
            .update(&guide.id, GuideInput::new("T").with_home_page(replacement.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replaced.home_page, replacement);

        driver.seed("guide:bare", json!({"_id": "bare", "title": "Bare"}));
        let defaulted = repo.update("bare", GuideInput::new("Bare")).await.unwrap().unwrap();
        assert_eq!(defaulted.home_page, HomePage::welcome());
        assert_eq!(
            driver.snapshot("guide:bare").unwrap()["homePage"],
            serde_json::to_value(HomePage::welcome()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_update_restores_missing_index_entry() {
        let (driver, repo) = repo();
        driver.seed("guide:orphan", json!({"_id": "orphan", "title": "Old"}));

        repo.update("orphan", GuideInput::new("New")).await.unwrap().unwrap();
        assert_eq!(index_of(&driver), vec![IndexEntry::new("orphan", "New")]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_false_and_writes_nothing() {
        let (driver, repo) = repo();
        repo.create(GuideInput::new("keep")).await.unwrap();
        let writes = driver.total_writes();

        assert!(!repo.delete("ghost").await.unwrap());
        assert_eq!(driver.total_writes(), writes);
        assert_eq!(repo.list_summaries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_index_failure_on_create_leaves_orphan_not_dangling_entry() {
        let (driver, repo) = repo();
        driver.fail_writes_to(INDEX_KEY);

        let err = repo
            .create(GuideInput::new("Half").with_id("half"))
            .await
            .unwrap_err();
        assert!(err.is_storage());

        // record present, index untouched
        assert!(repo.get_by_id("half").await.unwrap().is_some());
        assert!(repo.list_summaries().await.is_empty());

        driver.clear_failures();
        let report = repo.reconcile_index().await.unwrap();
        assert_eq!(report.added, vec!["half".to_string()]);
        assert_eq!(repo.list_summaries().await, vec![IndexEntry::new("half", "Half")]);
    }

    #[tokio::test]
    async fn test_record_failure_on_create_touches_nothing() {
        let (driver, repo) = repo();
        driver.fail_writes_to("guide:g");

        assert!(repo.create(GuideInput::new("G").with_id("g")).await.is_err());
        assert_eq!(driver.snapshot(INDEX_KEY), None);
        assert_eq!(repo.get_by_id("g").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_swallows_corrupt_index() {
        let (driver, repo) = repo();
        driver.seed(INDEX_KEY, json!({"not": "a list"}));
        assert!(repo.list_summaries().await.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_repairs_drift() {
        let (driver, repo) = repo();
        driver.seed("guide:a", json!({"_id": "a", "title": "A"}));
        driver.seed("guide:b", json!({"_id": "b", "title": "B-new"}));
        driver.seed("guide:c", json!({"_id": "c", "title": "C"}));
        driver.seed(
            INDEX_KEY,
            json!([
                {"_id": "b", "title": "B-old"},
                {"_id": "gone", "title": "Gone"},
                {"_id": "a", "title": "A"},
                {"_id": "a", "title": "A"}
            ]),
        );

        let report = repo.reconcile_index().await.unwrap();
        assert_eq!(report.added, vec!["c".to_string()]);
        assert_eq!(report.removed, vec!["gone".to_string(), "a".to_string()]);
        assert_eq!(report.retitled, vec!["b".to_string()]);
        assert_eq!(
            index_of(&driver),
            vec![
                IndexEntry::new("b", "B-new"),
                IndexEntry::new("a", "A"),
                IndexEntry::new("c", "C"),
            ]
        );

        let writes = driver.writes_to(INDEX_KEY);
        let second = repo.reconcile_index().await.unwrap();
        assert!(second.is_clean());
        assert_eq!(driver.writes_to(INDEX_KEY), writes);
    }

    #[tokio::test]
    async fn test_reconcile_rebuilds_corrupt_index() {
        let (driver, repo) = repo();
        driver.seed("guide:a", json!({"_id": "a", "title": "A"}));
        driver.seed(INDEX_KEY, json!("garbage"));

        let report = repo.reconcile_index().await.unwrap();
        assert_eq!(report.added, vec!["a".to_string()]);
        assert_eq!(index_of(&driver), vec![IndexEntry::new("a", "A")]);
    }

    #[tokio::test]
    async fn test_get_reads_legacy_records_with_null_fields() {
        let (driver, repo) = repo();
        driver.seed(
            "guide:a",
            json!({"_id": "a", "title": "A", "chapters": [{"id": "c1", "title": "One", "sections": null}]}),
        );
        driver.seed("guide:b", json!({"_id": "b", "title": null, "chapters": []}));
        driver.seed("guide:c", json!({"_id": "c", "title": "C", "homePage": {}}));

        let a = repo.get_by_id("a").await.unwrap().unwrap();
        assert!(a.chapters[0].sections.is_empty());

        let b = repo.get_by_id("b").await.unwrap().unwrap();
        assert_eq!(b.title, "");

        let c = repo.get_by_id("c").await.unwrap().unwrap();
        assert_eq!(c.home_page, HomePage::welcome());
        assert_eq!(driver.total_writes(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_skips_undecodable_record() {
        let (driver, repo) = repo();
        driver.seed("guide:a", json!({"_id": "a", "title": "A"}));
        driver.seed("guide:broken", json!({"_id": "broken", "chapters": 5}));
        driver.seed("guide:c", json!({"_id": "c", "title": "C"}));

        let report = repo.reconcile_index().await.unwrap();
        assert_eq!(report.added, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(
            index_of(&driver),
            vec![IndexEntry::new("a", "A"), IndexEntry::new("c", "C")]
        );
    }

    #[tokio::test]
    async fn test_filesystem_round_trip_preserves_nested_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let repo = KvGuideRepository::new(Arc::new(FilesystemDriver::new(dir.path())));

        let chapters: Vec<Chapter> = (0..3)
            .map(|c| {
                let sections = (0..4)
                    .map(|s| {
                        let content: String = Paragraph(1..3).fake();
                        section(&format!("sec_{c}_{s}"), &Sentence(1..4).fake::<String>(), &content)
                    })
                    .collect();
                chapter(&format!("chap_{c}"), &Sentence(1..3).fake::<String>(), sections)
            })
            .chain(std::iter::once(chapter(
                "chap_unicode",
                "פרק ראשון 📘",
                vec![section("s-ü", "Ünïcödé ✓", "שלום עולם\n\tline two - 日本語")],
            )))
            .collect();

        let created = repo
            .create(
                GuideInput::new("מדריך")
                    .with_home_page(HomePage::new("בית", "תוכן"))
                    .with_chapters(chapters.clone()),
            )
            .await
            .unwrap();

        let fetched = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.chapters, chapters);
        assert_eq!(fetched, created);

        let on_disk = dir.path().join("guides").join(format!("{}.json", created.id));
        assert!(on_disk.is_file());
        let index: Value =
            serde_json::from_slice(&std::fs::read(dir.path().join("index.json")).unwrap()).unwrap();
        assert_eq!(index, json!([{"_id": created.id, "title": "מדריך"}]));
    }
}
