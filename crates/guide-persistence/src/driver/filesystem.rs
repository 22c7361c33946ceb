//! Local filesystem driver.
//!
//! Layout under the data directory:
//!
//! ```text
//! data/
//! ├── index.json          guides_index
//! └── guides/
//!     └── <id>.json       guide:<id>
//! ```
//!
//! Every write goes to a temporary sibling first and is renamed over the
//! target, so readers never observe a half-written file.

use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

use super::{BackendKind, GUIDE_KEY_PREFIX, INDEX_KEY, KvDriver};
use crate::error::{PersistenceError, Result};

const INDEX_FILE: &str = "index.json";
const GUIDES_DIR: &str = "guides";
const RECORD_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Driver storing one pretty-printed JSON file per key
pub struct FilesystemDriver {
    root: PathBuf,
    layout: OnceCell<()>,
}

impl FilesystemDriver {
    /// Create a driver rooted at `root`. Nothing is touched on disk until the
    /// first operation.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            layout: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn guides_dir(&self) -> PathBuf {
        self.root.join(GUIDES_DIR)
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key == INDEX_KEY {
            return Ok(self.index_path());
        }

        match key.strip_prefix(GUIDE_KEY_PREFIX) {
            Some(id) if is_safe_file_stem(id) => {
                Ok(self.guides_dir().join(format!("{id}.{RECORD_EXT}")))
            }
            _ => Err(PersistenceError::InvalidKey(key.to_string())),
        }
    }

    /// Create the guides directory and an empty index, once per driver
    async fn ensure_layout(&self) -> Result<()> {
        self.layout
            .get_or_try_init(|| async {
                fs::create_dir_all(self.guides_dir()).await?;

                let index = self.index_path();
                if !fs::try_exists(&index).await? {
                    tracing::info!(path = %index.display(), "Initializing empty guide index");
                    write_atomic(&index, b"[]").await?;
                }
                Ok::<(), PersistenceError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl KvDriver for FilesystemDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Filesystem
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        self.ensure_layout().await?;

        match fs::read(&path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    PersistenceError::Serialization(format!("{}: {e}", path.display()))
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        self.ensure_layout().await?;

        let contents = serde_json::to_vec_pretty(value)?;
        write_atomic(&path, &contents).await?;
        tracing::debug!(key, path = %path.display(), bytes = contents.len(), "Wrote file");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        self.ensure_layout().await?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.ensure_layout().await?;

        let mut keys = Vec::new();
        if fs::try_exists(self.index_path()).await? {
            keys.push(INDEX_KEY.to_string());
        }

        let mut entries = fs::read_dir(self.guides_dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(format!("{GUIDE_KEY_PREFIX}{stem}"));
            }
        }

        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

/// Ids become file names, so they must stay inside the guides directory
fn is_safe_file_stem(id: &str) -> bool {
    !id.is_empty()
        && !id.contains("..")
        && !id.chars().any(|c| matches!(c, '/' | '\\' | '\0'))
}

/// Write `contents` to a temporary sibling of `target`, then rename it over
/// `target`.
async fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let temp = temp_sibling(target);

    let written = async {
        let mut file = fs::File::create(&temp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        fs::rename(&temp, target).await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}

fn temp_sibling(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!("{name}.{}-{seq}.{TEMP_EXT}", std::process::id()))
}
