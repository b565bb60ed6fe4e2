//! File-backed ledger store
//!
//! Standalone mode keeps each store as one JSON object under a root
//! directory: `<root>/<store>.json`. Writes go through a temp file and a
//! rename so a crash never leaves a half-written store behind.

use crate::domain::ports::KeyValueStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Key/value store persisted as JSON files
pub struct FileStore {
    root_path: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store root
    pub async fn with_path(root_path: impl AsRef<Path>) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        fs::create_dir_all(&root_path).await?;
        Ok(Self { root_path })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn store_path(&self, store: &str) -> PathBuf {
        self.root_path.join(format!("{}.json", store))
    }

    async fn read_store(&self, store: &str) -> Result<BTreeMap<String, String>> {
        let path = self.store_path(store);
        match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| Error::LedgerCorrupt {
                store: store.to_string(),
                key: "*".into(),
                reason: format!("{}: {}", path.display(), e),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(Error::LedgerUnavailable {
                store: store.to_string(),
                reason: format!("failed to read {}: {}", path.display(), e),
            }),
        }
    }

    async fn write_store(&self, store: &str, values: &BTreeMap<String, String>) -> Result<()> {
        let path = self.store_path(store);
        let tmp_path = self.root_path.join(format!(".{}.json.tmp", store));
        let raw = serde_json::to_vec_pretty(values)?;

        fs::write(&tmp_path, raw).await.map_err(|e| Error::LedgerUnavailable {
            store: store.to_string(),
            reason: format!("failed to write {}: {}", tmp_path.display(), e),
        })?;
        fs::rename(&tmp_path, &path).await.map_err(|e| Error::LedgerUnavailable {
            store: store.to_string(),
            reason: format!("failed to replace {}: {}", path.display(), e),
        })?;

        debug!(path = %path.display(), keys = values.len(), "wrote ledger file");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_value(&self, store: &str, key: &str) -> Result<Option<String>> {
        Ok(self.read_store(store).await?.remove(key))
    }

    async fn set_value(&self, store: &str, key: &str, value: &str) -> Result<()> {
        let mut values = self.read_store(store).await?;
        values.insert(key.to_string(), value.to_string());
        self.write_store(store, &values).await
    }

    async fn clear_store(&self, store: &str) -> Result<()> {
        let path = self.store_path(store);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::LedgerUnavailable {
                store: store.to_string(),
                reason: format!("failed to remove {}: {}", path.display(), e),
            }),
        }
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (FileStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::with_path(tmp.path().join("ledger")).await.unwrap();
        (store, tmp)
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let (store, tmp) = test_store().await;
        store.set_value("node1", "osd-dirs", r#"{"/a":1}"#).await.unwrap();
        store.set_value("node1", "other", "x").await.unwrap();

        let reopened = FileStore::with_path(tmp.path().join("ledger")).await.unwrap();
        assert_eq!(
            reopened.get_value("node1", "osd-dirs").await.unwrap().as_deref(),
            Some(r#"{"/a":1}"#)
        );
        assert_eq!(reopened.get_value("node1", "other").await.unwrap().as_deref(), Some("x"));
        assert_eq!(reopened.get_value("node2", "osd-dirs").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_store() {
        let (store, _tmp) = test_store().await;
        store.set_value("node1", "k", "v").await.unwrap();
        store.clear_store("node1").await.unwrap();
        assert_eq!(store.get_value("node1", "k").await.unwrap(), None);

        // clearing a missing store is not an error
        store.clear_store("node1").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let (store, _tmp) = test_store().await;
        fs::write(store.root_path().join("node1.json"), b"not json")
            .await
            .unwrap();

        let result = store.get_value("node1", "k").await;
        assert!(matches!(result, Err(Error::LedgerCorrupt { .. })));
    }
}
