//! In-memory ledger store
//!
//! Used by tests, benches and `--ledger memory`. Nothing survives a restart.

use crate::domain::ports::KeyValueStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

/// Key/value store held in process memory
pub struct MemoryStore {
    stores: RwLock<HashMap<String, BTreeMap<String, String>>>,
    /// Is backend available
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Set availability (for testing)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Check if available
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Number of stores currently held
    pub fn store_count(&self) -> usize {
        self.stores.read().len()
    }

    fn check_available(&self, store: &str) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(Error::LedgerUnavailable {
                store: store.to_string(),
                reason: "memory store marked unavailable".into(),
            })
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_value(&self, store: &str, key: &str) -> Result<Option<String>> {
        self.check_available(store)?;
        let stores = self.stores.read();
        Ok(stores.get(store).and_then(|s| s.get(key).cloned()))
    }

    async fn set_value(&self, store: &str, key: &str, value: &str) -> Result<()> {
        self.check_available(store)?;
        let mut stores = self.stores.write();
        stores
            .entry(store.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear_store(&self, store: &str) -> Result<()> {
        self.check_available(store)?;
        self.stores.write().remove(store);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let store = MemoryStore::new();

        store.set_value("s1", "k", "v1").await.unwrap();
        store.set_value("s1", "k", "v2").await.unwrap();
        store.set_value("s2", "k", "other").await.unwrap();

        assert_eq!(store.get_value("s1", "k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.get_value("s1", "missing").await.unwrap(), None);
        assert_eq!(store.store_count(), 2);

        store.clear_store("s1").await.unwrap();
        assert_eq!(store.get_value("s1", "k").await.unwrap(), None);
        assert_eq!(store.store_count(), 1);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_available(false);

        let result = store.get_value("s1", "k").await;
        assert!(matches!(result, Err(Error::LedgerUnavailable { .. })));
        assert!(store.set_value("s1", "k", "v").await.is_err());
    }
}
