//! Identity Ledger
//!
//! Typed access to the per-node record of location → identity assignments
//! and partition layouts. The ledger is read during planning and written only
//! by the caller's explicit commit step.

mod configmap;
mod file;
mod memory;

pub use configmap::ConfigMapStore;
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::domain::model::{PartitionScheme, PersistedDirMap};
use crate::domain::ports::KeyValueStoreRef;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

/// Key holding the persisted directory map
pub const DIR_MAP_KEY: &str = "osd-dirs";

/// Key holding the persisted partition scheme
pub const PARTITION_SCHEME_KEY: &str = "osd-partition-scheme";

/// Name of the store owned by a node
pub fn store_name(node_id: &str) -> String {
    format!("rook-ceph-osd-{}-config", node_id)
}

// =============================================================================
// Identity Ledger
// =============================================================================

/// Typed facade over a node-scoped key/value store
#[derive(Clone)]
pub struct IdentityLedger {
    store: KeyValueStoreRef,
}

impl IdentityLedger {
    pub fn new(store: KeyValueStoreRef) -> Self {
        Self { store }
    }

    /// Ledger over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }

    /// Load the persisted directory map (absent = empty)
    pub async fn load_dir_map(&self, node_id: &str) -> Result<PersistedDirMap> {
        self.load(node_id, DIR_MAP_KEY).await
    }

    /// Persist the directory map of a node
    pub async fn save_dir_map(&self, node_id: &str, dirs: &PersistedDirMap) -> Result<()> {
        self.save(node_id, DIR_MAP_KEY, dirs).await
    }

    /// Load the persisted partition scheme (absent = empty)
    pub async fn load_partition_scheme(&self, node_id: &str) -> Result<PartitionScheme> {
        self.load(node_id, PARTITION_SCHEME_KEY).await
    }

    /// Persist the partition scheme of a node
    pub async fn save_partition_scheme(
        &self,
        node_id: &str,
        scheme: &PartitionScheme,
    ) -> Result<()> {
        self.save(node_id, PARTITION_SCHEME_KEY, scheme).await
    }

    /// Remove everything recorded for a node
    pub async fn clear(&self, node_id: &str) -> Result<()> {
        let store = store_name(node_id);
        debug!(store = %store, backend = self.backend_name(), "clearing ledger store");
        self.store.clear_store(&store).await
    }

    async fn load<T>(&self, node_id: &str, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let store = store_name(node_id);
        match self.store.get_value(&store, key).await? {
            None => Ok(T::default()),
            Some(raw) if raw.trim().is_empty() => Ok(T::default()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| Error::LedgerCorrupt {
                store,
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn save<T: Serialize>(&self, node_id: &str, key: &str, value: &T) -> Result<()> {
        let store = store_name(node_id);
        let raw = serde_json::to_string(value)?;
        debug!(store = %store, key, backend = self.backend_name(), "saving ledger value");
        self.store.set_value(&store, key, &raw).await
    }
}

impl std::fmt::Debug for IdentityLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityLedger")
            .field("backend", &self.backend_name())
            .finish()
    }
}
