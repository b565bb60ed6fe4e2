//! Domain Ports - Trait definitions for the agent's external collaborators
//!
//! These traits define the boundaries between the placement logic and the
//! node it runs on. Adapters implement these traits to provide concrete
//! functionality; tests substitute scripted implementations.

use crate::crd::{NodePlacementStatus, StorageCluster};
use crate::domain::model::LocalDisk;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

// =============================================================================
// Key/Value Store Port
// =============================================================================

/// Node-scoped persistent key/value store backing the identity ledger
///
/// A store is a named bag of string keys; each node owns exactly one store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value; `None` when the store or key does not exist
    async fn get_value(&self, store: &str, key: &str) -> Result<Option<String>>;

    /// Set a value, creating the store if needed
    async fn set_value(&self, store: &str, key: &str, value: &str) -> Result<()>;

    /// Remove a whole store
    async fn clear_store(&self, store: &str) -> Result<()>;

    /// Get backend name
    fn backend_name(&self) -> &str;
}

// =============================================================================
// Command Executor Port
// =============================================================================

/// Port for running external commands on the node
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command args...` and return its standard output.
    ///
    /// `action_name` is a human readable label used in logs and errors.
    async fn run(
        &self,
        debug: bool,
        action_name: &str,
        command: &str,
        args: &[&str],
    ) -> Result<String>;
}

// =============================================================================
// Block Device Source Port
// =============================================================================

/// Port for enumerating the whole block devices of the local node
#[async_trait]
pub trait BlockDeviceSource: Send + Sync {
    async fn list_disks(&self) -> Result<Vec<LocalDisk>>;
}

// =============================================================================
// Intent Source Port
// =============================================================================

/// Port for reading the cluster's storage intent and reporting back
#[async_trait]
pub trait IntentSource: Send + Sync {
    /// Fetch the current StorageCluster
    async fn load(&self) -> Result<StorageCluster>;

    /// Record the outcome of a pass for one node
    async fn report(&self, node: &str, status: &NodePlacementStatus) -> Result<()>;

    /// Where the intent comes from, for logs
    fn describe(&self) -> String;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type KeyValueStoreRef = Arc<dyn KeyValueStore>;
pub type CommandExecutorRef = Arc<dyn CommandExecutor>;
pub type BlockDeviceSourceRef = Arc<dyn BlockDeviceSource>;
pub type IntentSourceRef = Arc<dyn IntentSource>;
