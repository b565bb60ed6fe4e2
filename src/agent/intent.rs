//! Intent Sources
//!
//! Where the agent reads its StorageCluster from: the Kubernetes API, a YAML
//! manifest on disk (standalone mode), or a fixed value in tests.

use crate::crd::{NodePlacementStatus, StorageCluster};
use crate::domain::ports::IntentSource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

// =============================================================================
// Kubernetes
// =============================================================================

/// Reads a namespaced StorageCluster and patches per-node status
pub struct KubeIntentSource {
    api: Api<StorageCluster>,
    namespace: String,
    name: String,
}

impl KubeIntentSource {
    pub fn new(client: Client, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            namespace,
            name: name.into(),
        }
    }
}

#[async_trait]
impl IntentSource for KubeIntentSource {
    async fn load(&self) -> Result<StorageCluster> {
        self.api
            .get_opt(&self.name)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "StorageCluster".to_string(),
                name: format!("{}/{}", self.namespace, self.name),
            })
    }

    async fn report(&self, node: &str, status: &NodePlacementStatus) -> Result<()> {
        // merge patch only touches this node's key
        let patch = serde_json::json!({ "status": { "nodes": { node: status } } });
        self.api
            .patch_status(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!(cluster = %self.name, node, phase = %status.phase, "patched node status");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("storagecluster {}/{}", self.namespace, self.name)
    }
}

// =============================================================================
// YAML File
// =============================================================================

/// Reads a StorageCluster manifest from disk on every pass
pub struct FileIntentSource {
    path: PathBuf,
    statuses: Mutex<BTreeMap<String, NodePlacementStatus>>,
}

impl FileIntentSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            statuses: Mutex::new(BTreeMap::new()),
        }
    }

    /// Last status reported for a node
    pub fn status(&self, node: &str) -> Option<NodePlacementStatus> {
        self.statuses.lock().get(node).cloned()
    }
}

#[async_trait]
impl IntentSource for FileIntentSource {
    async fn load(&self) -> Result<StorageCluster> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        StorageCluster::from_yaml(&raw)
    }

    async fn report(&self, node: &str, status: &NodePlacementStatus) -> Result<()> {
        self.statuses.lock().insert(node.to_string(), status.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

// =============================================================================
// Static
// =============================================================================

/// Fixed StorageCluster, swappable at runtime
pub struct StaticIntentSource {
    cluster: Mutex<Option<StorageCluster>>,
    statuses: Mutex<BTreeMap<String, NodePlacementStatus>>,
}

impl StaticIntentSource {
    pub fn new(cluster: StorageCluster) -> Self {
        Self {
            cluster: Mutex::new(Some(cluster)),
            statuses: Mutex::new(BTreeMap::new()),
        }
    }

    /// Source whose cluster has not been created yet
    pub fn empty() -> Self {
        Self {
            cluster: Mutex::new(None),
            statuses: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn set(&self, cluster: StorageCluster) {
        *self.cluster.lock() = Some(cluster);
    }

    pub fn status(&self, node: &str) -> Option<NodePlacementStatus> {
        self.statuses.lock().get(node).cloned()
    }
}

#[async_trait]
impl IntentSource for StaticIntentSource {
    async fn load(&self) -> Result<StorageCluster> {
        self.cluster
            .lock()
            .clone()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "StorageCluster".to_string(),
                name: "static".to_string(),
            })
    }

    async fn report(&self, node: &str, status: &NodePlacementStatus) -> Result<()> {
        self.statuses.lock().insert(node.to_string(), status.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "static storagecluster".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::PlacementPhase;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
apiVersion: storage.billyronks.io/v1
kind: StorageCluster
metadata:
  name: local
spec:
  storage:
    useAllNodes: true
    deviceFilter: sdb
"#;

    #[tokio::test]
    async fn test_file_source_reads_manifest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cluster.yaml");
        tokio::fs::write(&path, MANIFEST).await.unwrap();

        let source = FileIntentSource::new(&path);
        let cluster = source.load().await.unwrap();
        assert_eq!(cluster.name(), "local");
        assert_eq!(
            cluster.spec.node_intent("any").unwrap().device_filter,
            "sdb"
        );
        assert!(source.describe().contains("cluster.yaml"));
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let source = FileIntentSource::new("/nonexistent/cluster.yaml");
        assert_matches!(source.load().await, Err(Error::Io(_)));
    }

    #[tokio::test]
    async fn test_static_source_reports() {
        let source = StaticIntentSource::empty();
        assert_matches!(source.load().await, Err(Error::ResourceNotFound { .. }));

        source.set(StorageCluster::from_yaml(MANIFEST).unwrap());
        assert!(source.load().await.is_ok());

        let status = NodePlacementStatus {
            phase: PlacementPhase::Planned,
            devices: 1,
            ..Default::default()
        };
        source.report("node1", &status).await.unwrap();
        assert_eq!(source.status("node1"), Some(status));
        assert!(source.status("node2").is_none());
    }
}
