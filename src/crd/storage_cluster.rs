//! StorageCluster CRD
//!
//! Declares which nodes, devices and directories of a cluster are given to
//! storage daemons. Selection can be set cluster-wide and refined per node.

use crate::error::{Error, Result};
use crate::placement::config::merge_config;
use crate::placement::devices::{DeviceFilter, FILTER_ALL};
use crate::placement::pass::NodeIntent;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// StorageCluster CRD
// =============================================================================

/// StorageCluster describes the storage a cluster's daemons may consume
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "storage.billyronks.io",
    version = "v1",
    kind = "StorageCluster",
    plural = "storageclusters",
    shortname = "stc",
    status = "StorageClusterStatus",
    printcolumn = r#"{"name": "DataDir", "type": "string", "jsonPath": ".spec.dataDirHostPath"}"#,
    printcolumn = r#"{"name": "AllNodes", "type": "boolean", "jsonPath": ".spec.storage.useAllNodes"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterSpec {
    /// Host directory used when a node selects neither devices nor directories
    #[serde(default = "default_data_dir_host_path")]
    pub data_dir_host_path: String,

    /// Device shared by all daemons for metadata/WAL/journal
    #[serde(default)]
    pub metadata_device: Option<String>,

    /// Node and device selection
    #[serde(default)]
    pub storage: StorageScopeSpec,
}

// =============================================================================
// Sub-Types
// =============================================================================

/// Which nodes and devices are in scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageScopeSpec {
    /// Nodes with explicit settings
    #[serde(default)]
    pub nodes: Vec<StorageNodeSpec>,

    /// Run on every node, not only the listed ones
    #[serde(default)]
    pub use_all_nodes: bool,

    #[serde(default)]
    pub location: Option<String>,

    /// Cluster-wide store config (storeType, walSizeMB, ...)
    #[serde(default)]
    pub config: BTreeMap<String, String>,

    #[serde(flatten)]
    pub selection: Selection,
}

/// Per-node settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageNodeSpec {
    pub name: String,

    #[serde(default)]
    pub location: Option<String>,

    /// Devices to use by name; takes precedence over any filter
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,

    #[serde(default)]
    pub config: BTreeMap<String, String>,

    #[serde(default)]
    pub metadata_device: Option<String>,

    #[serde(flatten)]
    pub selection: Selection,
}

/// A device listed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSpec {
    pub name: String,

    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// A data directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySpec {
    pub path: String,

    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Device and directory selection, shared by cluster and node scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    /// Consume every device found on the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_all_devices: Option<bool>,

    /// Regular expression matched against device names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_filter: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<DirectorySpec>,
}

impl Selection {
    /// Filter string expressed by this selection, if it expresses one
    fn device_filter(&self) -> Option<String> {
        if self.use_all_devices == Some(true) {
            return Some(FILTER_ALL.to_string());
        }
        self.device_filter.clone().filter(|f| !f.is_empty())
    }

    fn directory_list(&self) -> Option<String> {
        if self.directories.is_empty() {
            return None;
        }
        let paths: Vec<&str> = self.directories.iter().map(|d| d.path.as_str()).collect();
        Some(paths.join(","))
    }
}

// =============================================================================
// Status
// =============================================================================

/// Placement phase of one node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum PlacementPhase {
    #[default]
    Pending,
    Planned,
    Failed,
}

impl std::fmt::Display for PlacementPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlacementPhase::Pending => write!(f, "Pending"),
            PlacementPhase::Planned => write!(f, "Planned"),
            PlacementPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Status of a StorageCluster, reported per node by the node agents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageClusterStatus {
    #[serde(default)]
    pub nodes: BTreeMap<String, NodePlacementStatus>,
}

/// Last pass outcome on one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodePlacementStatus {
    pub phase: PlacementPhase,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub last_pass_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub devices: u32,

    #[serde(default)]
    pub directories: u32,

    #[serde(default)]
    pub pending_removals: u32,
}

fn default_data_dir_host_path() -> String {
    "/var/lib/rook".to_string()
}

impl Default for StorageClusterSpec {
    fn default() -> Self {
        Self {
            data_dir_host_path: default_data_dir_host_path(),
            metadata_device: None,
            storage: StorageScopeSpec::default(),
        }
    }
}

// =============================================================================
// Implementations
// =============================================================================

impl StorageCluster {
    /// Get the name of this cluster
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("unknown")
    }

    /// Parse a StorageCluster manifest
    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }
}

impl StorageClusterSpec {
    /// Find the explicit settings of a node
    pub fn node(&self, name: &str) -> Option<&StorageNodeSpec> {
        self.storage.nodes.iter().find(|n| n.name == name)
    }

    /// Resolve what this cluster asks of one node.
    ///
    /// `None` when the node is neither listed nor covered by `useAllNodes`.
    pub fn node_intent(&self, node_name: &str) -> Option<NodeIntent> {
        let cluster = &self.storage;
        let node = self.node(node_name);
        if node.is_none() && !cluster.use_all_nodes {
            return None;
        }

        let device_filter = node
            .and_then(|n| {
                if n.devices.is_empty() {
                    n.selection.device_filter()
                } else {
                    let names: Vec<&str> = n.devices.iter().map(|d| d.name.as_str()).collect();
                    Some(DeviceFilter::names_pattern(&names))
                }
            })
            .or_else(|| cluster.selection.device_filter())
            .unwrap_or_default();

        let directories = node
            .and_then(|n| n.selection.directory_list())
            .or_else(|| cluster.selection.directory_list())
            .unwrap_or_default();

        let config = match node {
            Some(n) => merge_config(&cluster.config, &n.config),
            None => cluster.config.clone(),
        };

        let metadata_device = node
            .and_then(|n| n.metadata_device.clone())
            .or_else(|| self.metadata_device.clone())
            .unwrap_or_default();

        let device_config = node
            .map(|n| {
                n.devices
                    .iter()
                    .filter(|d| !d.config.is_empty())
                    .map(|d| (d.name.clone(), d.config.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Some(NodeIntent {
            node_id: node_name.to_string(),
            default_dir: self.data_dir_host_path.clone(),
            directories,
            device_filter,
            metadata_device,
            config,
            device_config,
        })
    }

    /// Like [`node_intent`](Self::node_intent), failing when out of scope
    pub fn require_node_intent(&self, node_name: &str) -> Result<NodeIntent> {
        self.node_intent(node_name).ok_or_else(|| Error::NodeNotInScope {
            node: node_name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use kube::CustomResourceExt;

    const MANIFEST: &str = r#"
apiVersion: storage.billyronks.io/v1
kind: StorageCluster
metadata:
  name: rook-ceph
  namespace: rook-ceph
spec:
  dataDirHostPath: /var/lib/rook
  metadataDevice: nvme01
  storage:
    useAllNodes: true
    useAllDevices: false
    deviceFilter: "^sd."
    config:
      storeType: bluestore
      walSizeMB: "512"
    directories:
      - path: /rook/dir1
    nodes:
      - name: node1
        config:
          storeType: filestore
        devices:
          - name: sda
          - name: sdb
            config:
              journalSizeMB: "2048"
      - name: node2
        useAllDevices: true
        metadataDevice: nvme02
        directories:
          - path: /rook/dir2
          - path: /rook/dir3
"#;

    fn cluster() -> StorageCluster {
        StorageCluster::from_yaml(MANIFEST).unwrap()
    }

    #[test]
    fn test_parse_manifest() {
        let cluster = cluster();
        assert_eq!(cluster.name(), "rook-ceph");
        assert!(cluster.spec.storage.use_all_nodes);
        assert_eq!(cluster.spec.storage.selection.use_all_devices, Some(false));
        assert_eq!(cluster.spec.storage.nodes.len(), 2);
        assert_eq!(cluster.spec.storage.nodes[1].selection.directories.len(), 2);
    }

    #[test]
    fn test_listed_devices_become_exact_filter() {
        let intent = cluster().spec.node_intent("node1").unwrap();
        assert_eq!(intent.device_filter, "^(?:sda|sdb)$");
        // cluster directories apply when the node names none
        assert_eq!(intent.directories, "/rook/dir1");
        assert_eq!(intent.metadata_device, "nvme01");
        assert_eq!(intent.config.get("storeType").map(String::as_str), Some("filestore"));
        assert_eq!(intent.config.get("walSizeMB").map(String::as_str), Some("512"));
        assert_eq!(intent.device_store_config("sdb").journal_size_mb, 2048);
        assert!(intent.devices_selected());
    }

    #[test]
    fn test_node_selection_overrides_cluster() {
        let intent = cluster().spec.node_intent("node2").unwrap();
        assert_eq!(intent.device_filter, FILTER_ALL);
        assert_eq!(intent.directories, "/rook/dir2,/rook/dir3");
        assert_eq!(intent.metadata_device, "nvme02");
    }

    #[test]
    fn test_unlisted_node_uses_cluster_selection() {
        let intent = cluster().spec.node_intent("node9").unwrap();
        assert_eq!(intent.device_filter, "^sd.");
        assert_eq!(intent.default_dir, "/var/lib/rook");
        assert_eq!(intent.store_config().wal_size_mb, 512);
    }

    #[test]
    fn test_node_out_of_scope() {
        let mut cluster = cluster();
        cluster.spec.storage.use_all_nodes = false;
        assert!(cluster.spec.node_intent("node9").is_none());
        assert_matches!(
            cluster.spec.require_node_intent("node9"),
            Err(Error::NodeNotInScope { node }) if node == "node9"
        );
        assert!(cluster.spec.node_intent("node1").is_some());
    }

    #[test]
    fn test_empty_selection_falls_back_to_default_dir() {
        let spec = StorageClusterSpec {
            storage: StorageScopeSpec {
                use_all_nodes: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let intent = spec.node_intent("node1").unwrap();
        assert_eq!(intent.device_filter, "");
        assert_eq!(intent.directories, "");
        assert!(!intent.devices_selected());
    }

    #[test]
    fn test_crd_generation() {
        let crd = StorageCluster::crd();
        assert_eq!(crd.spec.group, "storage.billyronks.io");
        assert_eq!(crd.spec.names.kind, "StorageCluster");
        assert_eq!(crd.spec.scope, "Namespaced");
    }

    #[test]
    fn test_bad_manifest() {
        assert_matches!(
            StorageCluster::from_yaml("spec: [unclosed"),
            Err(Error::YamlParse(_))
        );
    }
}
