//! Domain Model - Placement types shared by the planners and the ledger
//!
//! Everything in this module is plain data. Maps are ordered so that two
//! passes over identical inputs serialize to identical bytes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Identities
// =============================================================================

/// Stable identity of a storage daemon (OSD)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OsdId(pub u32);

impl std::fmt::Display for OsdId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "osd.{}", self.0)
    }
}

impl From<u32> for OsdId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Identity slot of a planned location
///
/// `Unassigned` only exists in memory while planning. Serialized as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<OsdId>", into = "Option<OsdId>")]
pub enum OsdSlot {
    /// Eligible, not yet bound to an identity
    Unassigned,
    /// Bound to a previously materialized daemon
    Assigned(OsdId),
}

impl OsdSlot {
    pub fn id(&self) -> Option<OsdId> {
        match self {
            OsdSlot::Unassigned => None,
            OsdSlot::Assigned(id) => Some(*id),
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, OsdSlot::Assigned(_))
    }
}

impl From<Option<OsdId>> for OsdSlot {
    fn from(id: Option<OsdId>) -> Self {
        match id {
            Some(id) => OsdSlot::Assigned(id),
            None => OsdSlot::Unassigned,
        }
    }
}

impl From<OsdSlot> for Option<OsdId> {
    fn from(slot: OsdSlot) -> Self {
        slot.id()
    }
}

impl From<OsdId> for OsdSlot {
    fn from(id: OsdId) -> Self {
        OsdSlot::Assigned(id)
    }
}

impl std::fmt::Display for OsdSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsdSlot::Unassigned => write!(f, "unassigned"),
            OsdSlot::Assigned(id) => write!(f, "{}", id),
        }
    }
}

// =============================================================================
// Directory Maps
// =============================================================================

/// Planned directory → identity map
pub type DirectoryMap = BTreeMap<String, OsdSlot>;

/// Directory → identity map as persisted in the ledger
pub type PersistedDirMap = BTreeMap<String, OsdId>;

/// Previously assigned directories no longer desired. Values always come
/// from the ledger, so every entry carries a real identity.
pub type RemovedDirectoryMap = BTreeMap<String, OsdId>;

/// Convert a planned directory map into its persisted form.
///
/// Fails on the first location still unassigned; the provisioning step must
/// bind every location before its result is committed.
pub fn commit_dir_map(planned: &DirectoryMap) -> Result<PersistedDirMap> {
    planned
        .iter()
        .map(|(path, slot)| match slot {
            OsdSlot::Assigned(id) => Ok((path.clone(), *id)),
            OsdSlot::Unassigned => Err(Error::UnassignedIdentity {
                location: path.clone(),
            }),
        })
        .collect()
}

// =============================================================================
// Device Mapping
// =============================================================================

/// Identity assignment for one block device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOsdIdEntry {
    /// Identity using this device for its primary data
    pub data: OsdSlot,

    /// Identities using this device as a metadata/WAL/journal target.
    /// `Some(vec![])` reserves the device for that role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<OsdId>>,
}

impl DeviceOsdIdEntry {
    /// Eligible device with no identity yet
    pub fn unassigned() -> Self {
        Self {
            data: OsdSlot::Unassigned,
            metadata: None,
        }
    }

    /// Device bound to an existing identity
    pub fn assigned(id: OsdId) -> Self {
        Self {
            data: OsdSlot::Assigned(id),
            metadata: None,
        }
    }

    /// Whether this device is reserved for shared metadata
    pub fn is_metadata_device(&self) -> bool {
        self.metadata.is_some()
    }
}

/// Device name → identity entry map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOsdMapping {
    #[serde(default)]
    pub entries: BTreeMap<String, DeviceOsdIdEntry>,
}

impl DeviceOsdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device: impl Into<String>, entry: DeviceOsdIdEntry) {
        self.entries.insert(device.into(), entry);
    }

    pub fn get(&self, device: &str) -> Option<&DeviceOsdIdEntry> {
        self.entries.get(device)
    }

    pub fn contains(&self, device: &str) -> bool {
        self.entries.contains_key(device)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Storage Engine Configuration
// =============================================================================

/// Backing store implementation of a daemon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    #[default]
    Bluestore,
    Filestore,
}

impl StoreType {
    /// Map a configured store type; anything other than filestore is bluestore
    pub fn from_config(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("filestore") {
            StoreType::Filestore
        } else {
            StoreType::Bluestore
        }
    }

    /// Partition role holding the daemon's primary data
    pub fn data_partition_role(&self) -> PartitionRole {
        match self {
            StoreType::Bluestore => PartitionRole::Block,
            StoreType::Filestore => PartitionRole::Data,
        }
    }
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreType::Bluestore => write!(f, "bluestore"),
            StoreType::Filestore => write!(f, "filestore"),
        }
    }
}

/// Typed storage engine configuration resolved from a config bag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default)]
    pub store_type: String,
    #[serde(default, rename = "walSizeMB")]
    pub wal_size_mb: i64,
    #[serde(default, rename = "databaseSizeMB")]
    pub database_size_mb: i64,
    #[serde(default, rename = "journalSizeMB")]
    pub journal_size_mb: i64,
}

impl StoreConfig {
    pub fn store_type(&self) -> StoreType {
        StoreType::from_config(&self.store_type)
    }
}

// =============================================================================
// Partition Scheme
// =============================================================================

/// Functional purpose of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionRole {
    /// Bluestore primary block
    Block,
    /// Filestore data
    Data,
    /// Bluestore database
    Metadata,
    Wal,
    Journal,
}

impl std::fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionRole::Block => write!(f, "block"),
            PartitionRole::Data => write!(f, "data"),
            PartitionRole::Metadata => write!(f, "metadata"),
            PartitionRole::Wal => write!(f, "wal"),
            PartitionRole::Journal => write!(f, "journal"),
        }
    }
}

/// Placement of one partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    /// Device name (e.g., sdb)
    pub device: String,
    #[serde(default)]
    pub disk_uuid: String,
    #[serde(default)]
    pub partition_uuid: String,
    /// Size in MB; `None` uses the remainder of the device
    #[serde(default, rename = "sizeMB")]
    pub size_mb: Option<u64>,
    #[serde(default, rename = "offsetMB")]
    pub offset_mb: u64,
}

/// Persisted partition layout of one daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionSchemeEntry {
    pub id: OsdId,
    #[serde(default)]
    pub store_type: StoreType,
    #[serde(default)]
    pub partitions: BTreeMap<PartitionRole, PartitionInfo>,
}

impl PartitionSchemeEntry {
    pub fn new(id: OsdId, store_type: StoreType) -> Self {
        Self {
            id,
            store_type,
            partitions: BTreeMap::new(),
        }
    }

    pub fn data_partition_role(&self) -> PartitionRole {
        self.store_type.data_partition_role()
    }

    /// Device backing the data role, if the entry records one
    pub fn data_device(&self) -> Option<&str> {
        self.partitions
            .get(&self.data_partition_role())
            .map(|p| p.device.as_str())
    }
}

/// All persisted partition layouts of a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionScheme {
    #[serde(default)]
    pub entries: Vec<PartitionSchemeEntry>,
}

impl PartitionScheme {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Probed Devices
// =============================================================================

/// Drive type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveType {
    Nvme,
    Ssd,
    Hdd,
    Unknown,
}

impl std::fmt::Display for DriveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriveType::Nvme => write!(f, "nvme"),
            DriveType::Ssd => write!(f, "ssd"),
            DriveType::Hdd => write!(f, "hdd"),
            DriveType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A whole block device found on the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDisk {
    /// Kernel name (e.g., sda, nvme0n1)
    pub name: String,
    /// Device path (e.g., /dev/sda)
    pub device_path: String,
    pub drive_type: DriveType,
    pub size_bytes: u64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serial: String,
}

impl LocalDisk {
    /// Disk known only by name
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            device_path: format!("/dev/{}", name),
            name,
            drive_type: DriveType::Unknown,
            size_bytes: 0,
            model: String::new(),
            serial: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_serializes_as_nullable_id() {
        let mut map = DirectoryMap::new();
        map.insert("/rook/dir1".into(), OsdSlot::Assigned(OsdId(1)));
        map.insert("/tmp/mydir".into(), OsdSlot::Unassigned);

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"/rook/dir1":1,"/tmp/mydir":null}"#);

        let back: DirectoryMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_commit_dir_map_rejects_unassigned() {
        let mut map = DirectoryMap::new();
        map.insert("/rook/dir1".into(), OsdSlot::Assigned(OsdId(1)));
        let committed = commit_dir_map(&map).unwrap();
        assert_eq!(committed.get("/rook/dir1"), Some(&OsdId(1)));

        map.insert("/tmp/mydir".into(), OsdSlot::Unassigned);
        match commit_dir_map(&map) {
            Err(Error::UnassignedIdentity { location }) => assert_eq!(location, "/tmp/mydir"),
            other => panic!("expected UnassignedIdentity, got {:?}", other),
        }
    }

    #[test]
    fn test_data_partition_role_by_store_type() {
        assert_eq!(StoreType::Bluestore.data_partition_role(), PartitionRole::Block);
        assert_eq!(StoreType::Filestore.data_partition_role(), PartitionRole::Data);
        assert_eq!(StoreType::from_config("filestore"), StoreType::Filestore);
        assert_eq!(StoreType::from_config(""), StoreType::Bluestore);
        assert_eq!(StoreType::from_config("bluestore"), StoreType::Bluestore);
    }

    #[test]
    fn test_partition_scheme_json_shape() {
        let mut entry = PartitionSchemeEntry::new(OsdId(3), StoreType::Filestore);
        entry.partitions.insert(
            PartitionRole::Data,
            PartitionInfo {
                device: "sdx".into(),
                ..Default::default()
            },
        );
        let scheme = PartitionScheme {
            entries: vec![entry],
        };

        let json = serde_json::to_value(&scheme).unwrap();
        assert_eq!(json["entries"][0]["id"], 3);
        assert_eq!(json["entries"][0]["storeType"], "filestore");
        assert_eq!(json["entries"][0]["partitions"]["data"]["device"], "sdx");

        let back: PartitionScheme = serde_json::from_value(json).unwrap();
        assert_eq!(back.entries[0].data_device(), Some("sdx"));
    }

    #[test]
    fn test_metadata_entry_omits_field_when_absent() {
        let json = serde_json::to_string(&DeviceOsdIdEntry::unassigned()).unwrap();
        assert_eq!(json, r#"{"data":null}"#);

        let reserved = DeviceOsdIdEntry {
            data: OsdSlot::Unassigned,
            metadata: Some(vec![]),
        };
        let json = serde_json::to_string(&reserved).unwrap();
        assert_eq!(json, r#"{"data":null,"metadata":[]}"#);
        assert!(reserved.is_metadata_device());
    }
}
