//! Removed Device Detection
//!
//! Diffs the persisted partition scheme of a node against the devices
//! selected by the current pass. Every persisted daemon whose data partition
//! sits on a device that is no longer selected must be torn down.

use crate::domain::model::{DeviceOsdIdEntry, DeviceOsdMapping, PartitionScheme};
use crate::error::{Error, Result};
use crate::ledger::{store_name, IdentityLedger, PARTITION_SCHEME_KEY};
use tracing::info;

/// Daemons to decommission, as scheme entries and by device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovedDevices {
    pub scheme: PartitionScheme,
    pub devices: DeviceOsdMapping,
}

impl RemovedDevices {
    pub fn is_empty(&self) -> bool {
        self.scheme.is_empty()
    }
}

/// Finds persisted daemons whose data device is gone or deselected
pub struct RemovedDeviceDetector<'a> {
    ledger: &'a IdentityLedger,
}

impl<'a> RemovedDeviceDetector<'a> {
    pub fn new(ledger: &'a IdentityLedger) -> Self {
        Self { ledger }
    }

    /// Load the node's scheme and diff it against `current`
    pub async fn detect(&self, node_id: &str, current: &DeviceOsdMapping) -> Result<RemovedDevices> {
        let scheme = self.ledger.load_partition_scheme(node_id).await?;
        removed_from_scheme(node_id, &scheme, current)
    }
}

/// Diff an already loaded scheme against the current device mapping
pub fn removed_from_scheme(
    node_id: &str,
    scheme: &PartitionScheme,
    current: &DeviceOsdMapping,
) -> Result<RemovedDevices> {
    let mut removed = RemovedDevices::default();

    for entry in &scheme.entries {
        let device = entry.data_device().ok_or_else(|| Error::LedgerCorrupt {
            store: store_name(node_id),
            key: PARTITION_SCHEME_KEY.to_string(),
            reason: format!(
                "{} has no {} partition for store type {}",
                entry.id,
                entry.data_partition_role(),
                entry.store_type
            ),
        })?;

        if current.contains(device) {
            continue;
        }

        info!(node = node_id, device, osd = %entry.id, "data device removed");
        removed.scheme.entries.push(entry.clone());
        removed
            .devices
            .insert(device, DeviceOsdIdEntry::assigned(entry.id));
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{OsdId, PartitionInfo, PartitionRole, PartitionSchemeEntry, StoreType};
    use assert_matches::assert_matches;

    const NODE: &str = "node1";

    fn entry(id: u32, store_type: StoreType, parts: &[(PartitionRole, &str)]) -> PartitionSchemeEntry {
        let mut entry = PartitionSchemeEntry::new(OsdId(id), store_type);
        for (role, device) in parts {
            entry.partitions.insert(
                *role,
                PartitionInfo {
                    device: device.to_string(),
                    ..Default::default()
                },
            );
        }
        entry
    }

    fn mapping(devices: &[&str]) -> DeviceOsdMapping {
        let mut mapping = DeviceOsdMapping::new();
        for device in devices {
            mapping.insert(*device, DeviceOsdIdEntry::unassigned());
        }
        mapping
    }

    async fn ledger_with(entries: Vec<PartitionSchemeEntry>) -> IdentityLedger {
        let ledger = IdentityLedger::in_memory();
        ledger
            .save_partition_scheme(NODE, &PartitionScheme { entries })
            .await
            .unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_empty_scheme_removes_nothing() {
        let ledger = IdentityLedger::in_memory();
        let removed = RemovedDeviceDetector::new(&ledger)
            .detect(NODE, &mapping(&["sda"]))
            .await
            .unwrap();
        assert!(removed.is_empty());
        assert!(removed.devices.is_empty());
    }

    #[tokio::test]
    async fn test_bluestore_device_removed() {
        let ledger = ledger_with(vec![
            entry(
                1,
                StoreType::Bluestore,
                &[
                    (PartitionRole::Block, "sdx"),
                    (PartitionRole::Wal, "nvme01"),
                    (PartitionRole::Metadata, "nvme01"),
                ],
            ),
            entry(2, StoreType::Bluestore, &[(PartitionRole::Block, "sda")]),
        ])
        .await;

        let removed = RemovedDeviceDetector::new(&ledger)
            .detect(NODE, &mapping(&["sda", "nvme01"]))
            .await
            .unwrap();

        assert_eq!(removed.scheme.entries.len(), 1);
        assert_eq!(removed.scheme.entries[0].id, OsdId(1));
        assert_eq!(removed.devices.len(), 1);
        assert_eq!(
            removed.devices.get("sdx"),
            Some(&DeviceOsdIdEntry::assigned(OsdId(1)))
        );
    }

    #[tokio::test]
    async fn test_filestore_uses_data_role() {
        let ledger = ledger_with(vec![entry(
            1,
            StoreType::Filestore,
            &[(PartitionRole::Data, "sdx"), (PartitionRole::Journal, "sda")],
        )])
        .await;

        let removed = RemovedDeviceDetector::new(&ledger)
            .detect(NODE, &mapping(&["sda"]))
            .await
            .unwrap();
        assert_eq!(
            removed.devices.get("sdx"),
            Some(&DeviceOsdIdEntry::assigned(OsdId(1)))
        );

        // still selected, nothing to remove
        let removed = RemovedDeviceDetector::new(&ledger)
            .detect(NODE, &mapping(&["sda", "sdx"]))
            .await
            .unwrap();
        assert!(removed.is_empty());
    }

    #[tokio::test]
    async fn test_entry_without_data_partition_is_corrupt() {
        // bluestore entry that only records a filestore data partition
        let ledger = ledger_with(vec![entry(
            7,
            StoreType::Bluestore,
            &[(PartitionRole::Data, "sdx")],
        )])
        .await;

        let result = RemovedDeviceDetector::new(&ledger)
            .detect(NODE, &mapping(&[]))
            .await;
        assert_matches!(
            result,
            Err(Error::LedgerCorrupt { reason, .. }) if reason.contains("osd.7")
        );
    }
}
