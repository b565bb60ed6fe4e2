//! Reconcile Pass
//!
//! One planning pass for one node: devices and directories are planned
//! independently, then both are reconciled against what the ledger says was
//! materialized before. The pass never writes the ledger; persisting the
//! outcome is the provisioning step's job once it has acted on the plan.

use super::config::{merge_config, resolve_store_config};
use super::devices::{DeviceFilter, DevicePlanner};
use super::directories::DirectoryPlanner;
use super::removed::removed_from_scheme;
use crate::domain::model::{
    DeviceOsdMapping, DirectoryMap, LocalDisk, OsdSlot, PartitionScheme, RemovedDirectoryMap,
    StoreConfig,
};
use crate::domain::ports::CommandExecutor;
use crate::error::Result;
use crate::hardware::probe::ProbeConfig;
use crate::ledger::IdentityLedger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

// =============================================================================
// Node Intent
// =============================================================================

/// What the operator asked for on one node, already resolved from the
/// cluster resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeIntent {
    pub node_id: String,
    /// Default fallback directory
    pub default_dir: String,
    /// Comma-separated directory list
    #[serde(default)]
    pub directories: String,
    /// Empty, "all" or a regular expression
    #[serde(default)]
    pub device_filter: String,
    #[serde(default)]
    pub metadata_device: String,
    /// Node-level config bag (cluster config already merged in)
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    /// Per-device config bags
    #[serde(default)]
    pub device_config: BTreeMap<String, BTreeMap<String, String>>,
}

impl NodeIntent {
    pub fn devices_selected(&self) -> bool {
        !self.device_filter.is_empty()
    }

    pub fn store_config(&self) -> StoreConfig {
        resolve_store_config(&self.config)
    }

    /// Store config of a device: node config overlaid with the device's own
    pub fn device_store_config(&self, device: &str) -> StoreConfig {
        match self.device_config.get(device) {
            Some(overlay) => resolve_store_config(&merge_config(&self.config, overlay)),
            None => self.store_config(),
        }
    }
}

// =============================================================================
// Placement Plan
// =============================================================================

/// Outcome of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementPlan {
    pub node_id: String,
    pub store_config: StoreConfig,
    pub directories: DirectoryMap,
    pub removed_directories: RemovedDirectoryMap,
    pub devices: DeviceOsdMapping,
    pub removed_devices: DeviceOsdMapping,
    pub removed_scheme: PartitionScheme,
    /// Selected devices that failed eligibility, with the reason
    #[serde(default)]
    pub excluded_devices: BTreeMap<String, String>,
    /// Devices whose config differs from the node's
    #[serde(default)]
    pub device_store_configs: BTreeMap<String, StoreConfig>,
}

impl PlacementPlan {
    pub fn has_removals(&self) -> bool {
        !self.removed_directories.is_empty() || !self.removed_devices.is_empty()
    }
}

// =============================================================================
// Reconcile Pass
// =============================================================================

/// Runs the planners for one node
pub struct ReconcilePass<'a> {
    ledger: &'a IdentityLedger,
    executor: &'a dyn CommandExecutor,
    probe_config: &'a ProbeConfig,
}

impl<'a> ReconcilePass<'a> {
    pub fn new(
        ledger: &'a IdentityLedger,
        executor: &'a dyn CommandExecutor,
        probe_config: &'a ProbeConfig,
    ) -> Self {
        Self {
            ledger,
            executor,
            probe_config,
        }
    }

    pub async fn run(&self, intent: &NodeIntent, disks: &[LocalDisk]) -> Result<PlacementPlan> {
        let node_id = intent.node_id.as_str();
        let filter = DeviceFilter::parse(&intent.device_filter)?;
        let metadata_device = Some(intent.metadata_device.as_str()).filter(|m| !m.is_empty());

        let device_plan = DevicePlanner::new(self.executor, self.probe_config)
            .plan_detailed(disks, &filter, metadata_device)
            .await?;

        let dir_plan = DirectoryPlanner::new(self.ledger)
            .plan(
                node_id,
                &intent.default_dir,
                &intent.directories,
                intent.devices_selected(),
            )
            .await?;

        let scheme = self.ledger.load_partition_scheme(node_id).await?;
        let removed = removed_from_scheme(node_id, &scheme, &device_plan.devices)?;

        let mut devices = device_plan.devices;
        bind_persisted_identities(&mut devices, &scheme, &removed.scheme);

        let device_store_configs = devices
            .entries
            .keys()
            .filter(|d| intent.device_config.contains_key(*d))
            .map(|d| (d.clone(), intent.device_store_config(d)))
            .collect();

        let plan = PlacementPlan {
            node_id: node_id.to_string(),
            store_config: intent.store_config(),
            directories: dir_plan.directories,
            removed_directories: dir_plan.removed,
            devices,
            removed_devices: removed.devices,
            removed_scheme: removed.scheme,
            excluded_devices: device_plan
                .excluded
                .iter()
                .map(|(d, reason)| (d.clone(), reason.to_string()))
                .collect(),
            device_store_configs,
        };

        info!(
            node = node_id,
            directories = plan.directories.len(),
            devices = plan.devices.len(),
            removed_directories = plan.removed_directories.len(),
            removed_devices = plan.removed_devices.len(),
            "placement planned"
        );
        Ok(plan)
    }
}

/// Carry identities of surviving daemons onto their still-selected devices.
///
/// The data device of a scheme entry gets that identity. Any device holding a
/// non-data partition of a surviving entry lists it as a metadata consumer,
/// whether or not it is the reserved metadata device, so it is never offered
/// as a free data device. Entries slated for removal bind nothing.
fn bind_persisted_identities(
    devices: &mut DeviceOsdMapping,
    scheme: &PartitionScheme,
    removed: &PartitionScheme,
) {
    let surviving = scheme
        .entries
        .iter()
        .filter(|entry| !removed.entries.iter().any(|r| r.id == entry.id));

    for entry in surviving {
        let data_role = entry.data_partition_role();
        for (role, partition) in &entry.partitions {
            let Some(device) = devices.entries.get_mut(&partition.device) else {
                continue;
            };
            if *role == data_role {
                device.data = OsdSlot::Assigned(entry.id);
                continue;
            }
            let metadata = device.metadata.get_or_insert_with(Vec::new);
            if !metadata.contains(&entry.id) {
                metadata.push(entry.id);
            }
        }
    }

    for device in devices.entries.values_mut() {
        if let Some(metadata) = device.metadata.as_mut() {
            metadata.sort();
        }
    }
}
