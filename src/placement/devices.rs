//! Device Planner
//!
//! Selects block devices for storage daemons. A filter picks candidates by
//! name, then every candidate is probed and devices already in use by the
//! OS are dropped. An optional metadata device is reserved on the way.

use crate::domain::model::{DeviceOsdIdEntry, DeviceOsdMapping, LocalDisk};
use crate::domain::ports::CommandExecutor;
use crate::error::{Error, Result};
use crate::hardware::probe::{DeviceProber, Eligibility, ProbeConfig};
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Reserved filter value selecting every device
pub const FILTER_ALL: &str = "all";

// =============================================================================
// Device Filter
// =============================================================================

/// Parsed device selection filter
#[derive(Debug, Clone)]
pub enum DeviceFilter {
    /// Empty filter; no device is selected
    None,
    /// Every device is selected
    All,
    /// Devices whose name matches (unanchored)
    Pattern(Regex),
}

impl DeviceFilter {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "" => Ok(DeviceFilter::None),
            FILTER_ALL => Ok(DeviceFilter::All),
            pattern => Regex::new(pattern)
                .map(DeviceFilter::Pattern)
                .map_err(|e| Error::InvalidDeviceFilter {
                    filter: raw.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Filter string matching exactly the given device names
    pub fn names_pattern<S: AsRef<str>>(names: &[S]) -> String {
        if names.is_empty() {
            return String::new();
        }
        let alternation = names
            .iter()
            .map(|n| regex::escape(n.as_ref()))
            .collect::<Vec<_>>()
            .join("|");
        format!("^(?:{})$", alternation)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DeviceFilter::None)
    }

    pub fn selects(&self, device: &str) -> bool {
        match self {
            DeviceFilter::None => false,
            DeviceFilter::All => true,
            DeviceFilter::Pattern(re) => re.is_match(device),
        }
    }
}

// =============================================================================
// Device Planner
// =============================================================================

/// Selected devices plus the candidates that failed eligibility
#[derive(Debug, Clone, Default)]
pub struct DevicePlan {
    pub devices: DeviceOsdMapping,
    pub excluded: BTreeMap<String, Eligibility>,
}

/// Plans the block devices of one node
pub struct DevicePlanner<'a> {
    prober: DeviceProber<'a>,
}

impl<'a> DevicePlanner<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, config: &'a ProbeConfig) -> Self {
        Self {
            prober: DeviceProber::new(executor, config),
        }
    }

    /// Eligible devices selected by `filter`, each unassigned.
    /// An empty `metadata_device` reserves nothing.
    pub async fn plan(
        &self,
        disks: &[LocalDisk],
        filter: &str,
        metadata_device: &str,
    ) -> Result<DeviceOsdMapping> {
        let filter = DeviceFilter::parse(filter)?;
        let metadata_device = Some(metadata_device).filter(|m| !m.is_empty());
        Ok(self.plan_detailed(disks, &filter, metadata_device).await?.devices)
    }

    /// Like [`plan`](Self::plan), also reporting why candidates were excluded
    pub async fn plan_detailed(
        &self,
        disks: &[LocalDisk],
        filter: &DeviceFilter,
        metadata_device: Option<&str>,
    ) -> Result<DevicePlan> {
        let mut plan = DevicePlan::default();
        if filter.is_none() {
            debug!("no device filter, skipping device selection");
            return Ok(plan);
        }

        for disk in disks.iter().filter(|d| filter.selects(&d.name)) {
            let eligibility = self.prober.check(&disk.name).await?;
            if !eligibility.is_eligible() {
                info!(device = %disk.name, reason = %eligibility, "skipping device in use");
                plan.excluded.insert(disk.name.clone(), eligibility);
                continue;
            }

            let mut entry = DeviceOsdIdEntry::unassigned();
            if metadata_device == Some(disk.name.as_str()) {
                info!(device = %disk.name, "reserving metadata device");
                entry.metadata = Some(Vec::new());
            }
            plan.devices.insert(disk.name.clone(), entry);
        }

        if let Some(name) = metadata_device {
            if !plan.devices.contains(name) {
                warn!(device = name, "metadata device is not an eligible selected device");
            }
        }

        debug!(
            selected = plan.devices.len(),
            excluded = plan.excluded.len(),
            "planned devices"
        );
        Ok(plan)
    }
}
