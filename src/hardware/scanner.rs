//! Block Device Scanner
//!
//! Enumerates whole block devices from sysfs and determines their type
//! (NVMe, SSD, HDD). Partitions and virtual devices are skipped; deciding
//! whether a device is free for use is left to the probes.

use crate::domain::model::{DriveType, LocalDisk};
use crate::domain::ports::BlockDeviceSource;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// =============================================================================
// Scanner Configuration
// =============================================================================

/// Configuration for the hardware scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Include loopback devices
    pub include_loopback: bool,
    /// Include RAM disks
    pub include_ram: bool,
    /// Include device mapper devices
    pub include_dm: bool,
    /// Minimum device size to include (bytes)
    pub min_size_bytes: u64,
    /// Path to sysfs (for testing)
    pub sysfs_path: PathBuf,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            include_loopback: false,
            include_ram: false,
            include_dm: false,
            min_size_bytes: 1_000_000_000, // 1GB minimum
            sysfs_path: PathBuf::from("/sys"),
        }
    }
}

// =============================================================================
// Hardware Scanner
// =============================================================================

/// Scans for block devices on Linux systems
pub struct HardwareScanner {
    config: ScannerConfig,
}

impl HardwareScanner {
    /// Create a new hardware scanner
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Create a scanner with default configuration
    pub fn default_scanner() -> Self {
        Self::new(ScannerConfig::default())
    }

    /// Discover all whole block devices on the local node, sorted by name
    pub fn scan(&self) -> Result<Vec<LocalDisk>> {
        let block_path = self.config.sysfs_path.join("class/block");
        if !block_path.exists() {
            return Err(Error::HardwareDiscovery(format!(
                "Block device sysfs not found at {}",
                block_path.display()
            )));
        }

        let mut disks = Vec::new();

        for entry in fs::read_dir(&block_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();

            // Skip devices we don't want
            if !self.should_include_device(&name) {
                continue;
            }

            // Skip partitions
            if self.is_partition(&entry.path()) {
                continue;
            }

            match self.scan_block_device(&entry.path(), &name) {
                Ok(disk) if disk.size_bytes >= self.config.min_size_bytes => disks.push(disk),
                Ok(disk) => {
                    debug!(device = %disk.name, size = disk.size_bytes, "skipping small device")
                }
                Err(e) => debug!(device = %name, error = %e, "skipping unreadable device"),
            }
        }

        disks.sort_by(|a, b| a.name.cmp(&b.name));
        info!("Found {} block devices", disks.len());
        Ok(disks)
    }

    /// Scan a single block device
    fn scan_block_device(&self, sysfs_path: &Path, name: &str) -> Result<LocalDisk> {
        let model = self
            .read_sysfs_attr(sysfs_path, "device/model")
            .or_else(|_| self.read_sysfs_attr(sysfs_path, "device/name"))
            .unwrap_or_else(|_| "Unknown".to_string());

        let serial = self
            .read_sysfs_attr(sysfs_path, "device/serial")
            .unwrap_or_else(|_| "Unknown".to_string());

        // Read size (in 512-byte sectors)
        let size_str = self.read_sysfs_attr(sysfs_path, "size")?;
        let sectors: u64 = size_str.trim().parse().map_err(|_| {
            Error::HardwareDiscovery(format!("Invalid size for {}: {}", name, size_str.trim()))
        })?;

        Ok(LocalDisk {
            name: name.to_string(),
            device_path: format!("/dev/{}", name),
            drive_type: self.detect_drive_type(sysfs_path, name),
            size_bytes: sectors * 512,
            model: model.trim().to_string(),
            serial: serial.trim().to_string(),
        })
    }

    /// Detect whether a device is NVMe, SSD or HDD
    fn detect_drive_type(&self, sysfs_path: &Path, name: &str) -> DriveType {
        if name.starts_with("nvme") {
            return DriveType::Nvme;
        }

        // Check rotational flag
        if let Ok(rotational) = self.read_sysfs_attr(sysfs_path, "queue/rotational") {
            if rotational.trim() == "0" {
                return DriveType::Ssd;
            } else if rotational.trim() == "1" {
                return DriveType::Hdd;
            }
        }

        DriveType::Unknown
    }

    /// Check if a path is a partition
    fn is_partition(&self, sysfs_path: &Path) -> bool {
        // Partitions have a "partition" file
        sysfs_path.join("partition").exists()
    }

    /// Check if a device should be included
    fn should_include_device(&self, name: &str) -> bool {
        // Skip loopback devices
        if !self.config.include_loopback && name.starts_with("loop") {
            return false;
        }

        // Skip RAM disks
        if !self.config.include_ram && name.starts_with("ram") {
            return false;
        }

        // Skip device mapper
        if !self.config.include_dm && name.starts_with("dm-") {
            return false;
        }

        // Skip md RAID devices, zram and optical drives
        if name.starts_with("md") || name.starts_with("zram") || name.starts_with("sr") {
            return false;
        }

        true
    }

    /// Read a sysfs attribute
    fn read_sysfs_attr(&self, base_path: &Path, attr: &str) -> Result<String> {
        let path = base_path.join(attr);
        fs::read_to_string(&path).map_err(|e| {
            Error::HardwareDiscovery(format!("Failed to read {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl BlockDeviceSource for HardwareScanner {
    async fn list_disks(&self) -> Result<Vec<LocalDisk>> {
        self.scan()
    }
}

// =============================================================================
// Static Device Source
// =============================================================================

/// Fixed device list, for tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceSource {
    disks: Vec<LocalDisk>,
}

impl StaticDeviceSource {
    pub fn new(disks: Vec<LocalDisk>) -> Self {
        Self { disks }
    }

    /// Devices known only by name
    pub fn named(names: &[&str]) -> Self {
        Self::new(names.iter().map(|n| LocalDisk::named(*n)).collect())
    }
}

#[async_trait]
impl BlockDeviceSource for StaticDeviceSource {
    async fn list_disks(&self) -> Result<Vec<LocalDisk>> {
        Ok(self.disks.clone())
    }
}
