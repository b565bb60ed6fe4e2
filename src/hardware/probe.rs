//! Device Eligibility Probes
//!
//! Decides whether a block device is free for the agent to take over, using
//! three probes run through a [`CommandExecutor`]:
//!
//! - list the device's child partitions (`lsblk --json`)
//! - read a partition's GPT label (`lsblk --output PARTLABEL`)
//! - look for a filesystem mounted from the raw device (`df`)
//!
//! Output that cannot be parsed is an error naming the command and its
//! arguments; it is never treated as "no partitions" or "not mounted".

use crate::domain::ports::CommandExecutor;
use crate::error::{Error, Result};
use serde::Deserialize;
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

/// Action name prefix of the partition listing probe
pub const ACTION_LIST_PARTITIONS: &str = "list partitions";

/// Action name prefix of the partition label probe
pub const ACTION_READ_LABEL: &str = "read partition label";

/// Action name prefix of the mounted filesystem probe
pub const ACTION_CHECK_FILESYSTEM: &str = "check mounted filesystem";

/// Label prefix of partitions created by the provisioning step
pub const DEFAULT_OWNED_LABEL_PREFIX: &str = "ROOK-OSD";

/// lsblk listing of a device without partitions
#[cfg(test)]
pub(crate) const NO_PARTITIONS: &str = r#"{"blockdevices": [{"name": "sdx", "size": 1, "type": "disk", "pkname": null}]}"#;

// =============================================================================
// Probe Configuration
// =============================================================================

/// Configuration for device probing
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Partition label prefix that marks a partition as ours
    pub owned_label_prefix: String,
    /// Log raw probe output
    pub debug: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            owned_label_prefix: DEFAULT_OWNED_LABEL_PREFIX.to_string(),
            debug: false,
        }
    }
}

// =============================================================================
// Probe Results
// =============================================================================

/// A child partition reported by lsblk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub name: String,
    pub size_bytes: u64,
}

/// Outcome of the eligibility check for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// Free, or only carrying partitions we own
    Eligible,
    /// At least one partition is not ours
    ForeignPartition { partition: String, label: String },
    /// No partitions, but a filesystem is mounted from the raw device
    MountedFilesystem { fstype: String },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

impl std::fmt::Display for Eligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Eligibility::Eligible => write!(f, "eligible"),
            Eligibility::ForeignPartition { partition, label } => {
                write!(f, "partition {} has foreign label {:?}", partition, label)
            }
            Eligibility::MountedFilesystem { fstype } => {
                write!(f, "raw device has a mounted {} filesystem", fstype)
            }
        }
    }
}

// =============================================================================
// Device Prober
// =============================================================================

/// Runs the eligibility probes for block devices
pub struct DeviceProber<'a> {
    executor: &'a dyn CommandExecutor,
    config: &'a ProbeConfig,
}

impl<'a> DeviceProber<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, config: &'a ProbeConfig) -> Self {
        Self { executor, config }
    }

    /// Classify a device as eligible or not
    pub async fn check(&self, device: &str) -> Result<Eligibility> {
        let partitions = self.partitions(device).await?;

        if partitions.is_empty() {
            return Ok(match self.mounted_filesystem(device).await? {
                Some(fstype) => Eligibility::MountedFilesystem { fstype },
                None => Eligibility::Eligible,
            });
        }

        for partition in &partitions {
            let label = self.partition_label(&partition.name).await?;
            if !label.starts_with(&self.config.owned_label_prefix) {
                return Ok(Eligibility::ForeignPartition {
                    partition: partition.name.clone(),
                    label,
                });
            }
        }

        debug!(device, partitions = partitions.len(), "device only carries owned partitions");
        Ok(Eligibility::Eligible)
    }

    /// List the child partitions of a device
    pub async fn partitions(&self, device: &str) -> Result<Vec<Partition>> {
        let dev_path = format!("/dev/{}", device);
        let args = [
            dev_path.as_str(),
            "--json",
            "--bytes",
            "--output",
            "NAME,SIZE,TYPE,PKNAME",
        ];
        let output = self
            .run(ACTION_LIST_PARTITIONS, device, "lsblk", &args)
            .await?;

        let listing: LsblkOutput =
            serde_json::from_str(&output).map_err(|_| unexpected("lsblk", &args, &output))?;

        let mut partitions = Vec::new();
        let mut pending: Vec<&LsblkDevice> = listing.blockdevices.iter().collect();
        while let Some(dev) = pending.pop() {
            pending.extend(dev.children.iter());
            if dev.kind != "part" || dev.pkname.as_deref() != Some(device) {
                continue;
            }
            let size_bytes = match &dev.size {
                Some(size) => size
                    .bytes()
                    .ok_or_else(|| unexpected("lsblk", &args, &output))?,
                None => 0,
            };
            partitions.push(Partition {
                name: dev.name.clone(),
                size_bytes,
            });
        }

        partitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(partitions)
    }

    /// Read the GPT label of a partition (empty when unlabeled)
    pub async fn partition_label(&self, partition: &str) -> Result<String> {
        let dev_path = format!("/dev/{}", partition);
        let args = [
            dev_path.as_str(),
            "--noheadings",
            "--nodeps",
            "--output",
            "PARTLABEL",
        ];
        let output = self.run(ACTION_READ_LABEL, partition, "lsblk", &args).await?;

        let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
        let label = lines.next().unwrap_or_default().to_string();
        if lines.next().is_some() {
            return Err(unexpected("lsblk", &args, &output));
        }
        Ok(label)
    }

    /// Filesystem type mounted from the raw device, if any
    pub async fn mounted_filesystem(&self, device: &str) -> Result<Option<String>> {
        let dev_path = format!("/dev/{}", device);
        let args = ["--output=source,fstype"];
        let output = self
            .run(ACTION_CHECK_FILESYSTEM, device, "df", &args)
            .await?;

        for line in output.lines() {
            let mut cols = line.split_whitespace();
            if cols.next() != Some(dev_path.as_str()) {
                continue;
            }
            return match (cols.next(), cols.next()) {
                (Some(fstype), None) => Ok(Some(fstype.to_string())),
                _ => Err(unexpected("df", &args, &output)),
            };
        }
        Ok(None)
    }

    async fn run(&self, action: &str, target: &str, command: &str, args: &[&str]) -> Result<String> {
        let action_name = format!("{} {}", action, target);
        self.executor
            .run(self.config.debug, &action_name, command, args)
            .await
    }
}

fn unexpected(command: &str, args: &[&str], output: &str) -> Error {
    Error::UnexpectedProbeOutput {
        command: command.to_string(),
        args: args.iter().map(|a| a.to_string()).collect(),
        output: output.to_string(),
    }
}

// =============================================================================
// lsblk JSON
// =============================================================================

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    size: Option<LsblkSize>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    pkname: Option<String>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

/// Older lsblk releases print `--bytes` sizes as strings
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LsblkSize {
    Number(u64),
    Text(String),
}

impl LsblkSize {
    fn bytes(&self) -> Option<u64> {
        match self {
            LsblkSize::Number(n) => Some(*n),
            LsblkSize::Text(s) => s.parse().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::executor::ScriptedExecutor;

    const SDB_LSBLK: &str = r#"{
        "blockdevices": [
            {"name": "sdb", "size": 65, "type": "disk", "pkname": null,
             "children": [
                {"name": "sdb1", "size": 30, "type": "part", "pkname": "sdb"}
             ]}
        ]
    }"#;

    #[tokio::test]
    async fn test_partitions_accepts_string_sizes() {
        let output = r#"{"blockdevices": [
            {"name": "sdb", "size": "65", "type": "disk", "pkname": null,
             "children": [
                {"name": "sdb2", "size": "20", "type": "part", "pkname": "sdb"},
                {"name": "sdb1", "size": "30", "type": "part", "pkname": "sdb"}
             ]}
        ]}"#;
        let exec = ScriptedExecutor::new().on(ACTION_LIST_PARTITIONS, "sdb", output);
        let config = ProbeConfig::default();
        let prober = DeviceProber::new(&exec, &config);

        let parts = prober.partitions("sdb").await.unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "sdb1");
        assert_eq!(parts[0].size_bytes, 30);
        assert_eq!(parts[1].size_bytes, 20);
    }

    #[tokio::test]
    async fn test_bad_partition_size_is_an_error() {
        let output = r#"{"blockdevices": [
            {"name": "sdb1", "size": "30G", "type": "part", "pkname": "sdb"}
        ]}"#;
        let exec = ScriptedExecutor::new().on(ACTION_LIST_PARTITIONS, "sdb", output);
        let config = ProbeConfig::default();
        let prober = DeviceProber::new(&exec, &config);

        assert!(matches!(
            prober.partitions("sdb").await,
            Err(Error::UnexpectedProbeOutput { .. })
        ));
    }

    #[tokio::test]
    async fn test_multi_line_label_is_an_error() {
        let exec = ScriptedExecutor::new().on(ACTION_READ_LABEL, "sdb1", "ROOK-OSD1-BLOCK\nROOK-OSD2-BLOCK");
        let config = ProbeConfig::default();
        let prober = DeviceProber::new(&exec, &config);

        match prober.partition_label("sdb1").await {
            Err(Error::UnexpectedProbeOutput { command, args, .. }) => {
                assert_eq!(command, "lsblk");
                assert_eq!(args[0], "/dev/sdb1");
                assert!(args.contains(&"PARTLABEL".to_string()));
            }
            other => panic!("expected UnexpectedProbeOutput, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unlabeled_partition_reads_empty() {
        let exec = ScriptedExecutor::new().on(ACTION_READ_LABEL, "sdb1", "\n");
        let config = ProbeConfig::default();
        let prober = DeviceProber::new(&exec, &config);

        assert_eq!(prober.partition_label("sdb1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_df_line_with_wrong_columns_is_an_error() {
        let config = ProbeConfig::default();

        for output in [
            "Filesystem Type\n/dev/sdc",
            "Filesystem Type\n/dev/sdc xfs extra",
        ] {
            let exec = ScriptedExecutor::new().on(ACTION_CHECK_FILESYSTEM, "sdc", output);
            let prober = DeviceProber::new(&exec, &config);

            match prober.mounted_filesystem("sdc").await {
                Err(Error::UnexpectedProbeOutput { command, args, .. }) => {
                    assert_eq!(command, "df");
                    assert_eq!(args, vec!["--output=source,fstype".to_string()]);
                }
                other => panic!("expected UnexpectedProbeOutput, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_partitions_only_lists_children() {
        let exec = ScriptedExecutor::new().on(ACTION_LIST_PARTITIONS, "sdb", SDB_LSBLK);
        let config = ProbeConfig::default();
        let prober = DeviceProber::new(&exec, &config);

        let parts = prober.partitions("sdb").await.unwrap();
        assert_eq!(
            parts,
            vec![Partition {
                name: "sdb1".into(),
                size_bytes: 30
            }]
        );
    }

    #[tokio::test]
    async fn test_garbled_lsblk_output_is_an_error() {
        let config = ProbeConfig::default();

        for output in ["sdb 65 disk", "", r#"{"devices": []}"#] {
            let exec = ScriptedExecutor::new().on(ACTION_LIST_PARTITIONS, "sdb", output);
            let prober = DeviceProber::new(&exec, &config);

            match prober.partitions("sdb").await {
                Err(Error::UnexpectedProbeOutput { command, args, .. }) => {
                    assert_eq!(command, "lsblk");
                    assert_eq!(args[0], "/dev/sdb");
                }
                other => panic!("expected UnexpectedProbeOutput, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_check_foreign_partition() {
        let exec = ScriptedExecutor::new()
            .on(ACTION_LIST_PARTITIONS, "sdb", SDB_LSBLK)
            .on(ACTION_READ_LABEL, "sdb1", "MY-PART");
        let config = ProbeConfig::default();
        let prober = DeviceProber::new(&exec, &config);

        let result = prober.check("sdb").await.unwrap();
        assert_eq!(
            result,
            Eligibility::ForeignPartition {
                partition: "sdb1".into(),
                label: "MY-PART".into()
            }
        );
        // filesystem probe is skipped when partitions exist
        assert!(!exec.calls().iter().any(|c| c.starts_with(ACTION_CHECK_FILESYSTEM)));
    }

    #[tokio::test]
    async fn test_check_owned_partitions() {
        let exec = ScriptedExecutor::new()
            .on(ACTION_LIST_PARTITIONS, "sdb", SDB_LSBLK)
            .on(ACTION_READ_LABEL, "sdb1", "ROOK-OSD3-BLOCK");
        let config = ProbeConfig::default();
        let prober = DeviceProber::new(&exec, &config);

        assert!(prober.check("sdb").await.unwrap().is_eligible());
    }

    #[tokio::test]
    async fn test_check_mounted_filesystem() {
        let exec = ScriptedExecutor::new()
            .otherwise(ACTION_LIST_PARTITIONS, NO_PARTITIONS)
            .otherwise(
                ACTION_CHECK_FILESYSTEM,
                "Filesystem     Type\n/dev/sda1      ext4\n/dev/sdc       xfs",
            );
        let config = ProbeConfig::default();
        let prober = DeviceProber::new(&exec, &config);

        assert_eq!(
            prober.check("sdc").await.unwrap(),
            Eligibility::MountedFilesystem {
                fstype: "xfs".into()
            }
        );
        // /dev/sda1 must not be mistaken for /dev/sda
        assert!(prober.check("sda").await.unwrap().is_eligible());
    }

    #[tokio::test]
    async fn test_probe_failure_propagates() {
        let exec = ScriptedExecutor::new().fail(ACTION_LIST_PARTITIONS, "sdz", "no such device");
        let config = ProbeConfig::default();
        let prober = DeviceProber::new(&exec, &config);

        assert!(matches!(
            prober.check("sdz").await,
            Err(Error::ProbeCommand { .. })
        ));
    }
}
