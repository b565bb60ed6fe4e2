//! Smart Storage Agent - Node-local storage placement
//!
//! Runs on every storage node and turns the cluster's storage intent into a
//! stable assignment of devices and directories to storage daemon (OSD)
//! identities.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              Node Agent Loop                                 │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │  Intent Source  │  │    Hardware     │  │      HTTP API / Metrics     │  │
//! │  │  (CRD / YAML)   │  │  Scan + Probes  │  │                             │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────────────────────┘  │
//! │           │                    │                                             │
//! │           └────────────────────┼─────────────────────┐                       │
//! │                                │                     │                       │
//! │  ┌─────────────────────────────┴──────────────┐  ┌───┴───────────────────┐  │
//! │  │               Reconcile Pass               │  │    Identity Ledger    │  │
//! │  │  Directory Planner · Device Planner ·      │◄─┤ ConfigMap/File/Memory │  │
//! │  │  Removed Device Detector                   │  └───────────────────────┘  │
//! │  └────────────────────────────────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`agent`]: Reconcile loop, intent sources, metrics and HTTP API
//! - [`placement`]: Directory/device planning and removal detection
//! - [`ledger`]: Persisted location → identity assignments
//! - [`hardware`]: Block device scanning and eligibility probes
//! - [`crd`]: Custom Resource Definitions
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod agent;
pub mod crd;
pub mod domain;
pub mod error;
pub mod hardware;
pub mod ledger;
pub mod placement;

// Re-export commonly used types
pub use agent::{
    Agent, AgentConfig, AgentMetrics, AgentState, ApiServerConfig, FileIntentSource,
    KubeIntentSource, PassReport, StaticIntentSource,
};

pub use crd::{
    NodePlacementStatus, PlacementPhase, StorageCluster, StorageClusterSpec,
    StorageClusterStatus,
};

pub use domain::model::{
    DeviceOsdIdEntry, DeviceOsdMapping, DirectoryMap, LocalDisk, OsdId, OsdSlot, PartitionRole,
    PartitionScheme, PartitionSchemeEntry, RemovedDirectoryMap, StoreConfig, StoreType,
};

pub use domain::ports::{BlockDeviceSource, CommandExecutor, IntentSource, KeyValueStore};

pub use error::{Error, ErrorAction, Result};

pub use hardware::{
    DeviceProber, HardwareScanner, ProbeConfig, ScannerConfig, ScriptedExecutor, SystemExecutor,
};

pub use ledger::{ConfigMapStore, FileStore, IdentityLedger, MemoryStore};

pub use placement::{
    resolve_store_config, DeviceFilter, DevicePlanner, DirectoryPlanner, NodeIntent, PlacementPlan,
    ReconcilePass, RemovedDeviceDetector,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
