//! Placement Planning
//!
//! Turns a node's storage intent, its probed block devices and the identity
//! ledger into a [`PlacementPlan`].

pub mod config;
pub mod devices;
pub mod directories;
pub mod pass;
pub mod removed;

pub use config::{merge_config, resolve_store_config};
pub use devices::{DeviceFilter, DevicePlan, DevicePlanner, FILTER_ALL};
pub use directories::{desired_paths, DirectoryPlan, DirectoryPlanner};
pub use pass::{NodeIntent, PlacementPlan, ReconcilePass};
pub use removed::{removed_from_scheme, RemovedDeviceDetector, RemovedDevices};
