//! Custom Resource Definitions
//!
//! - StorageCluster: cluster-wide and per-node storage selection

pub mod storage_cluster;

pub use storage_cluster::*;
