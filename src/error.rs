//! Error types for the Smart Storage Agent
//!
//! Provides structured error types for all agent components including
//! the identity ledger, device probing, intent resolution and the agent loop.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the agent
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Kubernetes Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    // =========================================================================
    // Ledger Errors
    // =========================================================================
    #[error("Ledger store {store} unavailable: {reason}")]
    LedgerUnavailable { store: String, reason: String },

    #[error("Ledger store {store} key {key} is corrupt: {reason}")]
    LedgerCorrupt {
        store: String,
        key: String,
        reason: String,
    },

    #[error("Refusing to persist unassigned location {location}")]
    UnassignedIdentity { location: String },

    // =========================================================================
    // Device Probe Errors
    // =========================================================================
    #[error("Probe command failed: {command} {args:?} - {reason}")]
    ProbeCommand {
        command: String,
        args: Vec<String>,
        reason: String,
    },

    #[error("Unrecognized output from {command} {args:?}: {output:?}")]
    UnexpectedProbeOutput {
        command: String,
        args: Vec<String>,
        output: String,
    },

    #[error("Invalid device filter {filter:?}: {reason}")]
    InvalidDeviceFilter { filter: String, reason: String },

    #[error("Hardware discovery failed: {0}")]
    HardwareDiscovery(String),

    // =========================================================================
    // Intent Errors
    // =========================================================================
    #[error("Node {node} is not selected by the storage intent")]
    NodeNotInScope { node: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Action to take on error during a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Requeue with exponential backoff
    RequeueWithBackoff,
    /// Requeue after specific duration
    RequeueAfter(Duration),
    /// Don't requeue, wait for the next scheduled pass
    NoRequeue,
}

impl Error {
    /// Determine what action to take for this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Kube(_)
            | Error::LedgerUnavailable { .. }
            | Error::ProbeCommand { .. }
            | Error::Io(_) => ErrorAction::RequeueWithBackoff,

            // Intent may not exist yet - wait for it to be created
            Error::ResourceNotFound { .. } | Error::NodeNotInScope { .. } => {
                ErrorAction::RequeueAfter(Duration::from_secs(60))
            }

            // Configuration/data errors - don't retry automatically
            Error::Configuration(_)
            | Error::InvalidDeviceFilter { .. }
            | Error::LedgerCorrupt { .. }
            | Error::UnassignedIdentity { .. }
            | Error::YamlParse(_) => ErrorAction::NoRequeue,

            // All other errors - retry with backoff
            _ => ErrorAction::RequeueWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::NoRequeue)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Kube(_)
                | Error::LedgerUnavailable { .. }
                | Error::ProbeCommand { .. }
                | Error::Io(_)
        )
    }
}

/// Result type alias for the agent
pub type Result<T> = std::result::Result<T, Error>;
