//! Node Agent
//!
//! The long-running side of the crate: intent sources, the reconcile loop,
//! its metrics and the HTTP API.

pub mod api;
pub mod intent;
pub mod metrics;
pub mod runner;

pub use api::{router, serve, ApiServerConfig};
pub use intent::{FileIntentSource, KubeIntentSource, StaticIntentSource};
pub use metrics::AgentMetrics;
pub use runner::{Agent, AgentConfig, AgentState, PassReport};
