//! Node Agent - The reconcile loop
//!
//! Runs a placement pass for the local node on a fixed interval:
//! - load the StorageCluster and resolve this node's intent
//! - enumerate the node's block devices
//! - plan devices and directories against the identity ledger
//! - publish the plan for the API and report status back
//!
//! Failed passes are retried according to the error's [`ErrorAction`].

use super::metrics::AgentMetrics;
use crate::crd::{NodePlacementStatus, PlacementPhase};
use crate::domain::ports::{BlockDeviceSourceRef, CommandExecutorRef, IntentSourceRef};
use crate::error::{Error, ErrorAction, Result};
use crate::hardware::probe::ProbeConfig;
use crate::ledger::IdentityLedger;
use crate::placement::{PlacementPlan, ReconcilePass};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =============================================================================
// Agent Configuration
// =============================================================================

/// Configuration for the node agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Name of the node this agent owns
    pub node_name: String,
    /// Delay between successful passes
    pub interval: Duration,
    /// First retry delay after a transient failure
    pub initial_backoff: Duration,
    /// Upper bound on retry delays
    pub max_backoff: Duration,
    /// Device probe settings
    pub probe: ProbeConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: String::new(),
            interval: Duration::from_secs(60),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
            probe: ProbeConfig::default(),
        }
    }
}

// =============================================================================
// Published State
// =============================================================================

/// Outcome of the last successful pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub plan: PlacementPlan,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// State shared between the loop and the API
#[derive(Debug, Default)]
pub struct AgentState {
    last_report: RwLock<Option<PassReport>>,
    last_error: RwLock<Option<String>>,
}

impl AgentState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn last_report(&self) -> Option<PassReport> {
        self.last_report.read().await.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Ready once a pass has succeeded
    pub async fn is_ready(&self) -> bool {
        self.last_report.read().await.is_some()
    }

    pub(crate) async fn publish(&self, report: PassReport) {
        *self.last_report.write().await = Some(report);
        *self.last_error.write().await = None;
    }

    pub(crate) async fn record_error(&self, err: &Error) {
        *self.last_error.write().await = Some(err.to_string());
    }

    /// Drop the published plan; the node no longer has one
    pub(crate) async fn withdraw(&self, err: &Error) {
        *self.last_report.write().await = None;
        *self.last_error.write().await = Some(err.to_string());
    }
}

// =============================================================================
// Agent
// =============================================================================

/// Reconciles storage placement for one node
pub struct Agent {
    config: AgentConfig,
    intent: IntentSourceRef,
    ledger: IdentityLedger,
    executor: CommandExecutorRef,
    devices: BlockDeviceSourceRef,
    metrics: Arc<AgentMetrics>,
    state: Arc<AgentState>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        intent: IntentSourceRef,
        ledger: IdentityLedger,
        executor: CommandExecutorRef,
        devices: BlockDeviceSourceRef,
        metrics: Arc<AgentMetrics>,
    ) -> Self {
        Self {
            config,
            intent,
            ledger,
            executor,
            devices,
            metrics,
            state: AgentState::new(),
        }
    }

    pub fn state(&self) -> Arc<AgentState> {
        self.state.clone()
    }

    pub fn metrics(&self) -> Arc<AgentMetrics> {
        self.metrics.clone()
    }

    /// Run passes until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            node = %self.config.node_name,
            intent = %self.intent.describe(),
            ledger = self.ledger.backend_name(),
            "starting placement agent"
        );
        let mut backoff = self.new_backoff();

        loop {
            let delay = match self.run_pass().await {
                Ok(_) => {
                    backoff.reset();
                    self.config.interval
                }
                Err(e) => {
                    if let Error::NodeNotInScope { node } = &e {
                        info!(node = %node, "node not selected by storage intent, skipping pass");
                    }
                    self.retry_delay(&e, &mut backoff)
                }
            };

            debug!(delay_ms = delay.as_millis() as u64, "next pass scheduled");
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("placement agent stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Run a single pass and publish its plan
    pub async fn run_pass(&self) -> Result<PassReport> {
        let started = Instant::now();
        self.metrics.passes_total.inc();

        let result = self.plan().await;
        let elapsed = started.elapsed();
        self.metrics
            .pass_duration_seconds
            .observe(elapsed.as_secs_f64());

        match result {
            Ok(plan) => {
                self.metrics.observe_plan(&plan);
                let report = PassReport {
                    plan,
                    completed_at: Utc::now(),
                    duration_ms: elapsed.as_millis() as u64,
                };
                self.report_status(planned_status(&report)).await;
                self.state.publish(report.clone()).await;
                Ok(report)
            }
            Err(e @ Error::NodeNotInScope { .. }) => {
                self.state.withdraw(&e).await;
                Err(e)
            }
            Err(e) => {
                self.metrics.pass_failures_total.inc();
                error!(node = %self.config.node_name, error = %e, action = ?e.action(), "placement pass failed");
                self.state.record_error(&e).await;
                self.report_status(NodePlacementStatus {
                    phase: PlacementPhase::Failed,
                    message: Some(e.to_string()),
                    last_pass_time: Some(Utc::now()),
                    ..Default::default()
                })
                .await;
                Err(e)
            }
        }
    }

    async fn plan(&self) -> Result<PlacementPlan> {
        let cluster = self.intent.load().await?;
        let intent = cluster.spec.require_node_intent(&self.config.node_name)?;
        let disks = self.devices.list_disks().await?;
        debug!(
            node = %intent.node_id,
            disks = disks.len(),
            filter = %intent.device_filter,
            directories = %intent.directories,
            "running placement pass"
        );

        ReconcilePass::new(&self.ledger, self.executor.as_ref(), &self.config.probe)
            .run(&intent, &disks)
            .await
    }

    async fn report_status(&self, status: NodePlacementStatus) {
        if let Err(e) = self.intent.report(&self.config.node_name, &status).await {
            warn!(node = %self.config.node_name, error = %e, "failed to report node status");
        }
    }

    fn new_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            current_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Delay before the next pass after a failure
    fn retry_delay(&self, err: &Error, backoff: &mut ExponentialBackoff) -> Duration {
        match err.action() {
            ErrorAction::RequeueWithBackoff => backoff
                .next_backoff()
                .unwrap_or(self.config.max_backoff),
            ErrorAction::RequeueAfter(delay) => delay,
            ErrorAction::NoRequeue => self.config.interval,
        }
    }
}

fn planned_status(report: &PassReport) -> NodePlacementStatus {
    let plan = &report.plan;
    NodePlacementStatus {
        phase: PlacementPhase::Planned,
        message: None,
        last_pass_time: Some(report.completed_at),
        devices: plan.devices.len() as u32,
        directories: plan.directories.len() as u32,
        pending_removals: (plan.removed_devices.len() + plan.removed_directories.len()) as u32,
    }
}
