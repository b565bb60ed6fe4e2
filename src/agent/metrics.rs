//! Agent Metrics
//!
//! Prometheus metrics for reconcile passes, kept in the agent's own registry
//! and rendered in the text exposition format by the API.

use crate::error::{Error, Result};
use crate::placement::PlacementPlan;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

const NAMESPACE: &str = "storage_agent";

/// Metrics for reconcile passes
pub struct AgentMetrics {
    registry: Registry,
    pub passes_total: IntCounter,
    pub pass_failures_total: IntCounter,
    pub pass_duration_seconds: Histogram,
    pub eligible_devices: IntGauge,
    pub planned_directories: IntGauge,
    pub removed_directories: IntGauge,
    pub removed_devices: IntGauge,
}

impl AgentMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let passes_total = IntCounter::new(
            format!("{}_passes_total", NAMESPACE),
            "Reconcile passes attempted",
        )
        .map_err(metrics_error)?;
        let pass_failures_total = IntCounter::new(
            format!("{}_pass_failures_total", NAMESPACE),
            "Reconcile passes that failed",
        )
        .map_err(metrics_error)?;
        let pass_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            format!("{}_pass_duration_seconds", NAMESPACE),
            "Duration of reconcile passes",
        ))
        .map_err(metrics_error)?;
        let eligible_devices = IntGauge::new(
            format!("{}_eligible_devices", NAMESPACE),
            "Devices selected and eligible in the last plan",
        )
        .map_err(metrics_error)?;
        let planned_directories = IntGauge::new(
            format!("{}_planned_directories", NAMESPACE),
            "Directories in the last plan",
        )
        .map_err(metrics_error)?;
        let removed_directories = IntGauge::new(
            format!("{}_removed_directories", NAMESPACE),
            "Directories pending teardown in the last plan",
        )
        .map_err(metrics_error)?;
        let removed_devices = IntGauge::new(
            format!("{}_removed_devices", NAMESPACE),
            "Devices pending teardown in the last plan",
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(passes_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(pass_failures_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(pass_duration_seconds.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(eligible_devices.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(planned_directories.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(removed_directories.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(removed_devices.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            passes_total,
            pass_failures_total,
            pass_duration_seconds,
            eligible_devices,
            planned_directories,
            removed_directories,
            removed_devices,
        })
    }

    /// Update the plan gauges
    pub fn observe_plan(&self, plan: &PlacementPlan) {
        self.eligible_devices.set(plan.devices.len() as i64);
        self.planned_directories.set(plan.directories.len() as i64);
        self.removed_directories
            .set(plan.removed_directories.len() as i64);
        self.removed_devices.set(plan.removed_devices.len() as i64);
    }

    /// Render all metrics in the text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{DeviceOsdIdEntry, OsdId, OsdSlot};

    #[test]
    fn test_render_after_pass() {
        let metrics = AgentMetrics::new().unwrap();
        metrics.passes_total.inc();
        metrics.pass_duration_seconds.observe(0.25);

        let mut plan = PlacementPlan::default();
        plan.devices.insert("sda", DeviceOsdIdEntry::unassigned());
        plan.devices.insert("sdb", DeviceOsdIdEntry::unassigned());
        plan.directories.insert("/rook/dir1".into(), OsdSlot::Assigned(OsdId(1)));
        plan.removed_directories.insert("/var/lib/rook".into(), OsdId(0));
        metrics.observe_plan(&plan);

        let text = metrics.render().unwrap();
        assert!(text.contains("storage_agent_passes_total 1"));
        assert!(text.contains("storage_agent_eligible_devices 2"));
        assert!(text.contains("storage_agent_planned_directories 1"));
        assert!(text.contains("storage_agent_removed_directories 1"));
        assert!(text.contains("storage_agent_pass_duration_seconds_count 1"));
    }

    #[test]
    fn test_registries_are_independent() {
        let a = AgentMetrics::new().unwrap();
        let b = AgentMetrics::new().unwrap();
        a.pass_failures_total.inc();
        assert!(b.render().unwrap().contains("storage_agent_pass_failures_total 0"));
    }
}
