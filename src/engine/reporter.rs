//! Run reconciliation.
//!
//! Folds a completed run's artifacts into the cumulative service state
//! and produces the per-run report served by the dashboard.

use chrono::Utc;
use tracing::info;

use super::optimizer::RunArtifacts;
use crate::types::{OptimizerState, RunReport, SpendClass};

pub struct Reporter;

impl Reporter {
    /// Reconcile a run: update cumulative state and build the report.
    pub fn reconcile(state: &mut OptimizerState, artifacts: &RunArtifacts) -> RunReport {
        let advertising = artifacts.plan.class_total(SpendClass::Advertising);
        let organic = artifacts.plan.class_total(SpendClass::Organic);

        state.record_run(
            artifacts.collect.records.len() as u64,
            advertising,
            organic,
            artifacts.collect.cost,
            artifacts.degraded(),
        );

        let report = RunReport {
            run_id: artifacts.run_id.clone(),
            timestamp: Utc::now(),
            records_fetched: artifacts.collect.records.len(),
            records_dropped: artifacts.collect.dropped,
            sources_ok: artifacts.collect.sources_ok,
            sources_failed: artifacts.collect.sources_failed.clone(),
            channels_modeled: artifacts.analysis.forecasts.len(),
            metrics: artifacts.analysis.model_performance.clone(),
            allocations: artifacts.analysis.allocations.len(),
            total_allocated: artifacts.analysis.total_allocated(),
            source_cost: artifacts.collect.cost,
            duration_ms: artifacts.duration_ms,
        };

        info!(
            run = %report.run_id,
            runs_completed = state.runs_completed,
            total_allocated = %report.total_allocated,
            status = %state.status,
            "Run reconciled"
        );

        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
