//! Run orchestration.
//!
//! Pipelines a single optimization run: collect performance data from
//! all sources, fit the revenue model, plan the budget allocation, and
//! publish the result to the external dashboard. Each stage is logged;
//! a failed webhook push degrades to a warning and never fails the run.

use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::allocator::{AllocationPlan, AllocationPlanner};
use crate::connectors::{CollectReport, Collector};
use crate::dashboard::push::DashboardPusher;
use crate::model::{TrainOutcome, Trainer};
use crate::types::AnalysisResults;

/// Everything a completed run produces, before state reconciliation.
#[derive(Debug)]
pub struct RunArtifacts {
    pub run_id: String,
    pub collect: CollectReport,
    pub analysis: AnalysisResults,
    pub plan: AllocationPlan,
    pub duration_ms: u64,
}

impl RunArtifacts {
    /// Whether the run completed on partial source data.
    pub fn degraded(&self) -> bool {
        self.collect.is_partial()
    }
}

/// Orchestrates the optimization pipeline.
///
/// Instantiate once per service; `run_once` performs one full pass.
/// Callers are expected to serialize runs (the dashboard layer holds
/// the optimizer behind a mutex).
pub struct ChannelOptimizer {
    collector: Collector,
    trainer: Trainer,
    planner: AllocationPlanner,
    pusher: DashboardPusher,
}

impl ChannelOptimizer {
    pub fn new(
        collector: Collector,
        trainer: Trainer,
        planner: AllocationPlanner,
        pusher: DashboardPusher,
    ) -> Self {
        Self {
            collector,
            trainer,
            planner,
            pusher,
        }
    }

    /// Run a single collect → train → allocate → publish pass.
    pub async fn run_once(&mut self) -> Result<RunArtifacts> {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        info!(run_id = %run_id, "Starting optimization run");

        // 1. Fetch performance data
        let collect = self
            .collector
            .collect()
            .await
            .context("Data collection failed")?;
        info!(
            records = collect.records.len(),
            sources_ok = collect.sources_ok,
            "Performance data collected"
        );

        // 2. Preprocess and fit the revenue model
        let TrainOutcome {
            model: _,
            metrics,
            forecasts,
        } = self
            .trainer
            .train(&collect.records)
            .context("Model training failed")?;

        // 3. Plan budget allocations from the forecasts
        let plan = self.planner.plan(&forecasts);

        let analysis = AnalysisResults {
            model_performance: metrics,
            forecasts,
            allocations: plan.allocations.clone(),
        };

        // 4. Publish to the external dashboard (best effort)
        if let Err(e) = self.pusher.publish(&analysis).await {
            warn!(error = %e, "Dashboard push failed — continuing");
        }

        let artifacts = RunArtifacts {
            run_id,
            collect,
            analysis,
            plan,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            run_id = %artifacts.run_id,
            allocations = artifacts.analysis.allocations.len(),
            total = %artifacts.analysis.total_allocated(),
            degraded = artifacts.degraded(),
            duration_ms = artifacts.duration_ms,
            "Optimization run complete"
        );

        Ok(artifacts)
    }

    /// Access the collector's accounting (for monitoring endpoints).
    pub fn collector(&self) -> &Collector {
        &self.collector
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
