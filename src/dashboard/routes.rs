//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.
//! The optimizer sits behind an async mutex so concurrent optimize
//! requests queue instead of interleaving.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::error;

use crate::engine::{ChannelOptimizer, Reporter};
use crate::storage;
use crate::types::{Allocation, AnalysisResults, OptimizerState, OptimizerStatus, RunReport};

/// Run reports retained for the dashboard.
const RUN_LOG_CAP: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub optimizer: Mutex<ChannelOptimizer>,
    pub state: RwLock<OptimizerState>,
    pub latest: RwLock<Option<AnalysisResults>>,
    pub run_log: RwLock<Vec<RunReport>>,
    /// Where cumulative state is persisted after each run. None disables
    /// persistence (tests).
    pub state_path: Option<String>,
}

impl DashboardState {
    pub fn new(
        optimizer: ChannelOptimizer,
        initial_state: OptimizerState,
        state_path: Option<String>,
    ) -> Self {
        Self {
            optimizer: Mutex::new(optimizer),
            state: RwLock::new(initial_state),
            latest: RwLock::new(None),
            run_log: RwLock::new(Vec::new()),
            state_path,
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeResponse {
    pub status: String,
    pub results: AnalysisResults,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub runs_completed: u64,
    pub records_ingested: u64,
    pub last_run_at: Option<String>,
    pub total_allocated_advertising: f64,
    pub total_allocated_organic: f64,
    pub total_source_cost: f64,
    pub uptime_secs: i64,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// POST /optimize_channels
///
/// Triggers one optimization run. The request body is ignored — the run
/// is configured entirely by the service config.
pub async fn optimize_channels(
    State(app): State<AppState>,
) -> Result<Json<OptimizeResponse>, (StatusCode, Json<ErrorResponse>)> {
    // Serialize runs: concurrent POSTs wait here.
    let mut optimizer = app.optimizer.lock().await;

    {
        let mut state = app.state.write().await;
        state.status = OptimizerStatus::Optimizing;
    }

    let artifacts = match optimizer.run_once().await {
        Ok(artifacts) => artifacts,
        Err(e) => {
            error!(error = %e, "Optimization run failed");
            let mut state = app.state.write().await;
            state.status = OptimizerStatus::Idle;
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    status: "error".to_string(),
                    message: e.to_string(),
                }),
            ));
        }
    };

    let report = {
        let mut state = app.state.write().await;
        let report = Reporter::reconcile(&mut state, &artifacts);
        if let Some(path) = &app.state_path {
            if let Err(e) = storage::save_state(&state, Some(path)) {
                error!(error = %e, "Failed to save state");
            }
        }
        report
    };

    {
        let mut log = app.run_log.write().await;
        log.push(report);
        if log.len() > RUN_LOG_CAP {
            let excess = log.len() - RUN_LOG_CAP;
            log.drain(..excess);
        }
    }

    let results = artifacts.analysis;
    *app.latest.write().await = Some(results.clone());

    Ok(Json(OptimizeResponse {
        status: "success".to_string(),
        results,
    }))
}

/// GET /api/status
pub async fn get_status(State(app): State<AppState>) -> Json<StatusResponse> {
    use rust_decimal::prelude::ToPrimitive;

    let state = app.state.read().await;
    Json(StatusResponse {
        status: format!("{}", state.status),
        runs_completed: state.runs_completed,
        records_ingested: state.records_ingested,
        last_run_at: state.last_run_at.map(|t| t.to_rfc3339()),
        total_allocated_advertising: state.total_allocated_advertising.to_f64().unwrap_or(0.0),
        total_allocated_organic: state.total_allocated_organic.to_f64().unwrap_or(0.0),
        total_source_cost: state.total_source_cost.to_f64().unwrap_or(0.0),
        uptime_secs: state.uptime().num_seconds(),
    })
}

/// GET /api/allocations — the latest run's allocations.
pub async fn get_allocations(State(app): State<AppState>) -> Json<Vec<Allocation>> {
    let latest = app.latest.read().await;
    Json(
        latest
            .as_ref()
            .map(|a| a.allocations.clone())
            .unwrap_or_default(),
    )
}

/// GET /api/runs — recent run reports, oldest first.
pub async fn get_runs(State(app): State<AppState>) -> Json<Vec<RunReport>> {
    let log = app.run_log.read().await;
    Json(log.clone())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
