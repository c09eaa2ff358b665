//! Persistence layer.
//!
//! Saves and loads cumulative service state to/from a JSON file.
//! Raw performance records are never persisted — they live for the
//! duration of a single run.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::types::OptimizerState;

/// Default state file path.
const DEFAULT_STATE_FILE: &str = "chanopt_state.json";

/// Save service state to a JSON file.
pub fn save_state(state: &OptimizerState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state)
        .context("Failed to serialise service state")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write state to {path}"))?;

    debug!(path, runs = state.runs_completed, "State saved");
    Ok(())
}

/// Load service state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<OptimizerState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read state from {path}"))?;

    let state: OptimizerState = serde_json::from_str(&json)
        .context(format!("Failed to parse state from {path}"))?;

    info!(
        path,
        runs = state.runs_completed,
        records = state.records_ingested,
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
