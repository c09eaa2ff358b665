//! External dashboard connector.
//!
//! Pushes the allocation payload to a configured webhook after each run.
//! The push is best effort: the optimizer logs failures and moves on, so
//! an unreachable dashboard never fails an optimization run.

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::types::AnalysisResults;

/// Payload posted to the external dashboard.
#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    updated_at: String,
    model_performance: &'a crate::types::ModelMetrics,
    allocations: &'a [crate::types::Allocation],
}

pub struct DashboardPusher {
    http: Client,
    push_url: Option<String>,
    token: Option<String>,
}

impl DashboardPusher {
    pub fn new(push_url: Option<String>, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("CHANOPT/0.1.0")
            .build()
            .context("Failed to build dashboard HTTP client")?;
        Ok(Self {
            http,
            push_url,
            token,
        })
    }

    /// A pusher with no webhook configured — `publish` is a no-op.
    pub fn disabled() -> Self {
        Self {
            http: Client::new(),
            push_url: None,
            token: None,
        }
    }

    /// Whether a webhook URL is configured.
    pub fn is_enabled(&self) -> bool {
        self.push_url.is_some()
    }

    /// Push the analysis payload to the webhook, if one is configured.
    pub async fn publish(&self, analysis: &AnalysisResults) -> Result<()> {
        let Some(url) = &self.push_url else {
            debug!("No dashboard webhook configured — skipping push");
            return Ok(());
        };

        let payload = PushPayload {
            updated_at: Utc::now().to_rfc3339(),
            model_performance: &analysis.model_performance,
            allocations: &analysis.allocations,
        };

        let mut request = self.http.post(url).json(&payload);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let resp = request
            .send()
            .await
            .context("Dashboard webhook request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Dashboard webhook returned {status}");
        }

        info!(
            url = %url,
            allocations = analysis.allocations.len(),
            "Dashboard updated"
        );

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
