//! Google Analytics data source.
//!
//! Pulls per-channel sessions and revenue from the GA4 Data API
//! (`runReport`), grouped by the session default channel grouping.
//!
//! API: `https://analyticsdata.googleapis.com/v1beta/{property}:runReport`
//! Auth: OAuth bearer token (read from the env var named in config).
//! Rate limit: generous on the core quota tier.
//!
//! Without a token the source returns a small documented sample frame so
//! the rest of the pipeline stays exercisable in development.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AnalyticsSource;
use crate::types::{Channel, ChannelRecord};

const GA_API_BASE: &str = "https://analyticsdata.googleapis.com/v1beta";

pub const SOURCE_NAME: &str = "google_analytics";

// ---------------------------------------------------------------------------
// GA4 Data API request/response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReportRequest {
    date_ranges: Vec<DateRange>,
    dimensions: Vec<Dimension>,
    metrics: Vec<Metric>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DateRange {
    start_date: String,
    end_date: String,
}

#[derive(Debug, Serialize)]
struct Dimension {
    name: String,
}

#[derive(Debug, Serialize)]
struct Metric {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RunReportResponse {
    #[serde(default)]
    rows: Vec<ReportRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportRow {
    #[serde(default)]
    dimension_values: Vec<ReportValue>,
    #[serde(default)]
    metric_values: Vec<ReportValue>,
}

#[derive(Debug, Deserialize)]
struct ReportValue {
    #[serde(default)]
    value: String,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct GoogleAnalyticsSource {
    http: Client,
    property_id: String,
    access_token: Option<String>,
    lookback_days: u32,
}

impl GoogleAnalyticsSource {
    pub fn new(
        property_id: &str,
        access_token: Option<String>,
        lookback_days: u32,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("CHANOPT/0.1.0")
            .build()
            .context("Failed to build Google Analytics HTTP client")?;
        Ok(Self {
            http,
            property_id: property_id.to_string(),
            access_token,
            lookback_days,
        })
    }

    /// Convert one GA report row into a record.
    ///
    /// Expects dimension 0 = channel grouping, metric 0 = sessions,
    /// metric 1 = totalRevenue. Unknown channel groupings are skipped.
    fn parse_row(row: &ReportRow) -> Option<ChannelRecord> {
        let grouping = row.dimension_values.first()?.value.as_str();
        let channel: Channel = match grouping.parse() {
            Ok(c) => c,
            Err(_) => {
                debug!(grouping, "Skipping unmapped GA channel grouping");
                return None;
            }
        };

        let clicks = row
            .metric_values
            .first()
            .and_then(|v| v.value.parse::<f64>().ok())
            .unwrap_or(0.0) as u64;
        let revenue = row
            .metric_values
            .get(1)
            .and_then(|v| v.value.parse::<f64>().ok())
            .unwrap_or(0.0);

        Some(ChannelRecord::new(channel, clicks, revenue, SOURCE_NAME))
    }

    async fn run_report(&self, token: &str) -> Result<Vec<ChannelRecord>> {
        let url = format!("{GA_API_BASE}/{}:runReport", self.property_id);
        let request = RunReportRequest {
            date_ranges: vec![DateRange {
                start_date: format!("{}daysAgo", self.lookback_days),
                end_date: "today".to_string(),
            }],
            dimensions: vec![Dimension {
                name: "sessionDefaultChannelGroup".to_string(),
            }],
            metrics: vec![
                Metric {
                    name: "sessions".to_string(),
                },
                Metric {
                    name: "totalRevenue".to_string(),
                },
            ],
        };

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {token}"))
            .json(&request)
            .send()
            .await
            .context("GA4 runReport request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("GA4 Data API error: {status}");
        }

        let data: RunReportResponse = resp
            .json()
            .await
            .context("Failed to parse GA4 runReport response")?;

        let records: Vec<ChannelRecord> =
            data.rows.iter().filter_map(Self::parse_row).collect();

        debug!(
            rows = data.rows.len(),
            mapped = records.len(),
            "GA4 report fetched"
        );

        Ok(records)
    }

    /// Sample frame used when no access token is configured.
    fn sample_frame() -> Vec<ChannelRecord> {
        vec![
            ChannelRecord::new(Channel::Search, 100, 500.0, SOURCE_NAME),
            ChannelRecord::new(Channel::Social, 200, 700.0, SOURCE_NAME),
        ]
    }
}

#[async_trait]
impl AnalyticsSource for GoogleAnalyticsSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_performance(&self) -> Result<Vec<ChannelRecord>> {
        match &self.access_token {
            Some(token) => self.run_report(token).await,
            None => {
                warn!("No GA access token configured — returning sample frame");
                Ok(Self::sample_frame())
            }
        }
    }

    fn cost_per_call(&self) -> Decimal {
        Decimal::ZERO // GA4 Data API has no per-call charge
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
