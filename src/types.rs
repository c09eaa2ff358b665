//! Shared types for the CHANOPT service.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that connector, model,
//! and allocator modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// A marketing acquisition channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Search,
    Social,
    Email,
    Referral,
    Display,
    Organic,
}

impl Channel {
    /// All known channels (useful for iteration and one-hot layout).
    pub const ALL: &'static [Channel] = &[
        Channel::Search,
        Channel::Social,
        Channel::Email,
        Channel::Referral,
        Channel::Display,
        Channel::Organic,
    ];

    /// The spend class this channel's budget is drawn from.
    pub fn spend_class(&self) -> SpendClass {
        match self {
            Channel::Search | Channel::Social | Channel::Display => SpendClass::Advertising,
            Channel::Email | Channel::Referral | Channel::Organic => SpendClass::Organic,
        }
    }

    /// Position of this channel in `ALL` — used for one-hot encoding.
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|c| c == self).unwrap_or(0)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Search => write!(f, "search"),
            Channel::Social => write!(f, "social"),
            Channel::Email => write!(f, "email"),
            Channel::Referral => write!(f, "referral"),
            Channel::Display => write!(f, "display"),
            Channel::Organic => write!(f, "organic"),
        }
    }
}

/// Attempt to parse a string into a Channel (case-insensitive).
/// Accepts the groupings analytics APIs report for each channel.
impl std::str::FromStr for Channel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "search" | "paid search" | "paid_search" | "cpc" | "ppc" => Ok(Channel::Search),
            "social" | "paid social" | "paid_social" => Ok(Channel::Social),
            "email" | "newsletter" => Ok(Channel::Email),
            "referral" | "affiliate" | "affiliates" => Ok(Channel::Referral),
            "display" | "banner" | "retargeting" => Ok(Channel::Display),
            "organic" | "organic search" | "organic_search" | "direct" | "seo" => {
                Ok(Channel::Organic)
            }
            _ => Err(anyhow::anyhow!("Unknown channel: {s}")),
        }
    }
}

/// Budget class a channel draws spend from. Each class has its own
/// configured budget limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendClass {
    Advertising,
    Organic,
}

impl SpendClass {
    pub const ALL: &'static [SpendClass] = &[SpendClass::Advertising, SpendClass::Organic];
}

impl fmt::Display for SpendClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpendClass::Advertising => write!(f, "advertising"),
            SpendClass::Organic => write!(f, "organic"),
        }
    }
}

// ---------------------------------------------------------------------------
// Performance records
// ---------------------------------------------------------------------------

/// One row of marketing performance data fetched from an analytics source.
///
/// Records exist for the duration of a single optimization run and are
/// discarded once the response is returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel: Channel,
    pub clicks: u64,
    /// Attributed revenue in the account currency.
    pub revenue: f64,
    /// Source identifier: "google_analytics" | "mixpanel" | test doubles.
    pub source: String,
    pub fetched_at: DateTime<Utc>,
}

impl fmt::Display for ChannelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} clicks={} revenue=${:.2}",
            self.source, self.channel, self.clicks, self.revenue,
        )
    }
}

impl ChannelRecord {
    pub fn new(channel: Channel, clicks: u64, revenue: f64, source: &str) -> Self {
        Self {
            channel,
            clicks,
            revenue,
            source: source.to_string(),
            fetched_at: Utc::now(),
        }
    }

    /// Whether the row is usable as model input.
    pub fn is_valid(&self) -> bool {
        self.revenue.is_finite() && self.revenue >= 0.0
    }

    /// Revenue per click. Returns 0.0 for zero-click rows.
    pub fn revenue_per_click(&self) -> f64 {
        if self.clicks == 0 {
            0.0
        } else {
            self.revenue / self.clicks as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Model output
// ---------------------------------------------------------------------------

/// Per-channel revenue forecast produced by the trained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelForecast {
    pub channel: Channel,
    /// Model-predicted revenue for the channel's aggregate feature row.
    pub predicted_revenue: f64,
    pub observed_clicks: u64,
    pub observed_revenue: f64,
    /// Number of input rows contributing to this channel.
    pub samples: usize,
}

impl fmt::Display for ChannelForecast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: predicted=${:.2} observed=${:.2} ({} clicks, {} rows)",
            self.channel,
            self.predicted_revenue,
            self.observed_revenue,
            self.observed_clicks,
            self.samples,
        )
    }
}

/// Regression quality metrics, computed on the holdout set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r_squared: f64,
    pub train_rows: usize,
    pub eval_rows: usize,
    /// True when the dataset was too small to hold out an eval split and
    /// the metrics were computed on the training rows instead.
    pub in_sample: bool,
}

impl fmt::Display for ModelMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rmse={:.2} mae={:.2} r²={:.3} (train={} eval={}{})",
            self.rmse,
            self.mae,
            self.r_squared,
            self.train_rows,
            self.eval_rows,
            if self.in_sample { ", in-sample" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Allocations
// ---------------------------------------------------------------------------

/// Final budget assigned to a single channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub channel: Channel,
    pub class: SpendClass,
    /// Budget amount in the account currency, rounded to cents.
    pub amount: Decimal,
    /// Fraction of the class budget this channel received (0.0–1.0).
    pub share: f64,
    pub predicted_revenue: f64,
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: ${} ({:.1}% of class budget, predicted=${:.2})",
            self.channel,
            self.class,
            self.amount,
            self.share * 100.0,
            self.predicted_revenue,
        )
    }
}

// ---------------------------------------------------------------------------
// Analysis results
// ---------------------------------------------------------------------------

/// The analysis payload returned by `POST /optimize_channels` and pushed
/// to the external dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub model_performance: ModelMetrics,
    pub forecasts: Vec<ChannelForecast>,
    pub allocations: Vec<Allocation>,
}

impl AnalysisResults {
    /// Total allocated across all classes.
    pub fn total_allocated(&self) -> Decimal {
        self.allocations.iter().map(|a| a.amount).sum()
    }
}

// ---------------------------------------------------------------------------
// Service state
// ---------------------------------------------------------------------------

/// Service lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerStatus {
    Idle,
    Optimizing,
    /// Last run finished on partial data (one or more sources failed).
    Degraded,
}

impl fmt::Display for OptimizerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerStatus::Idle => write!(f, "IDLE"),
            OptimizerStatus::Optimizing => write!(f, "OPTIMIZING"),
            OptimizerStatus::Degraded => write!(f, "DEGRADED"),
        }
    }
}

/// Persistent service state, saved to disk after each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerState {
    pub runs_completed: u64,
    pub records_ingested: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub total_allocated_advertising: Decimal,
    pub total_allocated_organic: Decimal,
    /// Cumulative analytics API cost in the account currency.
    pub total_source_cost: Decimal,
    pub started_at: DateTime<Utc>,
    pub status: OptimizerStatus,
}

impl fmt::Display for OptimizerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | runs={} | records={} | allocated=${} adv / ${} org | source_cost=${}",
            self.status,
            self.runs_completed,
            self.records_ingested,
            self.total_allocated_advertising,
            self.total_allocated_organic,
            self.total_source_cost,
        )
    }
}

impl OptimizerState {
    pub fn new() -> Self {
        Self {
            runs_completed: 0,
            records_ingested: 0,
            last_run_at: None,
            total_allocated_advertising: Decimal::ZERO,
            total_allocated_organic: Decimal::ZERO,
            total_source_cost: Decimal::ZERO,
            started_at: Utc::now(),
            status: OptimizerStatus::Idle,
        }
    }

    /// Total allocated across both classes since the service started.
    pub fn total_allocated(&self) -> Decimal {
        self.total_allocated_advertising + self.total_allocated_organic
    }

    /// Fold a completed run into the cumulative state.
    pub fn record_run(
        &mut self,
        records: u64,
        advertising: Decimal,
        organic: Decimal,
        source_cost: Decimal,
        degraded: bool,
    ) {
        self.runs_completed += 1;
        self.records_ingested += records;
        self.total_allocated_advertising += advertising;
        self.total_allocated_organic += organic;
        self.total_source_cost += source_cost;
        self.last_run_at = Some(Utc::now());
        self.status = if degraded {
            OptimizerStatus::Degraded
        } else {
            OptimizerStatus::Idle
        };
    }

    /// Uptime duration since service start.
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

impl Default for OptimizerState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Summary of a single fetch → train → allocate → publish run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub records_fetched: usize,
    pub records_dropped: usize,
    pub sources_ok: usize,
    pub sources_failed: Vec<String>,
    pub channels_modeled: usize,
    pub metrics: ModelMetrics,
    pub allocations: usize,
    pub total_allocated: Decimal,
    pub source_cost: Decimal,
    pub duration_ms: u64,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run {}: records={} (dropped {}) channels={} allocations={} total=${} in {}ms",
            self.run_id,
            self.records_fetched,
            self.records_dropped,
            self.channels_modeled,
            self.allocations,
            self.total_allocated,
            self.duration_ms,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for CHANOPT.
#[derive(Debug, thiserror::Error)]
pub enum OptimizerError {
    #[error("Source error ({source}): {message}")]
    Source { source: String, message: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Insufficient data: need at least {needed} records, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("Dashboard error: {0}")]
    Dashboard(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
