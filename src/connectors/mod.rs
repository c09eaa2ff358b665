//! Analytics source connectors.
//!
//! Defines the `AnalyticsSource` trait and provides implementations for
//! fetching marketing performance data from external analytics APIs.

pub mod collector;
pub mod google_analytics;
pub mod mixpanel;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::types::ChannelRecord;

pub use collector::{CollectReport, Collector};

/// Abstraction over external analytics sources.
///
/// Each source fetches per-channel performance rows (clicks and attributed
/// revenue) over the configured lookback window.
#[async_trait]
pub trait AnalyticsSource: Send + Sync {
    /// Source name for logging and record attribution.
    fn name(&self) -> &str;

    /// Fetch per-channel performance rows.
    async fn fetch_performance(&self) -> Result<Vec<ChannelRecord>>;

    /// Cost per API call in the account currency (for run accounting).
    fn cost_per_call(&self) -> Decimal;
}
