//! Mock analytics source for integration testing.
//!
//! Provides a deterministic `AnalyticsSource` implementation that
//! returns known performance frames and tracks fetch calls — all
//! in-memory with no external dependencies.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chanopt::connectors::AnalyticsSource;
use chanopt::types::{Channel, ChannelRecord};

/// A deterministic analytics source for testing.
///
/// All state is in-memory. Frames and failure behaviour are fully
/// controllable from test code.
pub struct MockSource {
    name: String,
    records: Vec<ChannelRecord>,
    fetch_count: Arc<AtomicU64>,
    /// If set, all fetches will return this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockSource {
    /// Create a mock with the default two-row frame for this source name.
    pub fn new(name: &str, records: Vec<ChannelRecord>) -> Self {
        Self {
            name: name.to_string(),
            records,
            fetch_count: Arc::new(AtomicU64::new(0)),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// A mock that mirrors the Google Analytics sample frame.
    pub fn ga_like() -> Self {
        Self::new(
            "google_analytics",
            vec![
                ChannelRecord::new(Channel::Search, 100, 500.0, "google_analytics"),
                ChannelRecord::new(Channel::Social, 200, 700.0, "google_analytics"),
            ],
        )
    }

    /// A mock that mirrors the Mixpanel sample frame.
    pub fn mixpanel_like() -> Self {
        Self::new(
            "mixpanel",
            vec![
                ChannelRecord::new(Channel::Email, 80, 400.0, "mixpanel"),
                ChannelRecord::new(Channel::Referral, 150, 600.0, "mixpanel"),
            ],
        )
    }

    /// Force all subsequent fetches to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Handle to the fetch counter (survives moving the mock into a
    /// collector).
    pub fn fetch_counter(&self) -> Arc<AtomicU64> {
        self.fetch_count.clone()
    }
}

#[async_trait]
impl AnalyticsSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_performance(&self) -> Result<Vec<ChannelRecord>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            anyhow::bail!("{msg}");
        }
        Ok(self.records.clone())
    }

    fn cost_per_call(&self) -> Decimal {
        Decimal::ZERO
    }
}
