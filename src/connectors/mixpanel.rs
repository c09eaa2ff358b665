//! Mixpanel data source.
//!
//! Pulls per-channel click counts and revenue from the Mixpanel query API
//! (segmentation endpoints), segmented on the `channel` event property.
//!
//! API: `https://mixpanel.com/api/query/segmentation` (counts) and
//!      `https://mixpanel.com/api/query/segmentation/sum` (revenue).
//! Auth: service-account basic auth, `username:secret` read from the env
//! var named in config.
//! Rate limit: 60 queries/hour on the free plan — the collector's cache
//! keeps traffic well under that.
//!
//! Without credentials the source returns a small documented sample frame
//! so the rest of the pipeline stays exercisable in development.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::AnalyticsSource;
use crate::types::{Channel, ChannelRecord};

const MIXPANEL_API_BASE: &str = "https://mixpanel.com/api/query";

/// Event counted as a click for performance purposes.
const CLICK_EVENT: &str = "campaign_click";
/// Event whose `revenue` property is summed per channel.
const PURCHASE_EVENT: &str = "purchase";

pub const SOURCE_NAME: &str = "mixpanel";

// ---------------------------------------------------------------------------
// Query API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SegmentationResponse {
    #[serde(default)]
    data: SegmentationData,
}

#[derive(Debug, Deserialize, Default)]
struct SegmentationData {
    /// Segment value → date → count.
    #[serde(default)]
    values: HashMap<String, HashMap<String, f64>>,
}

#[derive(Debug, Deserialize)]
struct SegmentationSumResponse {
    /// Segment value → date → summed property.
    #[serde(default)]
    results: HashMap<String, HashMap<String, f64>>,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct MixpanelSource {
    http: Client,
    project_id: String,
    /// (username, secret) parsed from the service account credential.
    credentials: Option<(String, String)>,
    lookback_days: u32,
}

impl MixpanelSource {
    pub fn new(
        project_id: &str,
        service_account: Option<String>,
        lookback_days: u32,
    ) -> Result<Self> {
        let credentials = match service_account {
            Some(raw) => Some(Self::parse_credentials(&raw)?),
            None => None,
        };
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("CHANOPT/0.1.0")
            .build()
            .context("Failed to build Mixpanel HTTP client")?;
        Ok(Self {
            http,
            project_id: project_id.to_string(),
            credentials,
            lookback_days,
        })
    }

    /// Split a `username:secret` service-account credential.
    fn parse_credentials(raw: &str) -> Result<(String, String)> {
        match raw.split_once(':') {
            Some((user, secret)) if !user.is_empty() && !secret.is_empty() => {
                Ok((user.to_string(), secret.to_string()))
            }
            _ => anyhow::bail!("Mixpanel service account must be in username:secret form"),
        }
    }

    /// Sum a segment's date series and map the segment key to a channel.
    /// Unknown segment values are skipped.
    fn fold_series(values: &HashMap<String, HashMap<String, f64>>) -> HashMap<Channel, f64> {
        let mut totals: HashMap<Channel, f64> = HashMap::new();
        for (segment, by_date) in values {
            let channel: Channel = match segment.parse() {
                Ok(c) => c,
                Err(_) => {
                    debug!(segment, "Skipping unmapped Mixpanel segment");
                    continue;
                }
            };
            *totals.entry(channel).or_insert(0.0) += by_date.values().sum::<f64>();
        }
        totals
    }

    fn date_window(&self) -> (String, String) {
        let to = Utc::now().date_naive();
        let from = to - Duration::days(self.lookback_days as i64);
        (from.format("%Y-%m-%d").to_string(), to.format("%Y-%m-%d").to_string())
    }

    /// Per-channel click counts from the segmentation endpoint.
    async fn fetch_clicks(&self, user: &str, secret: &str) -> Result<HashMap<Channel, f64>> {
        let (from, to) = self.date_window();
        let url = format!(
            "{MIXPANEL_API_BASE}/segmentation?project_id={}&event={}&on={}&from_date={from}&to_date={to}&unit=day",
            self.project_id,
            urlencoding::encode(CLICK_EVENT),
            urlencoding::encode("properties[\"channel\"]"),
        );

        let resp = self
            .http
            .get(&url)
            .basic_auth(user, Some(secret))
            .send()
            .await
            .context("Mixpanel segmentation request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Mixpanel query API error: {status}");
        }

        let data: SegmentationResponse = resp
            .json()
            .await
            .context("Failed to parse Mixpanel segmentation response")?;

        Ok(Self::fold_series(&data.data.values))
    }

    /// Per-channel revenue sums from the segmentation/sum endpoint.
    async fn fetch_revenue(&self, user: &str, secret: &str) -> Result<HashMap<Channel, f64>> {
        let (from, to) = self.date_window();
        let url = format!(
            "{MIXPANEL_API_BASE}/segmentation/sum?project_id={}&event={}&on={}&where={}&from_date={from}&to_date={to}&unit=day",
            self.project_id,
            urlencoding::encode(PURCHASE_EVENT),
            urlencoding::encode("properties[\"channel\"]"),
            urlencoding::encode("defined(properties[\"revenue\"])"),
        );

        let resp = self
            .http
            .get(&url)
            .basic_auth(user, Some(secret))
            .send()
            .await
            .context("Mixpanel segmentation/sum request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Mixpanel query API error: {status}");
        }

        let data: SegmentationSumResponse = resp
            .json()
            .await
            .context("Failed to parse Mixpanel segmentation/sum response")?;

        Ok(Self::fold_series(&data.results))
    }

    /// Join click and revenue maps into records. Channels appearing in
    /// either map produce a row.
    fn join_frames(
        clicks: HashMap<Channel, f64>,
        revenue: HashMap<Channel, f64>,
    ) -> Vec<ChannelRecord> {
        let mut channels: Vec<Channel> = clicks.keys().chain(revenue.keys()).copied().collect();
        channels.sort_by_key(|c| c.index());
        channels.dedup();

        channels
            .into_iter()
            .map(|channel| {
                ChannelRecord::new(
                    channel,
                    clicks.get(&channel).copied().unwrap_or(0.0).max(0.0) as u64,
                    revenue.get(&channel).copied().unwrap_or(0.0),
                    SOURCE_NAME,
                )
            })
            .collect()
    }

    /// Sample frame used when no credentials are configured.
    fn sample_frame() -> Vec<ChannelRecord> {
        vec![
            ChannelRecord::new(Channel::Email, 80, 400.0, SOURCE_NAME),
            ChannelRecord::new(Channel::Referral, 150, 600.0, SOURCE_NAME),
        ]
    }
}

#[async_trait]
impl AnalyticsSource for MixpanelSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch_performance(&self) -> Result<Vec<ChannelRecord>> {
        let (user, secret) = match &self.credentials {
            Some(c) => c.clone(),
            None => {
                warn!("No Mixpanel service account configured — returning sample frame");
                return Ok(Self::sample_frame());
            }
        };

        let clicks = self.fetch_clicks(&user, &secret).await?;
        let revenue = self.fetch_revenue(&user, &secret).await?;
        Ok(Self::join_frames(clicks, revenue))
    }

    fn cost_per_call(&self) -> Decimal {
        Decimal::ZERO // query API is included in the plan
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials() {
        let (user, secret) = MixpanelSource::parse_credentials("svc.abc:topsecret").unwrap();
        assert_eq!(user, "svc.abc");
        assert_eq!(secret, "topsecret");
    }

    #[test]
    fn test_parse_credentials_rejects_malformed() {
        assert!(MixpanelSource::parse_credentials("no-colon").is_err());
        assert!(MixpanelSource::parse_credentials(":missing-user").is_err());
        assert!(MixpanelSource::parse_credentials("missing-secret:").is_err());
    }

    #[test]
    fn test_fold_series_sums_dates_and_maps_channels() {
        let mut values = HashMap::new();
        values.insert(
            "email".to_string(),
            HashMap::from([("2026-08-01".to_string(), 30.0), ("2026-08-02".to_string(), 50.0)]),
        );
        values.insert(
            "smoke signals".to_string(), // unmapped — skipped
            HashMap::from([("2026-08-01".to_string(), 9.0)]),
        );

        let totals = MixpanelSource::fold_series(&values);
        assert_eq!(totals.len(), 1);
        assert!((totals[&Channel::Email] - 80.0).abs() < 1e-10);
    }

    #[test]
    fn test_join_frames_aligns_channels() {
        let clicks = HashMap::from([(Channel::Email, 80.0), (Channel::Referral, 150.0)]);
        let revenue = HashMap::from([(Channel::Email, 400.0)]);

        let records = MixpanelSource::join_frames(clicks, revenue);
        assert_eq!(records.len(), 2);

        let email = records.iter().find(|r| r.channel == Channel::Email).unwrap();
        assert_eq!(email.clicks, 80);
        assert!((email.revenue - 400.0).abs() < 1e-10);

        // Referral had clicks but no revenue rows
        let referral = records.iter().find(|r| r.channel == Channel::Referral).unwrap();
        assert_eq!(referral.clicks, 150);
        assert_eq!(referral.revenue, 0.0);
    }

    #[test]
    fn test_segmentation_response_parses() {
        let json = r#"{
            "data": {
                "series": ["2026-08-01", "2026-08-02"],
                "values": {
                    "referral": {"2026-08-01": 70, "2026-08-02": 80}
                }
            },
            "legend_size": 1
        }"#;
        let resp: SegmentationResponse = serde_json::from_str(json).unwrap();
        let totals = MixpanelSource::fold_series(&resp.data.values);
        assert!((totals[&Channel::Referral] - 150.0).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_keyless_fetch_returns_sample_frame() {
        let src = MixpanelSource::new("0", None, 28).unwrap();
        let records = src.fetch_performance().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].channel, Channel::Email);
        assert_eq!(records[1].channel, Channel::Referral);
    }

    #[test]
    fn test_source_name_and_cost() {
        let src = MixpanelSource::new("0", None, 28).unwrap();
        assert_eq!(src.name(), "mixpanel");
        assert_eq!(src.cost_per_call(), Decimal::ZERO);
    }
}
