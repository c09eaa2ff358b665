//! Forecast-to-weight conversion.
//!
//! Turns per-channel revenue forecasts into normalized allocation
//! weights within each spend class. Negative predictions carry no
//! weight; a class where every prediction is non-positive falls back
//! to uniform weighting so the budget is still spent.

use tracing::debug;

use crate::types::{Channel, ChannelForecast, SpendClass};

/// A channel's normalized weight within its spend class.
#[derive(Debug, Clone)]
pub struct ChannelWeight {
    pub channel: Channel,
    /// Normalized weight in [0, 1]; weights of a class sum to 1.
    pub weight: f64,
    pub predicted_revenue: f64,
}

/// Compute normalized weights for every forecast channel in `class`.
///
/// Returns an empty vector when the class has no forecast channels.
pub fn class_weights(forecasts: &[ChannelForecast], class: SpendClass) -> Vec<ChannelWeight> {
    let members: Vec<&ChannelForecast> = forecasts
        .iter()
        .filter(|f| f.channel.spend_class() == class)
        .collect();

    if members.is_empty() {
        return Vec::new();
    }

    let raw: Vec<f64> = members
        .iter()
        .map(|f| {
            if f.predicted_revenue.is_finite() {
                f.predicted_revenue.max(0.0)
            } else {
                0.0
            }
        })
        .collect();

    let total: f64 = raw.iter().sum();

    let normalized: Vec<f64> = if total > 0.0 {
        raw.iter().map(|w| w / total).collect()
    } else {
        // No channel predicts positive revenue — spread the budget evenly
        // rather than parking it.
        debug!(%class, channels = members.len(), "No positive predictions, using uniform weights");
        vec![1.0 / members.len() as f64; members.len()]
    };

    members
        .iter()
        .zip(normalized)
        .map(|(f, weight)| ChannelWeight {
            channel: f.channel,
            weight,
            predicted_revenue: f.predicted_revenue,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
