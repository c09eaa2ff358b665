//! Feature engineering.
//!
//! Turns raw performance records into a numeric design matrix: the
//! channel label is one-hot expanded and the click count is carried as
//! a numeric column. Revenue is the regression target.

use ndarray::{Array1, Array2};

use crate::types::{Channel, ChannelRecord, OptimizerError};

/// Number of feature columns: one per channel plus the clicks column.
pub const FEATURE_WIDTH: usize = Channel::ALL.len() + 1;

/// A prepared dataset ready for model fitting.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// n × FEATURE_WIDTH design matrix.
    pub features: Array2<f64>,
    /// Revenue targets, one per row.
    pub targets: Array1<f64>,
    /// Channel of each row (kept for per-channel aggregation).
    pub channels: Vec<Channel>,
    pub feature_names: Vec<String>,
}

impl Dataset {
    pub fn rows(&self) -> usize {
        self.features.nrows()
    }
}

/// Encode a single (channel, clicks) pair as a feature row.
pub fn encode_row(channel: Channel, clicks: f64) -> Vec<f64> {
    let mut row = vec![0.0; FEATURE_WIDTH];
    row[channel.index()] = 1.0;
    row[FEATURE_WIDTH - 1] = clicks;
    row
}

/// Column labels matching `encode_row`'s layout.
pub fn feature_names() -> Vec<String> {
    let mut names: Vec<String> = Channel::ALL.iter().map(|c| format!("channel={c}")).collect();
    names.push("clicks".to_string());
    names
}

/// Build a design matrix from validated records.
///
/// Callers are expected to have filtered malformed rows already; any
/// remaining non-finite target is rejected here as a defence against
/// NaN poisoning the fit.
pub fn build_dataset(records: &[ChannelRecord]) -> Result<Dataset, OptimizerError> {
    if records.is_empty() {
        return Err(OptimizerError::InsufficientData { needed: 1, got: 0 });
    }

    let mut flat = Vec::with_capacity(records.len() * FEATURE_WIDTH);
    let mut targets = Vec::with_capacity(records.len());
    let mut channels = Vec::with_capacity(records.len());

    for record in records {
        if !record.revenue.is_finite() {
            return Err(OptimizerError::Model(format!(
                "Non-finite revenue for channel {}",
                record.channel
            )));
        }
        flat.extend(encode_row(record.channel, record.clicks as f64));
        targets.push(record.revenue);
        channels.push(record.channel);
    }

    let features = Array2::from_shape_vec((records.len(), FEATURE_WIDTH), flat)
        .map_err(|e| OptimizerError::Model(format!("Bad design matrix shape: {e}")))?;

    Ok(Dataset {
        features,
        targets: Array1::from_vec(targets),
        channels,
        feature_names: feature_names(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_row_one_hot() {
        let row = encode_row(Channel::Email, 80.0);
        assert_eq!(row.len(), FEATURE_WIDTH);
        assert_eq!(row[Channel::Email.index()], 1.0);
        // Exactly one channel indicator set
        let indicators: f64 = row[..Channel::ALL.len()].iter().sum();
        assert_eq!(indicators, 1.0);
        assert_eq!(row[FEATURE_WIDTH - 1], 80.0);
    }

    #[test]
    fn test_feature_names_layout() {
        let names = feature_names();
        assert_eq!(names.len(), FEATURE_WIDTH);
        assert_eq!(names[Channel::Search.index()], "channel=search");
        assert_eq!(names.last().unwrap(), "clicks");
    }

    #[test]
    fn test_build_dataset() {
        let records = vec![
            ChannelRecord::new(Channel::Search, 100, 500.0, "t"),
            ChannelRecord::new(Channel::Email, 80, 400.0, "t"),
        ];
        let ds = build_dataset(&records).unwrap();
        assert_eq!(ds.rows(), 2);
        assert_eq!(ds.features.ncols(), FEATURE_WIDTH);
        assert_eq!(ds.targets[0], 500.0);
        assert_eq!(ds.channels[1], Channel::Email);
        assert_eq!(ds.features[[0, Channel::Search.index()]], 1.0);
        assert_eq!(ds.features[[0, Channel::Email.index()]], 0.0);
        assert_eq!(ds.features[[1, FEATURE_WIDTH - 1]], 80.0);
    }

    #[test]
    fn test_build_dataset_empty_is_error() {
        let err = build_dataset(&[]).unwrap_err();
        assert!(matches!(err, OptimizerError::InsufficientData { .. }));
    }

    #[test]
    fn test_build_dataset_rejects_nan_target() {
        let records = vec![ChannelRecord::new(Channel::Search, 1, f64::NAN, "t")];
        let err = build_dataset(&records).unwrap_err();
        assert!(matches!(err, OptimizerError::Model(_)));
    }
}
