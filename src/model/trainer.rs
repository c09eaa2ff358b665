//! Model training and evaluation.
//!
//! Splits records into train/holdout sets, fits the boosted ensemble,
//! computes regression metrics on the holdout, and produces per-channel
//! revenue forecasts for the allocator.

use ndarray::{Array1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use tracing::{info, warn};

use super::features::{self, encode_row};
use super::gbm::{GbmConfig, GbmModel};
use crate::config::ModelConfig;
use crate::types::{Channel, ChannelForecast, ChannelRecord, ModelMetrics, OptimizerError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Fraction of rows held out for evaluation.
    pub holdout_fraction: f64,
    pub gbm: GbmConfig,
    /// Fixed RNG seed for the holdout shuffle. None = nondeterministic.
    pub split_seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            holdout_fraction: 0.2,
            gbm: GbmConfig::default(),
            split_seed: None,
        }
    }
}

impl From<&ModelConfig> for TrainerConfig {
    fn from(cfg: &ModelConfig) -> Self {
        Self {
            holdout_fraction: cfg.holdout_fraction,
            gbm: GbmConfig {
                rounds: cfg.rounds,
                learning_rate: cfg.learning_rate,
                min_split_rows: cfg.min_split_rows,
            },
            split_seed: cfg.split_seed,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Everything a training pass produces.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub model: GbmModel,
    pub metrics: ModelMetrics,
    pub forecasts: Vec<ChannelForecast>,
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Fit the revenue model and evaluate it.
    ///
    /// Datasets too small to hold out an evaluation split are trained on
    /// all rows; the resulting metrics are flagged `in_sample`.
    pub fn train(&self, records: &[ChannelRecord]) -> Result<TrainOutcome, OptimizerError> {
        if records.len() < 2 {
            return Err(OptimizerError::InsufficientData {
                needed: 2,
                got: records.len(),
            });
        }

        let dataset = features::build_dataset(records)?;
        let n = dataset.rows();

        // Shuffled holdout split
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = match self.config.split_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        indices.shuffle(&mut rng);

        let eval_n = (n as f64 * self.config.holdout_fraction).floor() as usize;
        let in_sample = eval_n == 0 || n - eval_n < 2;

        let (train_idx, eval_idx): (Vec<usize>, Vec<usize>) = if in_sample {
            warn!(rows = n, "Dataset too small for a holdout split — metrics are in-sample");
            (indices.clone(), indices)
        } else {
            let (eval, train) = indices.split_at(eval_n);
            (train.to_vec(), eval.to_vec())
        };

        let train_x = dataset.features.select(Axis(0), &train_idx);
        let train_y = dataset.targets.select(Axis(0), &train_idx);
        let eval_x = dataset.features.select(Axis(0), &eval_idx);
        let eval_y = dataset.targets.select(Axis(0), &eval_idx);

        let model = GbmModel::fit(&train_x, &train_y, &self.config.gbm);
        let eval_pred = model.predict(&eval_x);

        let metrics = ModelMetrics {
            rmse: rmse(&eval_pred, &eval_y),
            mae: mae(&eval_pred, &eval_y),
            r_squared: r_squared(&eval_pred, &eval_y),
            train_rows: train_idx.len(),
            eval_rows: eval_idx.len(),
            in_sample,
        };

        let forecasts = self.forecast_channels(&model, records);

        info!(
            trees = model.tree_count(),
            %metrics,
            channels = forecasts.len(),
            "Model trained"
        );

        Ok(TrainOutcome {
            model,
            metrics,
            forecasts,
        })
    }

    /// Predict revenue for each channel's aggregate feature row.
    fn forecast_channels(&self, model: &GbmModel, records: &[ChannelRecord]) -> Vec<ChannelForecast> {
        let mut by_channel: HashMap<Channel, (u64, f64, usize)> = HashMap::new();
        for record in records {
            let entry = by_channel.entry(record.channel).or_insert((0, 0.0, 0));
            entry.0 += record.clicks;
            entry.1 += record.revenue;
            entry.2 += 1;
        }

        let mut forecasts: Vec<ChannelForecast> = by_channel
            .into_iter()
            .map(|(channel, (clicks, revenue, samples))| {
                let row = Array1::from_vec(encode_row(channel, clicks as f64));
                ChannelForecast {
                    channel,
                    predicted_revenue: model.predict_row(&row.view()),
                    observed_clicks: clicks,
                    observed_revenue: revenue,
                    samples,
                }
            })
            .collect();

        forecasts.sort_by_key(|f| f.channel.index());
        forecasts
    }
}

// ---------------------------------------------------------------------------
// Metric helpers
// ---------------------------------------------------------------------------

fn rmse(predicted: &Array1<f64>, actual: &Array1<f64>) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mse: f64 = predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (p - a) * (p - a))
        .sum::<f64>()
        / actual.len() as f64;
    mse.sqrt()
}

fn mae(predicted: &Array1<f64>, actual: &Array1<f64>) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (p - a).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Coefficient of determination. A constant target with matching
/// predictions scores 1.0; a constant target with mismatched
/// predictions scores 0.0.
fn r_squared(predicted: &Array1<f64>, actual: &Array1<f64>) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.mean().unwrap_or(0.0);
    let ss_tot: f64 = actual.iter().map(|a| (a - mean) * (a - mean)).sum();
    let ss_res: f64 = predicted
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (p - a) * (p - a))
        .sum();

    if ss_tot < 1e-12 {
        if ss_res < 1e-12 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
