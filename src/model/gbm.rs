//! Gradient-boosted regression stumps.
//!
//! A small squared-error boosting implementation: each round fits a
//! depth-1 tree (single feature, single threshold) to the current
//! residuals and adds it with shrinkage. Degenerate inputs (too few
//! rows, constant target) fall back to the mean predictor.

use ndarray::{Array1, Array2, ArrayView1};
use tracing::debug;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GbmConfig {
    /// Number of boosting rounds (upper bound — fitting stops early once
    /// no split improves the residual error).
    pub rounds: usize,
    /// Shrinkage applied to each round's contribution.
    pub learning_rate: f64,
    /// Minimum rows required before any split is attempted.
    pub min_split_rows: usize,
}

impl Default for GbmConfig {
    fn default() -> Self {
        Self {
            rounds: 50,
            learning_rate: 0.1,
            min_split_rows: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Stump
// ---------------------------------------------------------------------------

/// A single depth-1 regression tree.
#[derive(Debug, Clone)]
struct Stump {
    feature: usize,
    threshold: f64,
    left_value: f64,
    right_value: f64,
}

impl Stump {
    fn predict_row(&self, row: &ArrayView1<f64>) -> f64 {
        if row[self.feature] <= self.threshold {
            self.left_value
        } else {
            self.right_value
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// A fitted boosted-stump ensemble.
#[derive(Debug, Clone)]
pub struct GbmModel {
    /// Mean of the training target — the prediction when no tree fits.
    base: f64,
    trees: Vec<Stump>,
    learning_rate: f64,
}

impl GbmModel {
    /// Fit an ensemble to the given design matrix and targets.
    pub fn fit(features: &Array2<f64>, targets: &Array1<f64>, config: &GbmConfig) -> Self {
        let n = features.nrows();
        let base = if n == 0 {
            0.0
        } else {
            targets.mean().unwrap_or(0.0)
        };

        let mut model = Self {
            base,
            trees: Vec::new(),
            learning_rate: config.learning_rate,
        };

        if n < config.min_split_rows.max(2) {
            debug!(rows = n, "Too few rows to split — using mean predictor");
            return model;
        }

        let mut residuals = targets.mapv(|t| t - base);

        for round in 0..config.rounds {
            let Some(stump) = best_stump(features, &residuals) else {
                debug!(round, trees = model.trees.len(), "No improving split — stopping early");
                break;
            };

            for i in 0..n {
                residuals[i] -= config.learning_rate * stump.predict_row(&features.row(i));
            }
            model.trees.push(stump);
        }

        debug!(
            trees = model.trees.len(),
            base = model.base,
            "Boosted ensemble fitted"
        );

        model
    }

    /// Predict a single feature row.
    pub fn predict_row(&self, row: &ArrayView1<f64>) -> f64 {
        let mut value = self.base;
        for tree in &self.trees {
            value += self.learning_rate * tree.predict_row(row);
        }
        value
    }

    /// Predict every row of a design matrix.
    pub fn predict(&self, features: &Array2<f64>) -> Array1<f64> {
        Array1::from_iter((0..features.nrows()).map(|i| self.predict_row(&features.row(i))))
    }

    /// Number of trees in the ensemble (0 = mean predictor).
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

/// Exhaustive search for the stump minimizing residual SSE.
///
/// Returns None when no split strictly improves on the unsplit error,
/// which terminates boosting.
fn best_stump(features: &Array2<f64>, residuals: &Array1<f64>) -> Option<Stump> {
    let n = features.nrows();
    let current_sse: f64 = residuals.iter().map(|r| r * r).sum();

    let mut best: Option<(f64, Stump)> = None;

    for feature in 0..features.ncols() {
        let mut values: Vec<f64> = features.column(feature).to_vec();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values.dedup_by(|a, b| (*a - *b).abs() < 1e-12);

        if values.len() < 2 {
            continue; // constant feature
        }

        for pair in values.windows(2) {
            let threshold = (pair[0] + pair[1]) / 2.0;

            let mut left_sum = 0.0;
            let mut left_n = 0usize;
            let mut right_sum = 0.0;
            let mut right_n = 0usize;
            for i in 0..n {
                if features[[i, feature]] <= threshold {
                    left_sum += residuals[i];
                    left_n += 1;
                } else {
                    right_sum += residuals[i];
                    right_n += 1;
                }
            }
            if left_n == 0 || right_n == 0 {
                continue;
            }

            let left_value = left_sum / left_n as f64;
            let right_value = right_sum / right_n as f64;

            let sse: f64 = (0..n)
                .map(|i| {
                    let fitted = if features[[i, feature]] <= threshold {
                        left_value
                    } else {
                        right_value
                    };
                    let d = residuals[i] - fitted;
                    d * d
                })
                .sum();

            if best.as_ref().map_or(true, |(b, _)| sse < *b) {
                best = Some((
                    sse,
                    Stump {
                        feature,
                        threshold,
                        left_value,
                        right_value,
                    },
                ));
            }
        }
    }

    match best {
        Some((sse, stump)) if sse < current_sse - 1e-9 => Some(stump),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
