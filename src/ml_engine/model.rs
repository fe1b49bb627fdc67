//! Logistic regression direction model
//!
//! Fitted with SmartCore on standardized features. Only the learned weights
//! and the scaler are persisted, so prediction is a plain dot product and the
//! JSON file stays readable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::logistic_regression::{LogisticRegression, LogisticRegressionParameters};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{TradeError, TradeResult};
use crate::features::FeatureMatrix;

/// Fewer labelled rows than this is not worth fitting
pub const MIN_TRAINING_SAMPLES: usize = 30;

/// Persisted model: scaler + weights
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainedModel {
    pub feature_names: Vec<String>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub weights: Vec<f64>,
    pub intercept: f64,
    pub trained_at: DateTime<Utc>,
    pub samples: usize,
    /// In-sample accuracy
    pub accuracy: f64,
}

impl TrainedModel {
    /// Fit on every labelled row of `matrix`
    pub fn train(matrix: &FeatureMatrix) -> TradeResult<Self> {
        let (x, y) = matrix.labelled();
        if x.len() < MIN_TRAINING_SAMPLES {
            return Err(TradeError::Data(format!(
                "only {} labelled rows, need at least {}",
                x.len(),
                MIN_TRAINING_SAMPLES
            )));
        }
        let ups = y.iter().filter(|&&label| label == 1).count();
        if ups == 0 || ups == y.len() {
            return Err(TradeError::Data(
                "training window contains a single label class".to_string(),
            ));
        }

        let (means, stds) = fit_scaler(&x);
        let scaled: Vec<Vec<f64>> = x.iter().map(|row| standardize(row, &means, &stds)).collect();
        let rows: Vec<&[f64]> = scaled.iter().map(|r| r.as_slice()).collect();
        let dense = DenseMatrix::from_2d_array(&rows)
            .map_err(|e| TradeError::Prediction(format!("failed to build training matrix: {}", e)))?;

        let fitted = LogisticRegression::fit(&dense, &y, LogisticRegressionParameters::default())
            .map_err(|e| TradeError::Prediction(format!("logistic regression fit failed: {}", e)))?;

        let coefficients = fitted.coefficients();
        let (_, n_cols) = coefficients.shape();
        if n_cols != matrix.names.len() {
            return Err(TradeError::Prediction(format!(
                "fitted {} coefficients for {} features",
                n_cols,
                matrix.names.len()
            )));
        }
        let weights: Vec<f64> = (0..n_cols).map(|j| *coefficients.get((0, j))).collect();
        let intercept = *fitted.intercept().get((0, 0));

        let mut model = Self {
            feature_names: matrix.names.clone(),
            means,
            stds,
            weights,
            intercept,
            trained_at: Utc::now(),
            samples: x.len(),
            accuracy: 0.0,
        };

        let correct = x
            .iter()
            .zip(y.iter())
            .filter(|(row, label)| {
                let p = model.probability_up(row).unwrap_or(0.5);
                i64::from(p > 0.5) == **label
            })
            .count();
        model.accuracy = correct as f64 / x.len() as f64;

        info!(
            samples = model.samples,
            features = model.feature_names.len(),
            accuracy = format!("{:.3}", model.accuracy),
            "Model trained"
        );
        Ok(model)
    }

    /// Probability that the next label close is higher
    pub fn probability_up(&self, row: &[f64]) -> TradeResult<f64> {
        if row.len() != self.weights.len() {
            return Err(TradeError::Prediction(format!(
                "model expects {} features, got {}",
                self.weights.len(),
                row.len()
            )));
        }
        let scaled = standardize(row, &self.means, &self.stds);
        let z = self.intercept
            + scaled
                .iter()
                .zip(self.weights.iter())
                .map(|(x, w)| x * w)
                .sum::<f64>();
        let p = sigmoid(z);
        if !p.is_finite() {
            return Err(TradeError::Prediction("model produced a non-finite probability".to_string()));
        }
        Ok(p)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        // readers must never see a half-written model
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        info!(path = %path.display(), "Model saved");
        Ok(())
    }

    pub fn load(path: &Path) -> TradeResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            TradeError::Prediction(format!("model file {} unavailable: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            TradeError::Prediction(format!("model file {} is corrupt: {}", path.display(), e))
        })
    }
}

/// Column means and population std devs; constant columns get std 1
fn fit_scaler(x: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let n = x.len() as f64;
    let width = x.first().map(|r| r.len()).unwrap_or(0);
    let mut means = vec![0.0; width];
    let mut stds = vec![0.0; width];
    for j in 0..width {
        let mean = x.iter().map(|r| r[j]).sum::<f64>() / n;
        let var = x.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n;
        means[j] = mean;
        stds[j] = if var > f64::EPSILON { var.sqrt() } else { 1.0 };
    }
    (means, stds)
}

fn standardize(row: &[f64], means: &[f64], stds: &[f64]) -> Vec<f64> {
    row.iter()
        .zip(means.iter().zip(stds.iter()))
        .map(|(v, (m, s))| (v - m) / s)
        .collect()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Two features; label is up when the first feature is positive
    fn separable_matrix(n: usize) -> FeatureMatrix {
        let mut rows = Vec::with_capacity(n);
        let mut closes = Vec::with_capacity(n);
        let mut close = 100.0;
        closes.push(close);
        for i in 0..n {
            let up = i % 3 != 0;
            let signal = if up { 1.0 + (i % 5) as f64 * 0.1 } else { -1.0 - (i % 4) as f64 * 0.1 };
            rows.push(vec![signal, (i % 7) as f64]);
            close += if up { 0.5 } else { -0.5 };
            closes.push(close);
        }
        // label for row i compares closes[i + 1] to closes[i]
        rows.push(vec![0.0, 0.0]);
        FeatureMatrix {
            names: vec!["a".to_string(), "b".to_string()],
            rows,
            label_closes: closes,
        }
    }

    #[test]
    fn test_learns_separable_direction() {
        let model = TrainedModel::train(&separable_matrix(90)).unwrap();
        assert_eq!(model.weights.len(), 2);
        assert!(model.accuracy > 0.9);
        assert!(model.probability_up(&[1.5, 3.0]).unwrap() > 0.5);
        assert!(model.probability_up(&[-1.5, 3.0]).unwrap() < 0.5);
    }

    #[test]
    fn test_single_class_window_is_rejected() {
        let matrix = FeatureMatrix {
            names: vec!["a".to_string()],
            rows: (0..40).map(|i| vec![i as f64]).collect(),
            label_closes: (0..40).map(|i| i as f64).collect(),
        };
        assert!(matches!(TrainedModel::train(&matrix), Err(TradeError::Data(_))));
    }

    #[test]
    fn test_wrong_width_is_prediction_error() {
        let model = TrainedModel {
            feature_names: vec!["a".to_string()],
            means: vec![0.0],
            stds: vec![1.0],
            weights: vec![1.0],
            intercept: 0.0,
            trained_at: Utc::now(),
            samples: 1,
            accuracy: 1.0,
        };
        assert!((model.probability_up(&[0.0]).unwrap() - 0.5).abs() < 1e-12);
        assert!(matches!(
            model.probability_up(&[0.0, 1.0]),
            Err(TradeError::Prediction(_))
        ));
    }

    #[test]
    fn test_save_and_load_preserve_weights() {
        let dir = std::env::temp_dir().join(format!("fxbot_model_{}", Uuid::new_v4()));
        let path = dir.join("model.json");
        let model = TrainedModel::train(&separable_matrix(60)).unwrap();
        model.save(&path).unwrap();

        let loaded = TrainedModel::load(&path).unwrap();
        assert_eq!(loaded, model);
        assert!(!path.with_extension("json.tmp").exists());

        // a second save replaces the file in one step
        model.save(&path).unwrap();
        assert_eq!(TrainedModel::load(&path).unwrap(), model);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_is_prediction_error() {
        let path = std::env::temp_dir().join(format!("fxbot_missing_{}.json", Uuid::new_v4()));
        assert!(matches!(TrainedModel::load(&path), Err(TradeError::Prediction(_))));
    }
}
