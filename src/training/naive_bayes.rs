//! Naive Bayes classifier
//!
//! Gaussian Naive Bayes for the two-class case.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{ClassifyError, Result};
use crate::training::models::{check_features, sigmoid, ModelAdapter, TrainedModel};
use crate::training::ModelKind;
use crate::utils::WorkerPool;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiveBayesConfig {
    /// Fraction of the largest feature variance added to every variance
    pub var_smoothing: f64,
}

impl Default for NaiveBayesConfig {
    fn default() -> Self {
        Self { var_smoothing: 1e-9 }
    }
}

impl ModelAdapter for NaiveBayesConfig {
    fn kind(&self) -> ModelKind {
        ModelKind::NaiveBayes
    }

    fn validate(&self) -> Result<()> {
        if !(self.var_smoothing >= 0.0) || !self.var_smoothing.is_finite() {
            return Err(ClassifyError::InvalidConfig(format!(
                "var_smoothing must be a finite value >= 0, got {}",
                self.var_smoothing
            )));
        }
        Ok(())
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, _pool: &WorkerPool) -> Result<Box<dyn TrainedModel>> {
        Ok(Box::new(GaussianNaiveBayes::fit(self, x, y)?))
    }
}

/// Gaussian Naive Bayes Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Per-class feature means, negative class first
    means: [Vec<f64>; 2],
    /// Per-class smoothed feature variances
    variances: [Vec<f64>; 2],
    /// Class log priors
    log_priors: [f64; 2],
}

impl GaussianNaiveBayes {
    pub fn fit(config: &NaiveBayesConfig, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        let max_var = x
            .var_axis(Axis(0), 0.0)
            .iter()
            .cloned()
            .fold(0.0f64, f64::max);
        let epsilon = config.var_smoothing * max_var;
        let floor = 1e-12 * max_var.max(1.0);

        let mut means = [vec![0.0; n_features], vec![0.0; n_features]];
        let mut variances = [vec![0.0; n_features], vec![0.0; n_features]];
        let mut log_priors = [0.0; 2];

        for class in 0..2 {
            // Single-pass Welford's algorithm for mean and variance
            let mut feature_m2 = vec![0.0; n_features];
            let mut count = 0usize;
            for (i, row) in x.rows().into_iter().enumerate() {
                if y[i] != class as f64 {
                    continue;
                }
                count += 1;
                for (j, &val) in row.iter().enumerate() {
                    let delta = val - means[class][j];
                    means[class][j] += delta / count as f64;
                    let delta2 = val - means[class][j];
                    feature_m2[j] += delta * delta2;
                }
            }
            if count == 0 {
                return Err(ClassifyError::InvalidArgument(
                    "naive Bayes needs both classes".to_string(),
                ));
            }
            variances[class] = feature_m2
                .iter()
                .map(|&m2| (m2 / count as f64 + epsilon).max(floor))
                .collect();
            log_priors[class] = (count as f64 / n_samples as f64).ln();
        }

        Ok(Self {
            means,
            variances,
            log_priors,
        })
    }

    fn joint_log_likelihood(&self, row: ArrayView1<f64>, class: usize) -> f64 {
        let log_likelihood: f64 = row
            .iter()
            .zip(self.means[class].iter().zip(self.variances[class].iter()))
            .map(|(&v, (&mean, &var))| -0.5 * ((2.0 * PI * var).ln() + (v - mean).powi(2) / var))
            .sum();
        self.log_priors[class] + log_likelihood
    }

    /// Posterior probability of the positive class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_features(x, self.means[0].len())?;
        Ok(x.rows()
            .into_iter()
            .map(|row| sigmoid(self.joint_log_likelihood(row, 1) - self.joint_log_likelihood(row, 0)))
            .collect())
    }
}

impl TrainedModel for GaussianNaiveBayes {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_features(x, self.means[0].len())?;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                if self.joint_log_likelihood(row, 1) > self.joint_log_likelihood(row, 0) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect())
    }

    fn positive_scores(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        self.predict_proba(x).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_gaussian_nb() {
        let x = array![
            [1.0, 2.0],
            [1.5, 1.8],
            [1.2, 2.2],
            [5.0, 8.0],
            [5.5, 7.5],
            [5.2, 8.2],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let nb = GaussianNaiveBayes::fit(&NaiveBayesConfig::default(), &x, &y).unwrap();
        assert_eq!(nb.predict(&x).unwrap(), y);

        let proba = nb.predict_proba(&x).unwrap();
        assert!(proba[0] < 0.01);
        assert!(proba[3] > 0.99);
    }

    #[test]
    fn test_constant_feature_is_smoothed() {
        let x = array![[1.0, 3.0], [2.0, 3.0], [8.0, 3.0], [9.0, 3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let nb = GaussianNaiveBayes::fit(&NaiveBayesConfig::default(), &x, &y).unwrap();
        let proba = nb.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| p.is_finite()));
        assert_eq!(nb.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_negative_smoothing_rejected() {
        let config = NaiveBayesConfig { var_smoothing: -1.0 };
        assert!(matches!(config.validate(), Err(ClassifyError::InvalidConfig(_))));
    }
}
