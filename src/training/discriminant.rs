//! Linear discriminant analysis
//!
//! Gaussian class conditionals sharing one pooled covariance matrix. The
//! posterior of the positive class is a logistic function of a linear score.

use crate::error::{ClassifyError, Result};
use crate::training::linear_models::{cholesky, cholesky_substitute};
use crate::training::models::{check_features, sigmoid, threshold, ModelAdapter, TrainedModel};
use crate::training::ModelKind;
use crate::utils::WorkerPool;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Class prior used by the discriminant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prior {
    /// Class frequencies of the training rows
    Empirical,
    /// Equal priors
    Uniform,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscriminantConfig {
    pub prior: Prior,
    /// Shrink off-diagonal covariance toward zero, in `[0, 1]`
    pub shrinkage: f64,
}

impl Default for DiscriminantConfig {
    fn default() -> Self {
        Self {
            prior: Prior::Empirical,
            shrinkage: 0.0,
        }
    }
}

impl ModelAdapter for DiscriminantConfig {
    fn kind(&self) -> ModelKind {
        ModelKind::DiscriminantAnalysis
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.shrinkage) {
            return Err(ClassifyError::InvalidConfig(format!(
                "shrinkage must be in [0, 1], got {}",
                self.shrinkage
            )));
        }
        Ok(())
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, _pool: &WorkerPool) -> Result<Box<dyn TrainedModel>> {
        Ok(Box::new(LinearDiscriminant::fit(self, x, y)?))
    }
}

/// Fitted linear discriminant: `score = w . x + b`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearDiscriminant {
    pub weights: Array1<f64>,
    pub bias: f64,
    pub class_means: [Array1<f64>; 2],
}

impl LinearDiscriminant {
    pub fn fit(config: &DiscriminantConfig, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let n_features = x.ncols();
        let rows_of = |class: f64| -> Vec<usize> {
            y.iter()
                .enumerate()
                .filter(|(_, &v)| v == class)
                .map(|(i, _)| i)
                .collect()
        };
        let neg_rows = rows_of(0.0);
        let pos_rows = rows_of(1.0);
        if neg_rows.is_empty() || pos_rows.is_empty() {
            return Err(ClassifyError::InvalidArgument(
                "discriminant analysis needs both classes".to_string(),
            ));
        }

        let x_neg = x.select(Axis(0), &neg_rows);
        let x_pos = x.select(Axis(0), &pos_rows);
        let mean_neg = x_neg.mean_axis(Axis(0)).ok_or(ClassifyError::ModelNotFitted)?;
        let mean_pos = x_pos.mean_axis(Axis(0)).ok_or(ClassifyError::ModelNotFitted)?;

        // Pooled within-class scatter
        let centred_neg = &x_neg - &mean_neg;
        let centred_pos = &x_pos - &mean_pos;
        let dof = (x.nrows().saturating_sub(2)).max(1) as f64;
        let mut cov = (centred_neg.t().dot(&centred_neg) + centred_pos.t().dot(&centred_pos)) / dof;

        let max_var = cov.diag().iter().cloned().fold(0.0f64, f64::max);
        for j in 0..n_features {
            if cov[[j, j]] <= 1e-12 * max_var.max(1.0) {
                return Err(ClassifyError::InvalidConfig(format!(
                    "pooled covariance has zero variance in column {}",
                    j
                )));
            }
        }

        if config.shrinkage > 0.0 {
            for i in 0..n_features {
                for j in 0..n_features {
                    if i != j {
                        cov[[i, j]] *= 1.0 - config.shrinkage;
                    }
                }
            }
        }

        let l = cholesky(&cov)
            .filter(|l| (0..n_features).all(|i| l[[i, i]] * l[[i, i]] > 1e-10 * cov[[i, i]]))
            .ok_or_else(|| {
                ClassifyError::InvalidConfig("pooled covariance matrix is singular".to_string())
            })?;

        let diff = &mean_pos - &mean_neg;
        let weights = cholesky_substitute(&l, &diff);
        let midpoint = (&mean_pos + &mean_neg) * 0.5;

        let log_prior_ratio = match config.prior {
            Prior::Empirical => (pos_rows.len() as f64 / neg_rows.len() as f64).ln(),
            Prior::Uniform => 0.0,
        };
        let bias = log_prior_ratio - weights.dot(&midpoint);

        if !weights.iter().all(|w| w.is_finite()) {
            return Err(ClassifyError::InvalidConfig(
                "pooled covariance matrix is singular".to_string(),
            ));
        }

        Ok(Self {
            weights,
            bias,
            class_means: [mean_neg, mean_pos],
        })
    }

    /// Linear discriminant score; positive favours the positive class
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_features(x, self.weights.len())?;
        Ok(x.dot(&self.weights) + self.bias)
    }

    /// Posterior probability of the positive class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(sigmoid))
    }
}

impl TrainedModel for LinearDiscriminant {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold(&self.predict_proba(x)?, 0.5))
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
    fn test_separates_two_clusters() {
        let x = array![
            [1.0, 2.0],
            [1.5, 1.0],
            [2.0, 1.5],
            [6.0, 7.0],
            [6.5, 6.0],
            [7.0, 6.5],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let lda = LinearDiscriminant::fit(&DiscriminantConfig::default(), &x, &y).unwrap();

        assert_eq!(lda.predict(&x).unwrap(), y);
        let p = lda.predict_proba(&array![[4.0, 4.0], [10.0, 10.0]]).unwrap();
        assert!(p[1] > 0.99);
        assert!(p.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_zero_variance_column_is_rejected() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [7.0, 5.0], [8.0, 5.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let err = LinearDiscriminant::fit(&DiscriminantConfig::default(), &x, &y).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidConfig(_)));
    }

    #[test]
    fn test_collinear_columns_are_singular() {
        let x = array![[1.0, 2.0], [2.0, 4.0], [7.0, 14.0], [9.0, 18.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        assert!(LinearDiscriminant::fit(&DiscriminantConfig::default(), &x, &y).is_err());
    }
}
