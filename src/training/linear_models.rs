//! Linear model implementations
//!
//! L2-regularised logistic regression fitted by Newton's method (IRLS), plus
//! the Cholesky routines shared with discriminant analysis.

use crate::error::{ClassifyError, Result};
use crate::preprocessing::Standardizer;
use crate::training::models::{check_features, sigmoid, threshold, ModelAdapter, TrainedModel};
use crate::training::ModelKind;
use crate::utils::WorkerPool;
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lower-triangular factor `L` with `A = L * L^T`, or `None` when `A` is not
/// positive definite.
pub(crate) fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if n != a.ncols() {
        return None;
    }
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve `L * L^T x = b` given the factor from [`cholesky`]
pub(crate) fn cholesky_substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    // Forward substitution: L * y = b
    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Solve a symmetric positive-definite system, retrying once with a small
/// ridge on the diagonal when the matrix is near-singular.
pub(crate) fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() || n == 0 {
        return None;
    }
    if let Some(l) = cholesky(a) {
        return Some(cholesky_substitute(&l, b));
    }

    let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    let mut a_reg = a.clone();
    for k in 0..n {
        a_reg[[k, k]] += ridge.max(1e-12);
    }
    cholesky(&a_reg).map(|l| cholesky_substitute(&l, b))
}

/// `log(1 + exp(z))` without overflow
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

/// Logistic regression hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    /// L2 penalty on the coefficients (the intercept is not penalised)
    pub alpha: f64,
    /// Newton iteration budget
    pub max_iter: usize,
    /// Relative objective change that counts as converged
    pub tol: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            max_iter: 100,
            tol: 1e-8,
        }
    }
}

impl ModelAdapter for LogisticConfig {
    fn kind(&self) -> ModelKind {
        ModelKind::LogisticRegression
    }

    fn validate(&self) -> Result<()> {
        if !(self.alpha >= 0.0) || !self.alpha.is_finite() {
            return Err(ClassifyError::InvalidConfig(format!(
                "logistic alpha must be a finite value >= 0, got {}",
                self.alpha
            )));
        }
        if self.max_iter == 0 {
            return Err(ClassifyError::InvalidConfig(
                "logistic max_iter must be positive".to_string(),
            ));
        }
        if !(self.tol > 0.0) {
            return Err(ClassifyError::InvalidConfig(format!(
                "logistic tol must be positive, got {}",
                self.tol
            )));
        }
        Ok(())
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, _pool: &WorkerPool) -> Result<Box<dyn TrainedModel>> {
        let model = LogisticRegression::fit(self, x, y)?;
        Ok(Box::new(model))
    }
}

/// Fitted logistic regression on standardised inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    scaler: Standardizer,
    /// Coefficients on the standardised features
    pub coefficients: Array1<f64>,
    pub intercept: f64,
    /// Newton iterations used
    pub n_iter: usize,
}

impl LogisticRegression {
    /// Fit with damped Newton steps on the penalised negative log-likelihood
    pub fn fit(config: &LogisticConfig, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let (scaler, z) = Standardizer::fit_transform(x)?;
        let n_samples = z.nrows();
        let n_features = z.ncols();
        let alpha = config.alpha;

        let mut design = Array2::ones((n_samples, n_features + 1));
        design.slice_mut(s![.., 1..]).assign(&z);

        let objective = |beta: &Array1<f64>| -> f64 {
            let eta = design.dot(beta);
            let nll: f64 = eta
                .iter()
                .zip(y.iter())
                .map(|(&e, &t)| softplus(e) - t * e)
                .sum();
            nll + 0.5 * alpha * beta.slice(s![1..]).mapv(|b| b * b).sum()
        };

        let mut beta = Array1::zeros(n_features + 1);
        let mut current = objective(&beta);

        for iter in 1..=config.max_iter {
            let p = design.dot(&beta).mapv(sigmoid);
            let w = p.mapv(|v| (v * (1.0 - v)).max(1e-10));

            let mut grad = design.t().dot(&(&p - y));
            grad.slice_mut(s![1..])
                .zip_mut_with(&beta.slice(s![1..]), |g, &b| *g += alpha * b);

            let weighted = &design * &w.view().insert_axis(Axis(1));
            let mut hessian = design.t().dot(&weighted);
            for j in 1..=n_features {
                hessian[[j, j]] += alpha;
            }

            let step = cholesky_solve(&hessian, &grad).ok_or_else(|| ClassifyError::ConvergenceError {
                model: "logistic regression".to_string(),
                iterations: iter,
            })?;

            // Step halving until the objective does not increase
            let mut t = 1.0;
            let (next, next_obj) = loop {
                let candidate = &beta - &(&step * t);
                let value = objective(&candidate);
                if value <= current || t < 1e-10 {
                    break (candidate, value);
                }
                t *= 0.5;
            };

            let change = (current - next_obj).abs();
            let max_step = step.iter().fold(0.0f64, |m, v| m.max((t * v).abs()));
            beta = next;
            let previous = current;
            current = next_obj;

            if change <= config.tol * (previous.abs() + config.tol) || max_step < config.tol {
                debug!(iterations = iter, objective = current, "Logistic regression converged");
                return Ok(Self {
                    scaler,
                    coefficients: beta.slice(s![1..]).to_owned(),
                    intercept: beta[0],
                    n_iter: iter,
                });
            }
        }

        Err(ClassifyError::ConvergenceError {
            model: "logistic regression".to_string(),
            iterations: config.max_iter,
        })
    }

    /// P(positive) for every row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_features(x, self.coefficients.len())?;
        let z = self.scaler.transform(x)?;
        Ok((z.dot(&self.coefficients) + self.intercept).mapv(sigmoid))
    }
}

impl TrainedModel for LogisticRegression {
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
    fn test_cholesky_solve() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = cholesky_solve(&a, &b).unwrap();
        let back = a.dot(&x);
        assert!((back[0] - 2.0).abs() < 1e-10);
        assert!((back[1] - 1.0).abs() < 1e-10);

        assert!(cholesky(&array![[1.0, 2.0], [2.0, 1.0]]).is_none());
    }

    #[test]
    fn test_logistic_regression() {
        let x = array![
            [1.0, 1.0],
            [1.5, 1.5],
            [2.0, 2.0],
            [5.0, 5.0],
            [5.5, 5.5],
            [6.0, 6.0],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let model = LogisticRegression::fit(&LogisticConfig::default(), &x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);

        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] < 0.5);
        assert!(proba[5] > 0.5);
        assert!(proba[0] < proba[2] && proba[2] < proba[3]);
    }

    #[test]
    fn test_unpenalised_separable_data_does_not_converge() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let config = LogisticConfig {
            alpha: 0.0,
            max_iter: 5,
            tol: 1e-12,
        };
        let err = LogisticRegression::fit(&config, &x, &y).unwrap_err();
        assert!(matches!(err, ClassifyError::ConvergenceError { iterations: 5, .. }));
    }

    #[test]
    fn test_invalid_config() {
        let config = LogisticConfig {
            alpha: -1.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClassifyError::InvalidConfig(_))));
    }
}
