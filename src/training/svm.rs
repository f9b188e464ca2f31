//! Support Vector Machine classifier
//!
//! C-SVC trained by SMO. The working pair is the maximal violating pair and
//! the dual gradient is kept as an error cache, so each step costs O(n).

use crate::error::{ClassifyError, Result};
use crate::preprocessing::Standardizer;
use crate::training::models::{check_features, ModelAdapter, TrainedModel};
use crate::training::ModelKind;
use crate::utils::WorkerPool;
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training returns an error to prevent OOM.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel function type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelType {
    /// Linear kernel: K(x, y) = x · y
    Linear,
    /// Polynomial kernel: K(x, y) = (γ * x · y + r)^d
    Polynomial { degree: u32, coef0: f64 },
    /// Radial Basis Function (Gaussian): K(x, y) = exp(-γ * ||x - y||²)
    Rbf,
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// Kernel function
    pub kernel: KernelType,
    /// Kernel coefficient; `None` uses `1 / n_features`
    pub gamma: Option<f64>,
    /// Stopping tolerance on the maximal KKT violation
    pub tol: f64,
    /// Maximum number of SMO pair updates
    pub max_iter: usize,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::Linear,
            gamma: None,
            tol: 1e-3,
            max_iter: 100_000,
        }
    }
}

impl ModelAdapter for SVMConfig {
    fn kind(&self) -> ModelKind {
        ModelKind::SVM
    }

    fn validate(&self) -> Result<()> {
        if !(self.c > 0.0) || !self.c.is_finite() {
            return Err(ClassifyError::InvalidConfig(format!(
                "SVM C must be positive, got {}",
                self.c
            )));
        }
        if let Some(gamma) = self.gamma {
            if !(gamma > 0.0) {
                return Err(ClassifyError::InvalidConfig(format!(
                    "SVM gamma must be positive, got {}",
                    gamma
                )));
            }
        }
        if let KernelType::Polynomial { degree: 0, .. } = self.kernel {
            return Err(ClassifyError::InvalidConfig(
                "polynomial degree must be at least 1".to_string(),
            ));
        }
        if !(self.tol > 0.0) || self.max_iter == 0 {
            return Err(ClassifyError::InvalidConfig(
                "SVM tol and max_iter must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, pool: &WorkerPool) -> Result<Box<dyn TrainedModel>> {
        Ok(Box::new(SVMClassifier::fit(self, x, y, pool)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Kernel {
    kind: KernelType,
    gamma: f64,
}

impl Kernel {
    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self.kind {
            KernelType::Linear => a.dot(&b),
            KernelType::Polynomial { degree, coef0 } => {
                (self.gamma * a.dot(&b) + coef0).powi(degree as i32)
            }
            KernelType::Rbf => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                (-self.gamma * sq).exp()
            }
        }
    }
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    kernel: Kernel,
    scaler: Standardizer,
    support_vectors: Array2<f64>,
    /// `alpha_i * y_i` for every support vector
    dual_coef: Array1<f64>,
    bias: f64,
    /// SMO pair updates used
    pub n_iter: usize,
}

impl SVMClassifier {
    pub fn fit(config: &SVMConfig, x: &Array2<f64>, y: &Array1<f64>, pool: &WorkerPool) -> Result<Self> {
        let n = x.nrows();
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(ClassifyError::InvalidConfig(format!(
                "SVM training set has {} samples, exceeding the maximum {} for the kernel matrix",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }

        let (scaler, z) = Standardizer::fit_transform(x)?;
        let kernel = Kernel {
            kind: config.kernel.clone(),
            gamma: config.gamma.unwrap_or(1.0 / z.ncols() as f64),
        };
        let signs: Array1<f64> = y.mapv(|v| if v == 1.0 { 1.0 } else { -1.0 });

        // Precompute kernel matrix rows on the pool
        let rows: Vec<Vec<f64>> = pool.install(|| {
            (0..n)
                .into_par_iter()
                .map(|i| (0..n).map(|j| kernel.eval(z.row(i), z.row(j))).collect())
                .collect()
        });
        let k = Array2::from_shape_vec((n, n), rows.into_iter().flatten().collect())?;

        let c = config.c;
        let mut alphas: Array1<f64> = Array1::zeros(n);
        // Dual gradient: G = Q alpha - 1
        let mut grad: Array1<f64> = Array1::from_elem(n, -1.0);

        let in_up = |a: f64, s: f64| (s > 0.0 && a < c) || (s < 0.0 && a > 0.0);
        let in_low = |a: f64, s: f64| (s > 0.0 && a > 0.0) || (s < 0.0 && a < c);

        let mut iter = 0;
        let (m_up, m_low) = loop {
            let mut i = usize::MAX;
            let mut j = usize::MAX;
            let mut m_up = f64::NEG_INFINITY;
            let mut m_low = f64::INFINITY;
            for t in 0..n {
                let v = -signs[t] * grad[t];
                if in_up(alphas[t], signs[t]) && v > m_up {
                    m_up = v;
                    i = t;
                }
                if in_low(alphas[t], signs[t]) && v < m_low {
                    m_low = v;
                    j = t;
                }
            }

            if i == usize::MAX || j == usize::MAX || m_up - m_low < config.tol {
                break (m_up, m_low);
            }
            if iter >= config.max_iter {
                return Err(ClassifyError::ConvergenceError {
                    model: "SVM".to_string(),
                    iterations: iter,
                });
            }
            iter += 1;

            // Move alpha_i by +y_i*t and alpha_j by -y_j*t
            let curvature = (k[[i, i]] + k[[j, j]] - 2.0 * k[[i, j]]).max(1e-12);
            let mut t = (m_up - m_low) / curvature;
            t = t.min(if signs[i] > 0.0 { c - alphas[i] } else { alphas[i] });
            t = t.min(if signs[j] > 0.0 { alphas[j] } else { c - alphas[j] });

            alphas[i] += signs[i] * t;
            alphas[j] -= signs[j] * t;
            alphas[i] = alphas[i].clamp(0.0, c);
            alphas[j] = alphas[j].clamp(0.0, c);

            for s in 0..n {
                grad[s] += signs[s] * t * (k[[s, i]] - k[[s, j]]);
            }
        };

        // Bias from free support vectors, else the middle of the feasible range
        let free: Vec<usize> = (0..n)
            .filter(|&t| alphas[t] > 1e-12 && alphas[t] < c - 1e-12)
            .collect();
        let rho = if !free.is_empty() {
            free.iter().map(|&t| signs[t] * grad[t]).sum::<f64>() / free.len() as f64
        } else if m_up.is_finite() && m_low.is_finite() {
            -(m_up + m_low) / 2.0
        } else {
            0.0
        };

        let support: Vec<usize> = (0..n).filter(|&t| alphas[t] > 1e-12).collect();
        let mut support_vectors = Array2::zeros((support.len(), z.ncols()));
        let mut dual_coef = Array1::zeros(support.len());
        for (row, &idx) in support.iter().enumerate() {
            support_vectors.row_mut(row).assign(&z.row(idx));
            dual_coef[row] = alphas[idx] * signs[idx];
        }

        debug!(iterations = iter, n_support = support.len(), "SVM converged");
        Ok(Self {
            kernel,
            scaler,
            support_vectors,
            dual_coef,
            bias: -rho,
            n_iter: iter,
        })
    }

    pub fn n_support(&self) -> usize {
        self.support_vectors.nrows()
    }

    /// Signed distance-like score; positive favours the positive class
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_features(x, self.scaler.means().len())?;
        let z = self.scaler.transform(x)?;
        let scores: Vec<f64> = (0..z.nrows())
            .into_par_iter()
            .map(|i| {
                self.support_vectors
                    .rows()
                    .into_iter()
                    .zip(self.dual_coef.iter())
                    .map(|(sv, &coef)| coef * self.kernel.eval(sv, z.row(i)))
                    .sum::<f64>()
                    + self.bias
            })
            .collect();
        Ok(Array1::from_vec(scores))
    }
}

impl TrainedModel for SVMClassifier {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(|d| if d > 0.0 { 1.0 } else { 0.0 }))
    }

    fn positive_scores(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        self.decision_function(x).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 1.0],
            [1.5, 2.0],
            [2.0, 1.0],
            [1.0, 2.5],
            [6.0, 6.0],
            [6.5, 7.0],
            [7.0, 6.0],
            [6.0, 7.5],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_linear_svm_separates() {
        let pool = WorkerPool::with_threads(2).unwrap();
        let (x, y) = separable();
        let svm = SVMClassifier::fit(&SVMConfig::default(), &x, &y, &pool).unwrap();

        assert_eq!(svm.predict(&x).unwrap(), y);
        assert!(svm.n_support() >= 2);
        let scores = svm.decision_function(&x).unwrap();
        assert!(scores[0] < 0.0 && scores[4] > 0.0);
    }

    #[test]
    fn test_rbf_svm_separates() {
        let pool = WorkerPool::with_threads(2).unwrap();
        let (x, y) = separable();
        let config = SVMConfig {
            kernel: KernelType::Rbf,
            c: 10.0,
            ..Default::default()
        };
        let svm = SVMClassifier::fit(&config, &x, &y, &pool).unwrap();
        assert_eq!(svm.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_iteration_budget() {
        let pool = WorkerPool::with_threads(1).unwrap();
        let (x, y) = separable();
        let config = SVMConfig {
            max_iter: 1,
            tol: 1e-12,
            ..Default::default()
        };
        let err = SVMClassifier::fit(&config, &x, &y, &pool).unwrap_err();
        assert!(matches!(err, ClassifyError::ConvergenceError { .. }));
    }

    #[test]
    fn test_invalid_c() {
        let config = SVMConfig {
            c: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClassifyError::InvalidConfig(_))));
    }
}
