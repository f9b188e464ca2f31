//! Feature scaling
//!
//! Z-score scaling fitted on training rows only. Used inside the distance and
//! gradient based adapters so that every model sees the same raw encoding.

use crate::error::{ClassifyError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Fitted z-score scaler: `(x - mean) / std`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Standardizer {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl Standardizer {
    /// Fit column means and standard deviations; constant columns keep scale 1
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(ClassifyError::InvalidArgument(
                "cannot fit a scaler on zero rows".to_string(),
            ));
        }
        let means = x
            .mean_axis(Axis(0))
            .ok_or_else(|| ClassifyError::InvalidArgument("empty matrix".to_string()))?;
        let scales = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
        Ok(Self { means, scales })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.means.len() {
            return Err(ClassifyError::ShapeError {
                expected: format!("{} columns", self.means.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        Ok((x - &self.means) / &self.scales)
    }

    pub fn fit_transform(x: &Array2<f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(x)?;
        let scaled = scaler.transform(x)?;
        Ok((scaler, scaled))
    }

    pub fn means(&self) -> &Array1<f64> {
        &self.means
    }

    pub fn scales(&self) -> &Array1<f64> {
        &self.scales
    }
}
