//! Adapter and trained-model traits

use crate::error::{ClassifyError, Result};
use crate::preprocessing::Encoding;
use crate::training::random_forest::EnsembleDiagnostics;
use crate::training::ModelKind;
use crate::utils::WorkerPool;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A fitted classifier. Prediction never mutates the model.
pub trait TrainedModel: Send + Sync {
    /// Predict 0/1 labels
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Score of the positive class, higher means more positive
    fn positive_scores(&self, _x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        Ok(None)
    }

    /// Out-of-bag diagnostics, for ensembles only
    fn ensemble_diagnostics(&self) -> Option<&EnsembleDiagnostics> {
        None
    }
}

/// Capability set of one classifier family
pub trait ModelAdapter: Send + Sync {
    fn kind(&self) -> ModelKind;

    /// Input encoding the adapter expects
    fn encoding(&self) -> Encoding {
        Encoding::OrdinalCodes
    }

    /// Check hyperparameters that do not depend on the data
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Fit on data that has already been checked and holds both classes
    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, pool: &WorkerPool) -> Result<Box<dyn TrainedModel>>;

    /// Validate inputs and fit. A single-class label vector yields a
    /// [`ConstantModel`] for that class.
    fn train(&self, x: &Array2<f64>, y: &Array1<f64>, pool: &WorkerPool) -> Result<Box<dyn TrainedModel>> {
        self.validate()?;
        check_training_data(x, y)?;

        let positives = y.iter().filter(|&&v| v == 1.0).count();
        if positives == 0 || positives == y.len() {
            let class = if positives == 0 { 0.0 } else { 1.0 };
            debug!(model = %self.kind(), class, "Single-class training labels, using constant model");
            return Ok(Box::new(ConstantModel::new(class, x.ncols())));
        }

        self.fit(x, y, pool)
    }
}

/// Shape, label and finiteness checks shared by every adapter
pub fn check_training_data(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(ClassifyError::InvalidArgument(format!(
            "training matrix is empty ({} x {})",
            x.nrows(),
            x.ncols()
        )));
    }
    if x.nrows() != y.len() {
        return Err(ClassifyError::ShapeError {
            expected: format!("{} labels", x.nrows()),
            actual: format!("{} labels", y.len()),
        });
    }
    if let Some(bad) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
        return Err(ClassifyError::InvalidArgument(format!(
            "labels must be 0 or 1, found {}",
            bad
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ClassifyError::InvalidArgument(
            "training matrix contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Column count check for prediction inputs
pub fn check_features(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(ClassifyError::ShapeError {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Model that always predicts the single class it was trained on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantModel {
    class: f64,
    n_features: usize,
}

impl ConstantModel {
    pub fn new(class: f64, n_features: usize) -> Self {
        Self { class, n_features }
    }

    pub fn class(&self) -> f64 {
        self.class
    }
}

impl TrainedModel for ConstantModel {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_features(x, self.n_features)?;
        Ok(Array1::from_elem(x.nrows(), self.class))
    }

    fn positive_scores(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        self.predict(x).map(Some)
    }
}

/// Numerically stable logistic function
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Positive where the score exceeds `cut`
pub(crate) fn threshold(scores: &Array1<f64>, cut: f64) -> Array1<f64> {
    scores.mapv(|s| if s > cut { 1.0 } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct FailingAdapter;

    impl ModelAdapter for FailingAdapter {
        fn kind(&self) -> ModelKind {
            ModelKind::SVM
        }

        fn fit(&self, _x: &Array2<f64>, _y: &Array1<f64>, _pool: &WorkerPool) -> Result<Box<dyn TrainedModel>> {
            Err(ClassifyError::InvalidConfig("always fails".to_string()))
        }
    }

    #[test]
    fn test_single_class_returns_constant_model() {
        let pool = WorkerPool::with_threads(1).unwrap();
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let model = FailingAdapter.train(&x, &array![1.0, 1.0], &pool).unwrap();
        assert_eq!(model.predict(&x).unwrap().to_vec(), vec![1.0, 1.0]);

        // Two classes reach fit
        assert!(FailingAdapter.train(&x, &array![0.0, 1.0], &pool).is_err());
    }

    #[test]
    fn test_training_data_checks() {
        let x = array![[1.0], [2.0]];
        assert!(matches!(
            check_training_data(&x, &array![0.0]),
            Err(ClassifyError::ShapeError { .. })
        ));
        assert!(matches!(
            check_training_data(&x, &array![0.0, 2.0]),
            Err(ClassifyError::InvalidArgument(_))
        ));
        assert!(check_training_data(&array![[f64::NAN], [1.0]], &array![0.0, 1.0]).is_err());
        assert!(check_training_data(&Array2::zeros((0, 2)), &Array1::zeros(0)).is_err());
        assert!(check_training_data(&x, &array![0.0, 1.0]).is_ok());
    }

    #[test]
    fn test_constant_model_checks_width() {
        let model = ConstantModel::new(0.0, 3);
        assert!(model.predict(&Array2::zeros((2, 2))).is_err());
        let scores = model.positive_scores(&Array2::zeros((2, 3))).unwrap().unwrap();
        assert_eq!(scores.to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(-1000.0) >= 0.0);
        assert!(sigmoid(1000.0) <= 1.0);
    }
}
