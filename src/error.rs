//! Error types for the classifier comparison workflow

use thiserror::Error;

/// Result type alias for comparison operations
pub type Result<T> = std::result::Result<T, ClassifyError>;

/// Main error type
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// Malformed input file
    #[error("Format error: {0}")]
    FormatError(String),

    /// Bad argument to a pipeline operation (partition fraction, empty subset, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Hyperparameters invalid for the adapter
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Iterative optimizer ran out of its iteration budget
    #[error("{model} did not converge after {iterations} iterations")]
    ConvergenceError { model: String, iterations: usize },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),
}

impl ClassifyError {
    /// Short machine-friendly name of the error category
    pub fn category(&self) -> &'static str {
        match self {
            ClassifyError::FormatError(_) => "format",
            ClassifyError::InvalidArgument(_) => "invalid_argument",
            ClassifyError::InvalidConfig(_) => "invalid_config",
            ClassifyError::ConvergenceError { .. } => "convergence",
            ClassifyError::ShapeError { .. } => "shape",
            ClassifyError::ModelNotFitted => "not_fitted",
            ClassifyError::IoError(_) => "io",
            ClassifyError::SerializationError(_) => "serialization",
            ClassifyError::ThreadPoolError(_) => "thread_pool",
        }
    }
}

impl From<csv::Error> for ClassifyError {
    fn from(err: csv::Error) -> Self {
        ClassifyError::FormatError(err.to_string())
    }
}

impl From<serde_json::Error> for ClassifyError {
    fn from(err: serde_json::Error) -> Self {
        ClassifyError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ClassifyError {
    fn from(err: ndarray::ShapeError) -> Self {
        ClassifyError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
