//! Data preprocessing module
//!
//! Provides the steps between a loaded dataset and model input:
//! - Categorical encoding (ordinal codes, one-hot indicators)
//! - Z-score standardization fitted on training rows
//! - Seeded holdout partitioning
//! - Sequential forward feature selection

mod encoder;
mod partition;
mod scaler;
pub mod feature_selection;

pub use encoder::{EncodedMatrix, Encoding, FeatureEncoder};
pub use feature_selection::{
    top_k_features, SelectionConfig, SelectionResult, SelectionStep, SequentialFeatureSelector,
};
pub use partition::HoldoutPartition;
pub use scaler::Standardizer;
