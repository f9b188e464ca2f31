//! Marketing classifiers - holdout comparison of binary classifiers
//!
//! This crate compares eight classifier families on one seeded holdout split
//! of a tabular marketing dataset:
//! - Data loading with column types decided once at load time
//! - Ordinal and one-hot encoding, standardization, holdout partitioning
//! - Neural network, logistic regression, discriminant analysis, k-NN,
//!   naive Bayes, SVM, decision tree and a bagged tree ensemble
//! - Confusion matrices, ROC curves and AUC
//! - Sequential forward feature selection and ensemble-size tuning
//!
//! # Modules
//!
//! - [`utils`] - Data loading, worker pool, timing
//! - [`preprocessing`] - Encoding, scaling, partitioning, feature selection
//! - [`training`] - Model adapters and trained models
//! - [`evaluation`] - Confusion matrix, ROC curve
//! - [`comparison`] - Comparison runner
//! - [`report`] - Side-by-side report, text table and JSON
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use marketing_classifiers::prelude::*;
//!
//! # fn main() -> marketing_classifiers::Result<()> {
//! let dataset = DataLoader::new(LoadOptions::bank_marketing()).load("bank.csv")?;
//! let config = ComparisonConfig::default();
//! let pool = WorkerPool::new(&config.parallel_config())?;
//! let report = Comparison::new(config).run(&dataset, &pool)?;
//! println!("{}", report.render_table());
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Data and preprocessing
pub mod utils;
pub mod preprocessing;

// Models and evaluation
pub mod training;
pub mod evaluation;

// Orchestration
pub mod comparison;
pub mod report;

// Services
pub mod cli;

pub use error::{ClassifyError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ClassifyError, Result};

    // Data
    pub use crate::utils::{Column, DataLoader, Dataset, Feature, LabelSet, LoadOptions, ParallelConfig, WorkerPool};

    // Preprocessing
    pub use crate::preprocessing::{
        EncodedMatrix, Encoding, FeatureEncoder, HoldoutPartition, SelectionConfig, SelectionResult,
        SequentialFeatureSelector, Standardizer,
    };

    // Training
    pub use crate::training::{AdapterConfigs, CostMatrix, EnsembleConfig, ModelAdapter, ModelKind, TrainedModel};

    // Evaluation
    pub use crate::evaluation::{confusion_matrix, roc_curve, ConfusionMatrix, RocCurve};

    // Comparison
    pub use crate::comparison::{Comparison, ComparisonConfig, EnsembleTuning};
    pub use crate::report::{ComparisonReport, ModelFailure, ModelOutcome, ModelResult, Stage};
}
