//! Model training module
//!
//! Eight binary classifier families behind one adapter contract:
//! - Neural network (MLP)
//! - Logistic regression
//! - Linear discriminant analysis
//! - K-Nearest Neighbors
//! - Gaussian Naive Bayes
//! - Support Vector Machine
//! - Decision tree
//! - Bagged tree ensemble with out-of-bag diagnostics

mod config;
mod models;
pub mod cross_validation;
pub mod decision_tree;
pub mod discriminant;
pub mod knn;
pub mod linear_models;
pub mod naive_bayes;
pub mod neural_network;
pub mod random_forest;
pub mod svm;

pub use config::ModelKind;
pub use cross_validation::{CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::{Criterion, DecisionTree, TreeConfig, TreeNode};
pub use discriminant::{DiscriminantConfig, LinearDiscriminant, Prior};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig, WeightScheme};
pub use linear_models::{LogisticConfig, LogisticRegression};
pub use models::{check_features, check_training_data, ConstantModel, ModelAdapter, TrainedModel};
pub use naive_bayes::{GaussianNaiveBayes, NaiveBayesConfig};
pub use neural_network::{Activation, MLPClassifier, MLPConfig};
pub use random_forest::{CostMatrix, EnsembleConfig, EnsembleDiagnostics, MaxFeatures, TreeEnsemble};
pub use svm::{KernelType, SVMClassifier, SVMConfig};

use serde::{Deserialize, Serialize};

/// Hyperparameters of every adapter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfigs {
    pub neural_network: MLPConfig,
    pub logistic_regression: LogisticConfig,
    pub discriminant_analysis: DiscriminantConfig,
    pub knn: KNNConfig,
    pub naive_bayes: NaiveBayesConfig,
    pub svm: SVMConfig,
    pub decision_tree: TreeConfig,
    pub tree_ensemble: EnsembleConfig,
}

impl AdapterConfigs {
    /// Adapter for a model kind, configured from these settings
    pub fn adapter(&self, kind: ModelKind) -> Box<dyn ModelAdapter> {
        match kind {
            ModelKind::NeuralNetwork => Box::new(self.neural_network.clone()),
            ModelKind::LogisticRegression => Box::new(self.logistic_regression.clone()),
            ModelKind::DiscriminantAnalysis => Box::new(self.discriminant_analysis.clone()),
            ModelKind::KNN => Box::new(self.knn.clone()),
            ModelKind::NaiveBayes => Box::new(self.naive_bayes.clone()),
            ModelKind::SVM => Box::new(self.svm.clone()),
            ModelKind::DecisionTree => Box::new(self.decision_tree.clone()),
            ModelKind::TreeEnsemble => Box::new(self.tree_ensemble.clone()),
        }
    }

    /// Give every seeded adapter the same seed
    pub fn reseed(&mut self, seed: u64) {
        self.neural_network.seed = seed;
        self.decision_tree.seed = seed;
        self.tree_ensemble.seed = seed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_kinds_match() {
        let configs = AdapterConfigs::default();
        for kind in ModelKind::ALL {
            let adapter = configs.adapter(kind);
            assert_eq!(adapter.kind(), kind);
            assert!(adapter.validate().is_ok(), "default {} config must be valid", kind);
        }
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let configs: AdapterConfigs =
            serde_json::from_str(r#"{ "knn": { "n_neighbors": 9 }, "tree_ensemble": { "n_trees": 25 } }"#).unwrap();
        assert_eq!(configs.knn.n_neighbors, 9);
        assert_eq!(configs.knn.metric, "euclidean");
        assert_eq!(configs.tree_ensemble.n_trees, 25);
        assert_eq!(configs.svm.c, 1.0);
    }
}
