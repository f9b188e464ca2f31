//! Model kinds

use crate::error::{ClassifyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The classifier families a comparison can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Multilayer perceptron
    NeuralNetwork,
    /// Logistic Regression
    LogisticRegression,
    /// Linear discriminant analysis
    DiscriminantAnalysis,
    /// K-Nearest Neighbors
    #[serde(rename = "knn")]
    KNN,
    /// Gaussian naive Bayes
    NaiveBayes,
    /// Support Vector Machine
    #[serde(rename = "svm")]
    SVM,
    /// Decision Tree
    DecisionTree,
    /// Bagged tree ensemble
    TreeEnsemble,
}

impl ModelKind {
    /// Every kind, in report order
    pub const ALL: [ModelKind; 8] = [
        ModelKind::NeuralNetwork,
        ModelKind::LogisticRegression,
        ModelKind::DiscriminantAnalysis,
        ModelKind::KNN,
        ModelKind::NaiveBayes,
        ModelKind::SVM,
        ModelKind::DecisionTree,
        ModelKind::TreeEnsemble,
    ];

    /// Short identifier used on the command line and in config files
    pub fn id(&self) -> &'static str {
        match self {
            ModelKind::NeuralNetwork => "neural_network",
            ModelKind::LogisticRegression => "logistic_regression",
            ModelKind::DiscriminantAnalysis => "discriminant_analysis",
            ModelKind::KNN => "knn",
            ModelKind::NaiveBayes => "naive_bayes",
            ModelKind::SVM => "svm",
            ModelKind::DecisionTree => "decision_tree",
            ModelKind::TreeEnsemble => "tree_ensemble",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModelKind::NeuralNetwork => "Neural Network",
            ModelKind::LogisticRegression => "Logistic Regression",
            ModelKind::DiscriminantAnalysis => "Discriminant Analysis",
            ModelKind::KNN => "k-NN",
            ModelKind::NaiveBayes => "Naive Bayes",
            ModelKind::SVM => "SVM",
            ModelKind::DecisionTree => "Decision Tree",
            ModelKind::TreeEnsemble => "Tree Ensemble",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for ModelKind {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase().replace(['-', ' '], "_");
        let kind = match key.as_str() {
            "neural_network" | "nn" | "mlp" => ModelKind::NeuralNetwork,
            "logistic_regression" | "logistic" | "logit" => ModelKind::LogisticRegression,
            "discriminant_analysis" | "discriminant" | "lda" => ModelKind::DiscriminantAnalysis,
            "knn" | "k_nn" => ModelKind::KNN,
            "naive_bayes" | "nb" => ModelKind::NaiveBayes,
            "svm" => ModelKind::SVM,
            "decision_tree" | "tree" => ModelKind::DecisionTree,
            "tree_ensemble" | "ensemble" | "random_forest" | "bagging" => ModelKind::TreeEnsemble,
            _ => {
                return Err(ClassifyError::InvalidArgument(format!(
                    "unknown model '{}'",
                    s
                )))
            }
        };
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids_and_aliases() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.id().parse::<ModelKind>().unwrap(), kind);
        }
        assert_eq!("Random-Forest".parse::<ModelKind>().unwrap(), ModelKind::TreeEnsemble);
        assert_eq!("LDA".parse::<ModelKind>().unwrap(), ModelKind::DiscriminantAnalysis);
        assert!("perceptron".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_serde_uses_ids() {
        let json = serde_json::to_string(&ModelKind::NaiveBayes).unwrap();
        assert_eq!(json, "\"naive_bayes\"");
        let kind: ModelKind = serde_json::from_str("\"tree_ensemble\"").unwrap();
        assert_eq!(kind, ModelKind::TreeEnsemble);
        for kind in ModelKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.id()));
        }
    }
}
