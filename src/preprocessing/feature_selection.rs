//! Sequential forward feature selection
//!
//! Greedy search over original features: each round scores every remaining
//! candidate with a k-fold misclassification rate of a designated adapter
//! and keeps the best one while it improves the criterion.

use crate::error::{ClassifyError, Result};
use crate::preprocessing::EncodedMatrix;
use crate::training::{CVSplit, CVStrategy, CrossValidator, ModelAdapter, ModelKind};
use crate::utils::WorkerPool;
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Settings of the selection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Adapter retrained to score each subset
    pub model: ModelKind,
    /// Features forced in from the prior importance ranking
    pub top_k: usize,
    pub n_folds: usize,
    /// Minimum criterion decrease for a candidate to be added
    pub tolerance: f64,
    /// Round budget (None = until no candidate improves)
    pub max_steps: Option<usize>,
    pub seed: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::TreeEnsemble,
            top_k: 5,
            n_folds: 5,
            tolerance: 1e-6,
            max_steps: None,
            seed: 42,
        }
    }
}

impl SelectionConfig {
    pub fn with_model(mut self, model: ModelKind) -> Self {
        self.model = model;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_folds < 2 {
            return Err(ClassifyError::InvalidConfig(format!(
                "selection needs at least 2 folds, got {}",
                self.n_folds
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(ClassifyError::InvalidConfig(format!(
                "selection tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// One accepted round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionStep {
    /// Original feature index added this round
    pub added: usize,
    /// Criterion of the subset after adding it
    pub criterion: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Inclusion flag per original feature
    pub included: Vec<bool>,
    pub history: Vec<SelectionStep>,
    /// Criterion of the forced-include subset (`+inf` when it is empty)
    pub initial_criterion: f64,
}

impl SelectionResult {
    pub fn selected_indices(&self) -> Vec<usize> {
        self.included
            .iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn final_criterion(&self) -> f64 {
        self.history
            .last()
            .map(|s| s.criterion)
            .unwrap_or(self.initial_criterion)
    }
}

/// The `k` most important features; NaN importances rank last, ties go to
/// the lower index
pub fn top_k_features(importance: &Array1<f64>, k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..importance.len()).collect();
    order.sort_by(|&a, &b| {
        let (ia, ib) = (importance[a], importance[b]);
        match (ia.is_nan(), ib.is_nan()) {
            (true, true) => a.cmp(&b),
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => ib.total_cmp(&ia).then(a.cmp(&b)),
        }
    });
    order.truncate(k);
    order
}

/// Greedy sequential forward selection
#[derive(Debug, Clone)]
pub struct SequentialFeatureSelector {
    config: SelectionConfig,
}

impl SequentialFeatureSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Folds shared by every subset scored in one search
    fn folds(&self, data: &EncodedMatrix) -> Result<Vec<CVSplit>> {
        CrossValidator::new(CVStrategy::StratifiedKFold {
            n_splits: self.config.n_folds,
            shuffle: true,
        })
        .with_random_state(self.config.seed)
        .split(&data.y)
    }

    /// Pooled k-fold misclassification rate of `adapter` on the subset
    pub fn criterion(
        &self,
        data: &EncodedMatrix,
        included: &[bool],
        adapter: &dyn ModelAdapter,
        pool: &WorkerPool,
    ) -> Result<f64> {
        let folds = self.folds(data)?;
        subset_error(data, included, &folds, adapter, pool)
    }

    /// Run the search from the `forced` subset. `data` must be encoded the
    /// way `adapter` expects.
    pub fn select(
        &self,
        data: &EncodedMatrix,
        adapter: &dyn ModelAdapter,
        forced: &[bool],
        pool: &WorkerPool,
    ) -> Result<SelectionResult> {
        self.config.validate()?;
        adapter.validate()?;
        if forced.len() != data.n_features {
            return Err(ClassifyError::InvalidArgument(format!(
                "forced subset has {} entries, data has {} features",
                forced.len(),
                data.n_features
            )));
        }
        if data.encoding != adapter.encoding() {
            return Err(ClassifyError::InvalidArgument(format!(
                "{} expects {} input, got {}",
                adapter.kind(),
                adapter.encoding(),
                data.encoding
            )));
        }

        let folds = self.folds(data)?;
        let mut included = forced.to_vec();
        let mut current = if included.iter().any(|&b| b) {
            subset_error(data, &included, &folds, adapter, pool)?
        } else {
            f64::INFINITY
        };
        let initial_criterion = current;
        let mut history = Vec::new();
        info!(
            model = %adapter.kind(),
            forced = included.iter().filter(|&&b| b).count(),
            criterion = initial_criterion,
            "Starting sequential feature selection"
        );

        let budget = self.config.max_steps.unwrap_or(usize::MAX);
        while history.len() < budget {
            let candidates: Vec<usize> = (0..data.n_features).filter(|&j| !included[j]).collect();
            if candidates.is_empty() {
                break;
            }

            let scored: Vec<(usize, f64)> = pool.install(|| {
                candidates
                    .par_iter()
                    .map(|&j| {
                        let mut trial = included.clone();
                        trial[j] = true;
                        match subset_error(data, &trial, &folds, adapter, pool) {
                            Ok(err) => {
                                debug!(feature = j, criterion = err, "Scored candidate");
                                (j, err)
                            }
                            Err(e) => {
                                warn!(feature = j, error = %e, "Candidate evaluation failed");
                                (j, f64::INFINITY)
                            }
                        }
                    })
                    .collect()
            });

            let (best, best_err) = scored
                .iter()
                .fold((usize::MAX, f64::INFINITY), |acc, &(j, err)| {
                    if err < acc.1 || (err == acc.1 && j < acc.0) {
                        (j, err)
                    } else {
                        acc
                    }
                });

            if best == usize::MAX || !(best_err < current - self.config.tolerance) {
                debug!(best_criterion = best_err, current, "No candidate improves the criterion");
                break;
            }

            included[best] = true;
            current = best_err;
            history.push(SelectionStep { added: best, criterion: best_err });
            info!(step = history.len(), feature = best, criterion = best_err, "Added feature");
        }

        Ok(SelectionResult { included, history, initial_criterion })
    }
}

fn subset_error(
    data: &EncodedMatrix,
    included: &[bool],
    folds: &[CVSplit],
    adapter: &dyn ModelAdapter,
    pool: &WorkerPool,
) -> Result<f64> {
    let subset = data.select_features(included)?;
    let (errors, total) = pool.install(|| -> Result<(usize, usize)> {
        let mut errors = 0usize;
        let mut total = 0usize;
        for fold in folds {
            let train = subset.select_rows(&fold.train_indices);
            let valid = subset.select_rows(&fold.test_indices);
            let model = adapter.train(&train.x, &train.y, pool)?;
            let predicted = model.predict(&valid.x)?;
            errors += predicted
                .iter()
                .zip(valid.y.iter())
                .filter(|(p, t)| p != t)
                .count();
            total += valid.n_rows();
        }
        Ok((errors, total))
    })?;
    if total == 0 {
        return Err(ClassifyError::InvalidArgument(
            "cross-validation produced no validation rows".to_string(),
        ));
    }
    Ok(errors as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::{Encoding, FeatureEncoder};
    use crate::training::TreeConfig;
    use crate::utils::{Dataset, Feature, LabelSet};
    use ndarray::array;

    fn dominant_dataset() -> Dataset {
        let n = 60;
        let labels: Array1<f64> = (0..n).map(|i| (i % 2) as f64).collect();
        let signal: Vec<f64> = (0..n).map(|i| (i % 2) as f64 * 10.0 + (i % 7) as f64 * 0.1).collect();
        let noise_a: Vec<f64> = (0..n).map(|i| ((i * 7919) % 13) as f64).collect();
        let noise_b: Vec<f64> = (0..n).map(|i| ((i * 104729) % 11) as f64).collect();
        let noise_c: Vec<&str> = (0..n).map(|i| ["a", "b", "c"][(i / 2) % 3]).collect();
        Dataset::new(
            vec![
                Feature::numeric("noise_a", noise_a),
                Feature::numeric("signal", signal),
                Feature::numeric("noise_b", noise_b),
                Feature::categorical("noise_c", noise_c),
            ],
            "y",
            LabelSet::default(),
            labels,
        )
        .unwrap()
    }

    #[test]
    fn test_top_k_features() {
        let importance = array![0.5, f64::NAN, 2.0, 0.5, 1.0];
        assert_eq!(top_k_features(&importance, 3), vec![2, 4, 0]);
        assert_eq!(top_k_features(&importance, 10), vec![2, 4, 0, 3, 1]);
        assert!(top_k_features(&importance, 0).is_empty());
    }

    #[test]
    fn test_selects_dominant_feature() {
        let dataset = dominant_dataset();
        let (_, data) = FeatureEncoder::fit_transform(&dataset, Encoding::OrdinalCodes).unwrap();
        let pool = WorkerPool::with_threads(2).unwrap();
        let selector = SequentialFeatureSelector::new(
            SelectionConfig::default()
                .with_model(ModelKind::DecisionTree)
                .with_max_steps(4),
        );

        let result = selector
            .select(&data, &TreeConfig::default(), &[false; 4], &pool)
            .unwrap();

        assert!(result.included[1]);
        assert_eq!(result.history[0].added, 1);
        assert_eq!(result.history[0].criterion, 0.0);
        assert!(result.included.iter().filter(|&&b| !b).count() >= 1);
        assert!(result.history.len() <= 4);
        assert!(result.initial_criterion.is_infinite());
        assert_eq!(result.final_criterion(), 0.0);
    }

    #[test]
    fn test_forced_features_stay_included() {
        let dataset = dominant_dataset();
        let (_, data) = FeatureEncoder::fit_transform(&dataset, Encoding::OrdinalCodes).unwrap();
        let pool = WorkerPool::with_threads(1).unwrap();
        let selector = SequentialFeatureSelector::new(SelectionConfig::default().with_max_steps(1));

        let forced = [true, false, false, false];
        let result = selector
            .select(&data, &TreeConfig::default(), &forced, &pool)
            .unwrap();
        assert!(result.included[0]);
        assert!(result.initial_criterion.is_finite());
        assert!(result.history.len() <= 1);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let dataset = dominant_dataset();
        let (_, data) = FeatureEncoder::fit_transform(&dataset, Encoding::OrdinalCodes).unwrap();
        let pool = WorkerPool::with_threads(1).unwrap();
        let selector = SequentialFeatureSelector::new(SelectionConfig::default());

        assert!(matches!(
            selector.select(&data, &TreeConfig::default(), &[false; 3], &pool),
            Err(ClassifyError::InvalidArgument(_))
        ));
        assert!(matches!(
            selector.criterion(&data, &[false; 4], &TreeConfig::default(), &pool),
            Err(ClassifyError::InvalidArgument(_))
        ));

        let bad = SequentialFeatureSelector::new(SelectionConfig::default().with_folds(1));
        assert!(matches!(
            bad.select(&data, &TreeConfig::default(), &[false; 4], &pool),
            Err(ClassifyError::InvalidConfig(_))
        ));
    }
}
