//! Bagged tree ensemble
//!
//! Bootstrap-aggregated CART trees with random feature subsets per split.
//! Out-of-bag error and permutation importance are collected while the trees
//! are grown, and the final decision uses a misclassification cost matrix.

use super::decision_tree::{Criterion, DecisionTree, TreeConfig};
use crate::error::{ClassifyError, Result};
use crate::training::models::{check_features, ModelAdapter, TrainedModel};
use crate::training::ModelKind;
use crate::utils::WorkerPool;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        }
        .clamp(1, n_features.max(1))
    }
}

/// Misclassification costs; true negatives and true positives cost nothing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostMatrix {
    /// Cost of predicting positive for a negative row
    pub false_positive: f64,
    /// Cost of predicting negative for a positive row
    pub false_negative: f64,
}

impl Default for CostMatrix {
    fn default() -> Self {
        Self {
            false_positive: 1.0,
            false_negative: 5.0,
        }
    }
}

impl CostMatrix {
    /// Equal costs, i.e. majority vote
    pub fn uniform() -> Self {
        Self {
            false_positive: 1.0,
            false_negative: 1.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ok = |c: f64| c.is_finite() && c >= 0.0;
        if !ok(self.false_positive) || !ok(self.false_negative) {
            return Err(ClassifyError::InvalidConfig(format!(
                "costs must be finite and non-negative, got FP={} FN={}",
                self.false_positive, self.false_negative
            )));
        }
        if self.false_positive + self.false_negative <= 0.0 {
            return Err(ClassifyError::InvalidConfig(
                "cost matrix is all zeros".to_string(),
            ));
        }
        Ok(())
    }

    /// Class with the lower expected cost given the positive share `p`
    pub fn decide(&self, p: f64) -> f64 {
        if p * self.false_negative > (1.0 - p) * self.false_positive {
            1.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub n_trees: usize,
    pub max_features: MaxFeatures,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub criterion: Criterion,
    pub cost: CostMatrix,
    /// Compute out-of-bag permutation importance while growing
    pub compute_importance: bool,
    pub seed: u64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_features: MaxFeatures::Sqrt,
            max_depth: None,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
            cost: CostMatrix::default(),
            compute_importance: true,
            seed: 42,
        }
    }
}

impl EnsembleConfig {
    pub fn with_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    pub fn with_cost(mut self, cost: CostMatrix) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn tree_config(&self, n_features: usize) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_split: 2,
            min_samples_leaf: self.min_samples_leaf,
            criterion: self.criterion,
            max_features: Some(self.max_features.resolve(n_features)),
            seed: self.seed,
        }
    }
}

impl ModelAdapter for EnsembleConfig {
    fn kind(&self) -> ModelKind {
        ModelKind::TreeEnsemble
    }

    fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(ClassifyError::InvalidConfig(
                "ensemble needs at least one tree".to_string(),
            ));
        }
        if let MaxFeatures::Fraction(f) = self.max_features {
            if !(f > 0.0 && f <= 1.0) {
                return Err(ClassifyError::InvalidConfig(format!(
                    "max_features fraction must be in (0, 1], got {}",
                    f
                )));
            }
        }
        self.cost.validate()?;
        self.tree_config(1).check()
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, pool: &WorkerPool) -> Result<Box<dyn TrainedModel>> {
        Ok(Box::new(TreeEnsemble::fit(self, x, y, pool)?))
    }
}

/// Out-of-bag diagnostics gathered while the ensemble is grown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleDiagnostics {
    /// OOB misclassification rate after `t = 1..=T` trees (`NaN` while no row
    /// has an out-of-bag tree)
    pub oob_error: Vec<f64>,
    /// Per-feature mean OOB error increase under permutation, over its
    /// standard deviation across trees
    pub permutation_importance: Option<Array1<f64>>,
}

impl EnsembleDiagnostics {
    /// Smallest ensemble size whose OOB error is within `tolerance` of the
    /// curve's minimum
    pub fn suggest_ensemble_size(&self, tolerance: f64) -> Option<usize> {
        let best = self
            .oob_error
            .iter()
            .filter(|e| e.is_finite())
            .cloned()
            .fold(f64::INFINITY, f64::min);
        if !best.is_finite() {
            return None;
        }
        self.oob_error
            .iter()
            .position(|&e| e.is_finite() && e <= best + tolerance.max(0.0))
            .map(|i| i + 1)
    }

    /// OOB error of the full ensemble
    pub fn final_oob_error(&self) -> Option<f64> {
        self.oob_error.last().copied().filter(|e| e.is_finite())
    }

    /// Feature indices ordered by decreasing importance
    pub fn ranked_features(&self) -> Option<Vec<usize>> {
        let importance = self.permutation_importance.as_ref()?;
        let mut order: Vec<usize> = (0..importance.len()).collect();
        order.sort_by(|&a, &b| {
            importance[b]
                .partial_cmp(&importance[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        Some(order)
    }
}

/// One grown tree with what it saw out of bag
struct GrownTree {
    tree: DecisionTree,
    oob_rows: Vec<usize>,
    oob_scores: Vec<f64>,
    importance_increase: Option<Vec<f64>>,
}

/// Fitted bagged ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    trees: Vec<DecisionTree>,
    cost: CostMatrix,
    n_features: usize,
    diagnostics: EnsembleDiagnostics,
}

impl TreeEnsemble {
    pub fn fit(config: &EnsembleConfig, x: &Array2<f64>, y: &Array1<f64>, pool: &WorkerPool) -> Result<Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let tree_config = config.tree_config(n_features);

        // Build trees in parallel
        let grown: Vec<GrownTree> = pool.install(|| {
            (0..config.n_trees)
                .into_par_iter()
                .map(|tree_idx| {
                    let mut rng = tree_rng(config.seed, tree_idx);

                    let mut in_bag = vec![false; n_samples];
                    let sample: Vec<usize> = (0..n_samples)
                        .map(|_| {
                            let idx = rng.gen_range(0..n_samples);
                            in_bag[idx] = true;
                            idx
                        })
                        .collect();
                    let oob_rows: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();

                    let tree = DecisionTree::fit_rows(&tree_config, x, y, &sample, &mut rng);
                    let oob_scores: Vec<f64> = oob_rows.iter().map(|&i| tree.predict_row(x.row(i))).collect();

                    let importance_increase = (config.compute_importance && !oob_rows.is_empty())
                        .then(|| permutation_increase(&tree, x, y, &oob_rows, &oob_scores, &mut rng));

                    GrownTree {
                        tree,
                        oob_rows,
                        oob_scores,
                        importance_increase,
                    }
                })
                .collect()
        });

        // Cumulative out-of-bag error, in tree order
        let mut score_sum = vec![0.0; n_samples];
        let mut score_count = vec![0usize; n_samples];
        let mut oob_error = Vec::with_capacity(grown.len());
        for g in &grown {
            for (&row, &score) in g.oob_rows.iter().zip(g.oob_scores.iter()) {
                score_sum[row] += score;
                score_count[row] += 1;
            }
            let mut seen = 0usize;
            let mut wrong = 0usize;
            for row in 0..n_samples {
                if score_count[row] > 0 {
                    seen += 1;
                    let share = score_sum[row] / score_count[row] as f64;
                    if config.cost.decide(share) != y[row] {
                        wrong += 1;
                    }
                }
            }
            oob_error.push(if seen > 0 { wrong as f64 / seen as f64 } else { f64::NAN });
        }

        let permutation_importance = config
            .compute_importance
            .then(|| standardized_importance(&grown, n_features));

        let diagnostics = EnsembleDiagnostics {
            oob_error,
            permutation_importance,
        };
        debug!(
            n_trees = grown.len(),
            oob_error = diagnostics.final_oob_error().unwrap_or(f64::NAN),
            "Tree ensemble grown"
        );

        Ok(Self {
            trees: grown.into_iter().map(|g| g.tree).collect(),
            cost: config.cost,
            n_features,
            diagnostics,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn diagnostics(&self) -> &EnsembleDiagnostics {
        &self.diagnostics
    }

    /// Mean positive score over the trees
    pub fn vote_share(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_features(x, self.n_features)?;
        if self.trees.is_empty() {
            return Err(ClassifyError::ModelNotFitted);
        }
        let n_trees = self.trees.len() as f64;
        let shares: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees
            })
            .collect();
        Ok(Array1::from_vec(shares))
    }
}

impl TrainedModel for TreeEnsemble {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.vote_share(x)?.mapv(|p| self.cost.decide(p)))
    }

    fn positive_scores(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        self.vote_share(x).map(Some)
    }

    fn ensemble_diagnostics(&self) -> Option<&EnsembleDiagnostics> {
        Some(&self.diagnostics)
    }
}

/// Error increase of one tree on its out-of-bag rows when each feature is
/// permuted across those rows
/// Independent stream per tree under one ensemble seed
fn tree_rng(seed: u64, tree_idx: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(tree_idx as u64);
    rng
}

fn permutation_increase<R: Rng>(
    tree: &DecisionTree,
    x: &Array2<f64>,
    y: &Array1<f64>,
    oob_rows: &[usize],
    oob_scores: &[f64],
    rng: &mut R,
) -> Vec<f64> {
    let n_oob = oob_rows.len() as f64;
    let label = |score: f64| if score > 0.5 { 1.0 } else { 0.0 };
    let base_wrong = oob_rows
        .iter()
        .zip(oob_scores)
        .filter(|(&row, &score)| label(score) != y[row])
        .count() as f64;

    (0..x.ncols())
        .map(|feature| {
            let mut permuted: Vec<f64> = oob_rows.iter().map(|&r| x[[r, feature]]).collect();
            permuted.shuffle(rng);

            let wrong = oob_rows
                .iter()
                .zip(permuted.iter())
                .filter(|(&row, &value)| {
                    let mut sample = x.row(row).to_owned();
                    sample[feature] = value;
                    label(tree.predict_row(sample.view())) != y[row]
                })
                .count() as f64;
            (wrong - base_wrong) / n_oob
        })
        .collect()
}

/// Mean increase over trees divided by its standard deviation (raw mean when
/// the deviation is zero)
fn standardized_importance(grown: &[GrownTree], n_features: usize) -> Array1<f64> {
    let increases: Vec<&Vec<f64>> = grown.iter().filter_map(|g| g.importance_increase.as_ref()).collect();
    let n = increases.len();
    if n == 0 {
        return Array1::zeros(n_features);
    }

    (0..n_features)
        .map(|j| {
            let mean = increases.iter().map(|v| v[j]).sum::<f64>() / n as f64;
            let std = if n > 1 {
                (increases.iter().map(|v| (v[j] - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
            } else {
                0.0
            };
            if std > 1e-12 {
                mean / std
            } else {
                mean
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Column 0 decides the label, the others are noise
    fn dominant_feature_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut x = Array2::zeros((n, 4));
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let signal: f64 = rng.gen_range(-1.0..1.0);
            x[[i, 0]] = signal;
            for j in 1..4 {
                x[[i, j]] = rng.gen_range(-1.0..1.0);
            }
            y[i] = if signal > 0.0 { 1.0 } else { 0.0 };
        }
        (x, y)
    }

    #[test]
    fn test_oob_curve_and_importance() {
        let pool = WorkerPool::with_threads(2).unwrap();
        let (x, y) = dominant_feature_data(200);
        let config = EnsembleConfig::default().with_trees(30).with_cost(CostMatrix::uniform());
        let forest = TreeEnsemble::fit(&config, &x, &y, &pool).unwrap();

        let diag = forest.diagnostics();
        assert_eq!(diag.oob_error.len(), 30);
        assert!(diag.final_oob_error().unwrap() < 0.2);
        assert_eq!(diag.ranked_features().unwrap()[0], 0);

        let size = diag.suggest_ensemble_size(0.0).unwrap();
        assert!((1..=30).contains(&size));
        assert!(diag.oob_error[size - 1] <= diag.final_oob_error().unwrap());
    }

    #[test]
    fn test_deterministic_for_seed() {
        let pool = WorkerPool::with_threads(3).unwrap();
        let (x, y) = dominant_feature_data(80);
        let config = EnsembleConfig::default().with_trees(10);
        let a = TreeEnsemble::fit(&config, &x, &y, &pool).unwrap();
        let b = TreeEnsemble::fit(&config, &x, &y, &pool).unwrap();
        assert_eq!(a.vote_share(&x).unwrap(), b.vote_share(&x).unwrap());
        assert_eq!(a.diagnostics().oob_error, b.diagnostics().oob_error);
    }

    #[test]
    fn test_neighbouring_seeds_share_no_tree_stream() {
        let draws = |seed: u64, tree_idx: usize| -> Vec<u64> {
            let mut rng = tree_rng(seed, tree_idx);
            (0..8).map(|_| rng.gen::<u64>()).collect()
        };
        for k in 1..10 {
            assert_ne!(draws(42, k), draws(43, k - 1));
            assert_ne!(draws(42, k), draws(42, k - 1));
        }
        assert_eq!(draws(42, 3), draws(42, 3));
    }

    #[test]
    fn test_cost_matrix_shifts_toward_positive() {
        let cost = CostMatrix::default();
        assert_eq!(cost.decide(0.2), 1.0);
        assert_eq!(cost.decide(0.1), 0.0);
        assert_eq!(CostMatrix::uniform().decide(0.2), 0.0);

        let pool = WorkerPool::with_threads(2).unwrap();
        let (x, y) = dominant_feature_data(150);
        let uniform = TreeEnsemble::fit(&EnsembleConfig::default().with_trees(20).with_cost(CostMatrix::uniform()), &x, &y, &pool).unwrap();
        let skewed = TreeEnsemble::fit(&EnsembleConfig::default().with_trees(20), &x, &y, &pool).unwrap();
        let pos = |m: &TreeEnsemble| m.predict(&x).unwrap().sum();
        assert!(pos(&skewed) >= pos(&uniform));
    }

    #[test]
    fn test_suggest_size_skips_nan_prefix() {
        let diag = EnsembleDiagnostics {
            oob_error: vec![f64::NAN, 0.3, 0.21, 0.2, 0.25],
            permutation_importance: None,
        };
        assert_eq!(diag.suggest_ensemble_size(0.0), Some(4));
        assert_eq!(diag.suggest_ensemble_size(0.02), Some(3));
        let empty = EnsembleDiagnostics {
            oob_error: vec![f64::NAN],
            permutation_importance: None,
        };
        assert_eq!(empty.suggest_ensemble_size(0.1), None);
    }

    #[test]
    fn test_invalid_config() {
        assert!(EnsembleConfig::default().with_trees(0).validate().is_err());
        let bad_cost = EnsembleConfig::default().with_cost(CostMatrix {
            false_positive: -1.0,
            false_negative: 1.0,
        });
        assert!(matches!(bad_cost.validate(), Err(ClassifyError::InvalidConfig(_))));
    }
}
