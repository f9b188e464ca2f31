//! Decision tree implementation
//!
//! Binary CART classifier. Leaves store the fraction of positive training
//! rows that reached them, which doubles as the positive-class score.

use crate::error::{ClassifyError, Result};
use crate::training::models::{check_features, ModelAdapter, TrainedModel};
use crate::training::ModelKind;
use crate::utils::WorkerPool;
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node; `value` is the positive fraction of its training rows
    Leaf { value: f64, n_samples: usize },
    /// Internal node: rows with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Gini,
    Entropy,
}

impl Criterion {
    /// Impurity of a node holding `pos` positives out of `n` rows
    fn impurity(&self, pos: f64, n: f64) -> f64 {
        if n <= 0.0 {
            return 0.0;
        }
        let p = pos / n;
        match self {
            Criterion::Gini => 2.0 * p * (1.0 - p),
            Criterion::Entropy => {
                let term = |q: f64| if q > 0.0 { -q * q.ln() } else { 0.0 };
                term(p) + term(1.0 - p)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    pub criterion: Criterion,
    /// Features drawn at random per split (`None` = all)
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            criterion: Criterion::Gini,
            max_features: None,
            seed: 42,
        }
    }
}

impl TreeConfig {
    pub(crate) fn check(&self) -> Result<()> {
        if self.min_samples_leaf < 1 {
            return Err(ClassifyError::InvalidConfig(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ClassifyError::InvalidConfig(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.max_depth == Some(0) || self.max_features == Some(0) {
            return Err(ClassifyError::InvalidConfig(
                "max_depth and max_features must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

impl ModelAdapter for TreeConfig {
    fn kind(&self) -> ModelKind {
        ModelKind::DecisionTree
    }

    fn validate(&self) -> Result<()> {
        self.check()
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, _pool: &WorkerPool) -> Result<Box<dyn TrainedModel>> {
        Ok(Box::new(DecisionTree::fit(self, x, y)?))
    }
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: TreeNode,
    n_features: usize,
    feature_importances: Array1<f64>,
}

struct Builder<'a, R: Rng> {
    config: &'a TreeConfig,
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    rng: &'a mut R,
    importances: Vec<f64>,
}

impl DecisionTree {
    /// Fit on every row
    pub fn fit(config: &TreeConfig, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        config.check()?;
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self::fit_rows(config, x, y, &indices, &mut rng))
    }

    /// Fit on the given rows; duplicates count with multiplicity
    pub(crate) fn fit_rows<R: Rng>(
        config: &TreeConfig,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &[usize],
        rng: &mut R,
    ) -> Self {
        let mut builder = Builder {
            config,
            x,
            y,
            rng,
            importances: vec![0.0; x.ncols()],
        };
        let root = builder.build(rows.to_vec(), 0);

        let mut importances = Array1::from_vec(builder.importances);
        let total = importances.sum();
        if total > 0.0 {
            importances /= total;
        }

        Self {
            root,
            n_features: x.ncols(),
            feature_importances: importances,
        }
    }

    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    pub fn n_leaves(&self) -> usize {
        self.root.n_leaves()
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Normalised total impurity decrease per feature
    pub fn feature_importances(&self) -> &Array1<f64> {
        &self.feature_importances
    }

    /// Positive fraction of the leaf a row falls into
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_features(x, self.n_features)?;
        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }
}

impl TrainedModel for DecisionTree {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_proba(x)?.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }

    fn positive_scores(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        self.predict_proba(x).map(Some)
    }
}

impl<'a, R: Rng> Builder<'a, R> {
    fn build(&mut self, rows: Vec<usize>, depth: usize) -> TreeNode {
        let n_samples = rows.len();
        let positives: f64 = rows.iter().map(|&i| self.y[i]).sum();
        let leaf = TreeNode::Leaf {
            value: if n_samples > 0 { positives / n_samples as f64 } else { 0.0 },
            n_samples,
        };

        let pure = positives == 0.0 || positives == n_samples as f64;
        if pure
            || n_samples < self.config.min_samples_split
            || n_samples < 2 * self.config.min_samples_leaf
            || self.config.max_depth.map_or(false, |d| depth >= d)
        {
            return leaf;
        }

        let parent_impurity = self.config.criterion.impurity(positives, n_samples as f64);
        let Some((feature_idx, threshold, gain)) = self.best_split(&rows, positives, parent_impurity) else {
            return leaf;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| self.x[[i, feature_idx]] <= threshold);

        self.importances[feature_idx] += n_samples as f64 * gain;

        let left = Box::new(self.build(left_rows, depth + 1));
        let right = Box::new(self.build(right_rows, depth + 1));

        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            impurity: parent_impurity,
        }
    }

    /// Sorted sweep over each candidate feature; returns (feature, threshold, gain)
    fn best_split(&mut self, rows: &[usize], positives: f64, parent_impurity: f64) -> Option<(usize, f64, f64)> {
        let n_features = self.x.ncols();
        let mut features: Vec<usize> = match self.config.max_features {
            Some(m) if m < n_features => sample(&mut *self.rng, n_features, m).into_vec(),
            _ => (0..n_features).collect(),
        };
        features.sort_unstable();

        let n = rows.len() as f64;
        let min_leaf = self.config.min_samples_leaf;
        let mut best: Option<(usize, f64, f64)> = None;
        let mut sorted = rows.to_vec();

        for feature_idx in features {
            sorted.sort_by(|&a, &b| {
                self.x[[a, feature_idx]]
                    .partial_cmp(&self.x[[b, feature_idx]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let mut left_pos = 0.0;
            for k in 1..sorted.len() {
                left_pos += self.y[sorted[k - 1]];
                let lo = self.x[[sorted[k - 1], feature_idx]];
                let hi = self.x[[sorted[k], feature_idx]];
                if hi <= lo || k < min_leaf || sorted.len() - k < min_leaf {
                    continue;
                }

                let n_left = k as f64;
                let n_right = n - n_left;
                let child = (n_left * self.config.criterion.impurity(left_pos, n_left)
                    + n_right * self.config.criterion.impurity(positives - left_pos, n_right))
                    / n;
                let gain = parent_impurity - child;
                if gain > 1e-12 && best.map_or(true, |b| gain > b.2 + 1e-15) {
                    best = Some((feature_idx, lo + (hi - lo) / 2.0, gain));
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_decision_tree_classifier() {
        let x = array![
            [1.0, 2.0],
            [1.5, 1.8],
            [5.0, 8.0],
            [8.0, 8.0],
            [1.0, 0.6],
            [9.0, 11.0],
        ];
        let y = array![0.0, 0.0, 1.0, 1.0, 0.0, 1.0];

        let tree = DecisionTree::fit(&TreeConfig::default(), &x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        assert!((tree.feature_importances().sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_leaf_fraction_and_depth_limit() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![0.0, 0.0, 1.0, 0.0, 1.0, 1.0];
        let config = TreeConfig {
            max_depth: Some(1),
            criterion: Criterion::Entropy,
            ..Default::default()
        };
        let tree = DecisionTree::fit(&config, &x, &y).unwrap();
        assert_eq!(tree.depth(), 1);

        let proba = tree.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(proba[0] < proba[5]);
    }

    #[test]
    fn test_thresholds_fall_between_values() {
        let x = array![[1.0], [1.0], [3.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let tree = DecisionTree::fit(&TreeConfig::default(), &x, &y).unwrap();
        match tree.root() {
            TreeNode::Split { threshold, .. } => assert_eq!(*threshold, 2.0),
            TreeNode::Leaf { .. } => panic!("expected a split"),
        }
        assert_eq!(tree.predict(&array![[1.9], [2.1]]).unwrap().to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_invalid_config() {
        let config = TreeConfig {
            min_samples_leaf: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClassifyError::InvalidConfig(_))));
    }
}
