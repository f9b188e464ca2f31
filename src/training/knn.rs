//! K-Nearest Neighbors implementation
//!
//! Brute-force neighbour search over standardised training rows.

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::{ClassifyError, Result};
use crate::preprocessing::Standardizer;
use crate::training::models::{check_features, ModelAdapter, TrainedModel};
use crate::training::ModelKind;
use crate::utils::WorkerPool;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Minkowski distance with parameter p
    Minkowski(f64),
    /// Cosine similarity (converted to distance)
    Cosine,
}

impl DistanceMetric {
    /// Resolve a metric by name; `p` is only used by Minkowski
    pub fn from_name(name: &str, p: f64) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "euclidean" | "l2" => Ok(Self::Euclidean),
            "manhattan" | "cityblock" | "l1" => Ok(Self::Manhattan),
            "cosine" => Ok(Self::Cosine),
            "minkowski" => {
                if p > 0.0 && p.is_finite() {
                    Ok(Self::Minkowski(p))
                } else {
                    Err(ClassifyError::InvalidConfig(format!(
                        "Minkowski exponent must be positive, got {}",
                        p
                    )))
                }
            }
            other => Err(ClassifyError::InvalidConfig(format!(
                "unknown distance metric '{}'",
                other
            ))),
        }
    }
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
    /// All neighbors have equal weight
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KNNConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    /// Distance metric name: euclidean, manhattan, minkowski or cosine
    pub metric: String,
    /// Exponent for the Minkowski metric
    pub minkowski_p: f64,
    /// Weighting scheme
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: "euclidean".to_string(),
            minkowski_p: 2.0,
            weights: WeightScheme::Uniform,
        }
    }
}

impl KNNConfig {
    pub fn with_k(k: usize) -> Self {
        Self {
            n_neighbors: k,
            ..Default::default()
        }
    }
}

impl ModelAdapter for KNNConfig {
    fn kind(&self) -> ModelKind {
        ModelKind::KNN
    }

    fn validate(&self) -> Result<()> {
        if self.n_neighbors == 0 {
            return Err(ClassifyError::InvalidConfig(
                "n_neighbors must be at least 1".to_string(),
            ));
        }
        DistanceMetric::from_name(&self.metric, self.minkowski_p).map(|_| ())
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, _pool: &WorkerPool) -> Result<Box<dyn TrainedModel>> {
        Ok(Box::new(KNNClassifier::fit(self, x, y)?))
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    k: usize,
    metric: DistanceMetric,
    weights: WeightScheme,
    scaler: Standardizer,
    x_train: Array2<f64>,
    y_train: Array1<f64>,
}

impl KNNClassifier {
    /// Store the standardised training rows
    pub fn fit(config: &KNNConfig, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        let metric = DistanceMetric::from_name(&config.metric, config.minkowski_p)?;
        if config.n_neighbors == 0 || config.n_neighbors > x.nrows() {
            return Err(ClassifyError::InvalidConfig(format!(
                "n_neighbors must be in 1..={}, got {}",
                x.nrows(),
                config.n_neighbors
            )));
        }
        let (scaler, x_train) = Standardizer::fit_transform(x)?;
        Ok(Self {
            k: config.n_neighbors,
            metric,
            weights: config.weights,
            scaler,
            x_train,
            y_train: y.clone(),
        })
    }

    /// Weighted share of positive neighbours per row (parallel over rows)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.neighbour_votes(x)?.into_iter().map(|(share, _)| share).collect())
    }

    fn neighbour_votes(&self, x: &Array2<f64>) -> Result<Vec<(f64, f64)>> {
        check_features(x, self.x_train.ncols())?;
        let z = self.scaler.transform(x)?;

        Ok((0..z.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(z.row(i), &self.x_train, &self.y_train, self.k, self.metric);
                vote(&neighbors, self.weights)
            })
            .collect())
    }
}

impl TrainedModel for KNNClassifier {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self
            .neighbour_votes(x)?
            .into_iter()
            .map(|(share, nearest)| match share.partial_cmp(&0.5) {
                Some(Ordering::Greater) => 1.0,
                Some(Ordering::Less) => 0.0,
                _ => nearest,
            })
            .collect())
    }

    fn positive_scores(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        self.predict_proba(x).map(Some)
    }
}

/// Max-heap entry for partial sort (keeps k smallest distances)
#[derive(PartialEq)]
struct DistLabel(f64, f64);

impl Eq for DistLabel {}
impl PartialOrd for DistLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

/// Find k nearest neighbors using a max-heap, O(n log k); result sorted by distance
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (i, row) in x_train.rows().into_iter().enumerate() {
        let dist = compute_distance(point, row, metric);
        if heap.len() < k {
            heap.push(DistLabel(dist, y_train[i]));
        } else if let Some(top) = heap.peek() {
            if dist < top.0 {
                heap.pop();
                heap.push(DistLabel(dist, y_train[i]));
            }
        }
    }

    heap.into_sorted_vec().into_iter().map(|dl| (dl.0, dl.1)).collect()
}

/// Compute distance between two points using the specified metric
fn compute_distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| {
                let d = ai - bi;
                d * d
            })
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(ai, bi)| (ai - bi).abs()).sum(),
        DistanceMetric::Minkowski(p) => a
            .iter()
            .zip(b.iter())
            .map(|(ai, bi)| (ai - bi).abs().powf(p))
            .sum::<f64>()
            .powf(1.0 / p),
        DistanceMetric::Cosine => {
            let mut dot = 0.0;
            let mut norm_a = 0.0;
            let mut norm_b = 0.0;
            for (ai, bi) in a.iter().zip(b.iter()) {
                dot += ai * bi;
                norm_a += ai * ai;
                norm_b += bi * bi;
            }
            let denom = norm_a.sqrt() * norm_b.sqrt();
            if denom > 0.0 {
                1.0 - (dot / denom)
            } else {
                1.0
            }
        }
    }
}

/// Weighted positive share and the label of the nearest neighbour
fn vote(neighbors: &[(f64, f64)], weights: WeightScheme) -> (f64, f64) {
    let mut positive = 0.0;
    let mut total = 0.0;
    for &(dist, label) in neighbors {
        let weight = match weights {
            WeightScheme::Uniform => 1.0,
            WeightScheme::Distance => 1.0 / (dist + 1e-10),
        };
        positive += weight * label;
        total += weight;
    }
    let share = if total > 0.0 { positive / total } else { 0.0 };
    let nearest = neighbors.first().map(|n| n.1).unwrap_or(0.0);
    (share, nearest)
}
