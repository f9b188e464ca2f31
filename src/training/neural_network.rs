//! Neural Network (Multi-Layer Perceptron) implementation
//!
//! Feedforward network with a single sigmoid output trained on binary
//! cross-entropy. Mini-batch SGD with momentum; the gradient of each batch is
//! computed in fixed-size row shards on the worker pool and summed in order,
//! so results do not depend on the thread count.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClassifyError, Result};
use crate::preprocessing::{Encoding, Standardizer};
use crate::training::models::{check_features, sigmoid, threshold, ModelAdapter, TrainedModel};
use crate::training::ModelKind;
use crate::utils::WorkerPool;

/// Rows per gradient shard
const SHARD_ROWS: usize = 16;

/// Activation function for hidden layers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Rectified Linear Unit
    ReLU,
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
}

impl Activation {
    fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv(sigmoid),
            Activation::Tanh => z.mapv(f64::tanh),
        }
    }

    fn derivative(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => z.mapv(|v| {
                let s = sigmoid(v);
                s * (1.0 - s)
            }),
            Activation::Tanh => z.mapv(|v| 1.0 - v.tanh().powi(2)),
        }
    }
}

/// Neural Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MLPConfig {
    /// Hidden layer sizes
    pub hidden_layers: Vec<usize>,
    /// Activation function for hidden layers
    pub activation: Activation,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    /// L2 regularization
    pub alpha: f64,
    pub momentum: f64,
    /// Fraction of training rows held out for early stopping
    pub validation_split: f64,
    /// Epochs without validation improvement before stopping
    pub early_stopping_patience: usize,
    pub seed: u64,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![10],
            activation: Activation::Tanh,
            learning_rate: 0.05,
            max_epochs: 300,
            batch_size: 32,
            alpha: 1e-4,
            momentum: 0.9,
            validation_split: 0.15,
            early_stopping_patience: 20,
            seed: 42,
        }
    }
}

impl ModelAdapter for MLPConfig {
    fn kind(&self) -> ModelKind {
        ModelKind::NeuralNetwork
    }

    fn encoding(&self) -> Encoding {
        Encoding::OneHot
    }

    fn validate(&self) -> Result<()> {
        if self.hidden_layers.is_empty() || self.hidden_layers.contains(&0) {
            return Err(ClassifyError::InvalidConfig(format!(
                "hidden layers must be non-empty with positive sizes, got {:?}",
                self.hidden_layers
            )));
        }
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(ClassifyError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.validation_split) || !(0.0..1.0).contains(&self.momentum) {
            return Err(ClassifyError::InvalidConfig(format!(
                "validation_split and momentum must be in [0, 1), got {} and {}",
                self.validation_split, self.momentum
            )));
        }
        if self.batch_size == 0 || self.max_epochs == 0 || !(self.alpha >= 0.0) {
            return Err(ClassifyError::InvalidConfig(
                "batch_size and max_epochs must be positive and alpha non-negative".to_string(),
            ));
        }
        Ok(())
    }

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, pool: &WorkerPool) -> Result<Box<dyn TrainedModel>> {
        Ok(Box::new(MLPClassifier::fit(self, x, y, pool)?))
    }
}

type Gradients = Vec<(Array2<f64>, Array1<f64>)>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Network {
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    activation: Activation,
}

impl Network {
    fn new(layer_sizes: &[usize], activation: Activation, rng: &mut Xoshiro256PlusPlus) -> Self {
        let mut weights = Vec::with_capacity(layer_sizes.len() - 1);
        let mut biases = Vec::with_capacity(layer_sizes.len() - 1);
        for pair in layer_sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            // Xavier/Glorot initialization
            let scale = (6.0 / (n_in + n_out) as f64).sqrt();
            weights.push(Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-scale..scale)));
            biases.push(Array1::zeros(n_out));
        }
        Self {
            weights,
            biases,
            activation,
        }
    }

    /// Activations of every layer (input first) and hidden pre-activations
    fn forward(&self, x: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let mut activations = vec![x.clone()];
        let mut z_values = Vec::with_capacity(self.weights.len());
        let last = self.weights.len() - 1;

        for (i, (w, b)) in self.weights.iter().zip(self.biases.iter()).enumerate() {
            let z = activations[i].dot(w) + b;
            let a = if i < last {
                self.activation.apply(&z)
            } else {
                z.mapv(sigmoid)
            };
            z_values.push(z);
            activations.push(a);
        }
        (activations, z_values)
    }

    fn output(&self, x: &Array2<f64>) -> Array1<f64> {
        let (mut activations, _) = self.forward(x);
        activations
            .pop()
            .map(|a| a.column(0).to_owned())
            .unwrap_or_else(|| Array1::zeros(x.nrows()))
    }

    /// Cross-entropy gradients summed over the rows of `x`
    fn gradients(&self, x: &Array2<f64>, y: &Array1<f64>) -> Gradients {
        let (activations, z_values) = self.forward(x);
        let n_layers = self.weights.len();

        // Sigmoid output with cross-entropy: dL/dz = p - y
        let mut delta = &activations[n_layers] - &y.view().insert_axis(Axis(1));
        let mut grads = Vec::with_capacity(n_layers);

        for i in (0..n_layers).rev() {
            grads.push((activations[i].t().dot(&delta), delta.sum_axis(Axis(0))));
            if i > 0 {
                delta = delta.dot(&self.weights[i].t()) * self.activation.derivative(&z_values[i - 1]);
            }
        }
        grads.reverse();
        grads
    }
}

fn cross_entropy(y: &Array1<f64>, p: &Array1<f64>) -> f64 {
    let eps = 1e-12;
    let total: f64 = y
        .iter()
        .zip(p.iter())
        .map(|(&t, &q)| -(t * q.max(eps).ln() + (1.0 - t) * (1.0 - q).max(eps).ln()))
        .sum();
    total / y.len().max(1) as f64
}

/// Multi-Layer Perceptron Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPClassifier {
    scaler: Standardizer,
    network: Network,
    n_features: usize,
    /// Epochs run before stopping
    pub epochs_run: usize,
}

impl MLPClassifier {
    pub fn fit(config: &MLPConfig, x: &Array2<f64>, y: &Array1<f64>, pool: &WorkerPool) -> Result<Self> {
        let (scaler, z) = Standardizer::fit_transform(x)?;
        let n_samples = z.nrows();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);

        // Random validation slice for early stopping
        let mut order: Vec<usize> = (0..n_samples).collect();
        order.shuffle(&mut rng);
        let val_size = ((n_samples as f64 * config.validation_split) as usize).min(n_samples - 1);
        let (val_rows, train_rows) = order.split_at(val_size);
        let x_val = z.select(Axis(0), val_rows);
        let y_val: Array1<f64> = val_rows.iter().map(|&i| y[i]).collect();
        let mut train_rows = train_rows.to_vec();

        let mut layer_sizes = vec![z.ncols()];
        layer_sizes.extend(&config.hidden_layers);
        layer_sizes.push(1);
        let mut network = Network::new(&layer_sizes, config.activation, &mut rng);

        let mut velocities: Gradients = network
            .weights
            .iter()
            .zip(network.biases.iter())
            .map(|(w, b)| (Array2::zeros(w.raw_dim()), Array1::zeros(b.len())))
            .collect();

        let mut best = (f64::INFINITY, network.clone());
        let mut patience_counter = 0;
        let mut epochs_run = 0;

        for _epoch in 0..config.max_epochs {
            epochs_run += 1;
            train_rows.shuffle(&mut rng);

            for batch in train_rows.chunks(config.batch_size) {
                let shards: Vec<Gradients> = pool.install(|| {
                    batch
                        .par_chunks(SHARD_ROWS)
                        .map(|rows| {
                            let xs = z.select(Axis(0), rows);
                            let ys: Array1<f64> = rows.iter().map(|&i| y[i]).collect();
                            network.gradients(&xs, &ys)
                        })
                        .collect()
                });

                let scale = 1.0 / batch.len() as f64;
                for (layer, velocity) in velocities.iter_mut().enumerate() {
                    let mut grad_w = Array2::<f64>::zeros(network.weights[layer].raw_dim());
                    let mut grad_b = Array1::<f64>::zeros(network.biases[layer].len());
                    for shard in &shards {
                        grad_w += &shard[layer].0;
                        grad_b += &shard[layer].1;
                    }
                    grad_w = grad_w * scale + &network.weights[layer] * config.alpha;
                    grad_b *= scale;

                    velocity.0 = &velocity.0 * config.momentum - &grad_w * config.learning_rate;
                    velocity.1 = &velocity.1 * config.momentum - &grad_b * config.learning_rate;
                    network.weights[layer] += &velocity.0;
                    network.biases[layer] += &velocity.1;
                }
            }

            // Early stopping check
            if val_size > 0 {
                let val_loss = cross_entropy(&y_val, &network.output(&x_val));
                if val_loss < best.0 {
                    best = (val_loss, network.clone());
                    patience_counter = 0;
                } else {
                    patience_counter += 1;
                    if patience_counter >= config.early_stopping_patience {
                        break;
                    }
                }
            }
        }

        let network = if val_size > 0 { best.1 } else { network };
        if network.weights.iter().any(|w| w.iter().any(|v| !v.is_finite())) {
            return Err(ClassifyError::ConvergenceError {
                model: "neural network".to_string(),
                iterations: epochs_run,
            });
        }
        debug!(epochs = epochs_run, val_loss = best.0, "Neural network trained");

        Ok(Self {
            scaler,
            network,
            n_features: x.ncols(),
            epochs_run,
        })
    }

    /// Sigmoid output, read as P(positive)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_features(x, self.n_features)?;
        let z = self.scaler.transform(x)?;
        Ok(self.network.output(&z))
    }
}

impl TrainedModel for MLPClassifier {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(threshold(&self.predict_proba(x)?, 0.5))
    }

    fn positive_scores(&self, x: &Array2<f64>) -> Result<Option<Array1<f64>>> {
        self.predict_proba(x).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_free_data() -> (Array2<f64>, Array1<f64>) {
        let n = 60;
        let x = Array2::from_shape_fn((n, 3), |(i, j)| {
            let base = if i < n / 2 { -2.0 } else { 2.0 };
            base + ((i * 7 + j * 3) % 11) as f64 * 0.1
        });
        let y: Array1<f64> = (0..n).map(|i| if i < n / 2 { 0.0 } else { 1.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_mlp_classifier() {
        let pool = WorkerPool::with_threads(2).unwrap();
        let (x, y) = xor_free_data();
        let mlp = MLPClassifier::fit(&MLPConfig::default(), &x, &y, &pool).unwrap();

        assert_eq!(mlp.predict(&x).unwrap(), y);
        let proba = mlp.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(mlp.epochs_run >= 1);
    }

    #[test]
    fn test_thread_count_does_not_change_result() {
        let (x, y) = xor_free_data();
        let config = MLPConfig {
            max_epochs: 20,
            ..Default::default()
        };
        let one = MLPClassifier::fit(&config, &x, &y, &WorkerPool::with_threads(1).unwrap()).unwrap();
        let four = MLPClassifier::fit(&config, &x, &y, &WorkerPool::with_threads(4).unwrap()).unwrap();
        assert_eq!(one.predict_proba(&x).unwrap(), four.predict_proba(&x).unwrap());
    }

    #[test]
    fn test_one_hot_encoding_requested() {
        assert_eq!(MLPConfig::default().encoding(), Encoding::OneHot);
    }

    #[test]
    fn test_invalid_configs() {
        let empty_layer = MLPConfig {
            hidden_layers: vec![4, 0],
            ..Default::default()
        };
        assert!(matches!(empty_layer.validate(), Err(ClassifyError::InvalidConfig(_))));

        let bad_lr = MLPConfig {
            learning_rate: 0.0,
            ..Default::default()
        };
        assert!(bad_lr.validate().is_err());

        let bad_split = MLPConfig {
            validation_split: 1.0,
            ..Default::default()
        };
        assert!(bad_split.validate().is_err());
    }
}
