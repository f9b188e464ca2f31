//! Seeded holdout partitioning
//!
//! A partition is drawn once per comparison run and shared by every model.

use crate::error::{ClassifyError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Train/test masks over row indices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldoutPartition {
    test_mask: Vec<bool>,
    seed: u64,
}

impl HoldoutPartition {
    /// Uniform random holdout: `ceil(n * p)` rows go to the test set
    pub fn new(n: usize, p: f64, seed: u64) -> Result<Self> {
        validate(n, p)?;
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let mut test_mask = vec![false; n];
        for &i in &indices[..test_size(n, p)] {
            test_mask[i] = true;
        }
        Ok(Self { test_mask, seed })
    }

    /// Per-class holdout, so both sides keep the class ratio
    pub fn stratified(labels: &Array1<f64>, p: f64, seed: u64) -> Result<Self> {
        let n = labels.len();
        validate(n, p)?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut test_mask = vec![false; n];

        for class in [0.0, 1.0] {
            let mut members: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, &y)| y == class)
                .map(|(i, _)| i)
                .collect();
            if members.is_empty() {
                continue;
            }
            members.shuffle(&mut rng);
            let k = if members.len() < 2 {
                // A lone member stays in training
                0
            } else {
                test_size(members.len(), p)
            };
            for &i in &members[..k] {
                test_mask[i] = true;
            }
        }
        if !test_mask.contains(&true) {
            // Every class was a singleton; hold out one row anyway
            let i = rng.gen_range(0..n);
            test_mask[i] = true;
        }
        Ok(Self { test_mask, seed })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.test_mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.test_mask.is_empty()
    }

    pub fn test_mask(&self) -> &[bool] {
        &self.test_mask
    }

    pub fn train_mask(&self) -> Vec<bool> {
        self.test_mask.iter().map(|&t| !t).collect()
    }

    pub fn test_indices(&self) -> Vec<usize> {
        self.indices_where(true)
    }

    pub fn train_indices(&self) -> Vec<usize> {
        self.indices_where(false)
    }

    pub fn n_test(&self) -> usize {
        self.test_mask.iter().filter(|&&t| t).count()
    }

    pub fn n_train(&self) -> usize {
        self.len() - self.n_test()
    }

    fn indices_where(&self, test: bool) -> Vec<usize> {
        self.test_mask
            .iter()
            .enumerate()
            .filter(|(_, &t)| t == test)
            .map(|(i, _)| i)
            .collect()
    }
}

fn validate(n: usize, p: f64) -> Result<()> {
    if !(p > 0.0 && p < 1.0) {
        return Err(ClassifyError::InvalidArgument(format!(
            "holdout fraction must be in (0, 1), got {}",
            p
        )));
    }
    if n < 2 {
        return Err(ClassifyError::InvalidArgument(format!(
            "need at least 2 rows to partition, got {}",
            n
        )));
    }
    Ok(())
}

/// `ceil(n * p)` clamped so neither side is empty. The slack absorbs
/// rounding in the product, e.g. `100.0 * 0.07 = 7.000000000000001`.
fn test_size(n: usize, p: f64) -> usize {
    ((n as f64 * p - 1e-9).ceil() as usize).clamp(1, n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_masks_disjoint_and_cover() {
        for &(n, p) in &[(2usize, 0.5), (10, 0.4), (101, 0.4), (4521, 0.4), (37, 0.99), (37, 0.01)] {
            let part = HoldoutPartition::new(n, p, 7).unwrap();
            let train = part.train_mask();
            let test = part.test_mask();
            assert_eq!(train.len(), n);
            for i in 0..n {
                assert!(train[i] ^ test[i], "row {} must be in exactly one side", i);
            }
            assert_eq!(part.n_test(), test_size(n, p));
            assert_eq!(part.n_train() + part.n_test(), n);
            assert!(part.n_train() >= 1 && part.n_test() >= 1);
        }
    }

    #[test]
    fn test_test_size_is_ceiling() {
        let part = HoldoutPartition::new(4521, 0.4, 1).unwrap();
        assert_eq!(part.n_test(), 1809);
        let part = HoldoutPartition::new(10, 0.45, 1).unwrap();
        assert_eq!(part.n_test(), 5);
        let part = HoldoutPartition::new(100, 0.07, 1).unwrap();
        assert_eq!(part.n_test(), 7);
        let part = HoldoutPartition::new(1000, 0.07, 1).unwrap();
        assert_eq!(part.n_test(), 70);
        let part = HoldoutPartition::new(100, 0.071, 1).unwrap();
        assert_eq!(part.n_test(), 8);
    }

    #[test]
    fn test_stratified_singletons_keep_both_sides() {
        let part = HoldoutPartition::stratified(&array![0.0, 1.0], 0.4, 3).unwrap();
        assert_eq!(part.n_test(), 1);
        assert_eq!(part.n_train(), 1);

        let part = HoldoutPartition::stratified(&array![0.0, 0.0, 0.0, 1.0], 0.4, 9).unwrap();
        assert!(part.n_test() >= 1 && part.n_train() >= 1);
        let positive = part.train_indices().contains(&3);
        assert!(positive, "a lone positive stays in training");
    }

    #[test]
    fn test_deterministic_for_seed() {
        let a = HoldoutPartition::new(500, 0.4, 42).unwrap();
        let b = HoldoutPartition::new(500, 0.4, 42).unwrap();
        let c = HoldoutPartition::new(500, 0.4, 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.test_mask(), c.test_mask());
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            HoldoutPartition::new(10, 0.0, 1),
            Err(ClassifyError::InvalidArgument(_))
        ));
        assert!(HoldoutPartition::new(10, 1.0, 1).is_err());
        assert!(HoldoutPartition::new(10, f64::NAN, 1).is_err());
        assert!(HoldoutPartition::new(1, 0.5, 1).is_err());
    }

    #[test]
    fn test_stratified_keeps_ratio() {
        let labels: Array1<f64> = (0..100).map(|i| if i < 20 { 1.0 } else { 0.0 }).collect();
        let part = HoldoutPartition::stratified(&labels, 0.4, 3).unwrap();
        let test_pos = part.test_indices().iter().filter(|&&i| labels[i] == 1.0).count();
        assert_eq!(test_pos, 8);
        assert_eq!(part.n_test(), 40);

        let again = HoldoutPartition::stratified(&labels, 0.4, 3).unwrap();
        assert_eq!(part, again);

        assert!(HoldoutPartition::stratified(&array![1.0], 0.4, 3).is_err());
    }
}
