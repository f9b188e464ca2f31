//! Binary confusion matrix

use crate::error::{ClassifyError, Result};
use ndarray::{arr2, Array1, Array2};
use serde::{Deserialize, Serialize};

/// Counts and row-normalised percentages; true class in rows, predicted class
/// in columns, negative first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Array2<usize>,
    percentages: Array2<f64>,
}

impl ConfusionMatrix {
    pub fn from_counts(tn: usize, fp: usize, fn_count: usize, tp: usize) -> Self {
        let counts = arr2(&[[tn, fp], [fn_count, tp]]);
        let mut percentages = Array2::from_elem((2, 2), f64::NAN);
        for row in 0..2 {
            let total = counts[[row, 0]] + counts[[row, 1]];
            if total > 0 {
                for col in 0..2 {
                    percentages[[row, col]] = counts[[row, col]] as f64 / total as f64 * 100.0;
                }
            }
        }
        Self { counts, percentages }
    }

    pub fn counts(&self) -> &Array2<usize> {
        &self.counts
    }

    /// Row percentages; a row is `NaN` when its class is absent
    pub fn percentages(&self) -> &Array2<f64> {
        &self.percentages
    }

    pub fn true_negatives(&self) -> usize {
        self.counts[[0, 0]]
    }

    pub fn false_positives(&self) -> usize {
        self.counts[[0, 1]]
    }

    pub fn false_negatives(&self) -> usize {
        self.counts[[1, 0]]
    }

    pub fn true_positives(&self) -> usize {
        self.counts[[1, 1]]
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives() + self.true_negatives(), self.total())
    }

    /// True positive rate (recall)
    pub fn sensitivity(&self) -> f64 {
        ratio(self.true_positives(), self.true_positives() + self.false_negatives())
    }

    /// True negative rate
    pub fn specificity(&self) -> f64 {
        ratio(self.true_negatives(), self.true_negatives() + self.false_positives())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives(), self.true_positives() + self.false_positives())
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        f64::NAN
    } else {
        num as f64 / den as f64
    }
}

/// Count `(true, predicted)` pairs over 0/1 labels
pub fn confusion_matrix(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<ConfusionMatrix> {
    if y_true.len() != y_pred.len() {
        return Err(ClassifyError::InvalidArgument(format!(
            "y_true has {} labels, y_pred has {}",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(ClassifyError::InvalidArgument(
            "cannot build a confusion matrix from no labels".to_string(),
        ));
    }

    let mut cells = [[0usize; 2]; 2];
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        let (t, p) = (class_index(t)?, class_index(p)?);
        cells[t][p] += 1;
    }
    Ok(ConfusionMatrix::from_counts(cells[0][0], cells[0][1], cells[1][0], cells[1][1]))
}

fn class_index(label: f64) -> Result<usize> {
    if label == 0.0 {
        Ok(0)
    } else if label == 1.0 {
        Ok(1)
    } else {
        Err(ClassifyError::InvalidArgument(format!(
            "labels must be 0 or 1, found {}",
            label
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_counts_and_rows_sum_to_100() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        let cm = confusion_matrix(&y_true, &y_pred).unwrap();

        assert_eq!(cm.counts(), &array![[3usize, 1], [1, 3]]);
        for row in cm.percentages().rows() {
            assert!((row.sum() - 100.0).abs() < 1e-9);
        }
        assert_eq!(cm.percentages()[[0, 0]], 75.0);
        assert_eq!(cm.accuracy(), 0.75);
        assert_eq!(cm.sensitivity(), 0.75);
        assert_eq!(cm.specificity(), 0.75);
        assert_eq!(cm.precision(), 0.75);
    }

    #[test]
    fn test_absent_class_row_is_nan() {
        let cm = confusion_matrix(&array![0.0, 0.0, 0.0], &array![0.0, 1.0, 0.0]).unwrap();
        assert!(cm.percentages().row(1).iter().all(|v| v.is_nan()));
        assert!((cm.percentages().row(0).sum() - 100.0).abs() < 1e-9);
        assert!(cm.sensitivity().is_nan());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(confusion_matrix(&array![0.0, 1.0], &array![0.0]).is_err());
        assert!(confusion_matrix(&Array1::zeros(0), &Array1::zeros(0)).is_err());
        assert!(matches!(
            confusion_matrix(&array![0.0, 2.0], &array![0.0, 1.0]),
            Err(ClassifyError::InvalidArgument(_))
        ));
    }
}
