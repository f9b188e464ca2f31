//! ROC curve and area under it

use crate::error::{ClassifyError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// ROC points in descending-threshold order; the first point is `(0, 0)` at
/// threshold `+inf`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
    pub auc: f64,
}

impl RocCurve {
    pub fn len(&self) -> usize {
        self.fpr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fpr.is_empty()
    }

    /// `(fpr, tpr, threshold)` triples
    pub fn points(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.fpr
            .iter()
            .zip(self.tpr.iter())
            .zip(self.thresholds.iter())
            .map(|((&f, &t), &th)| (f, t, th))
    }
}

/// Sweep the threshold over the distinct scores from high to low; a row is
/// predicted positive when `score >= threshold`
pub fn roc_curve(y_true: &Array1<f64>, scores: &Array1<f64>) -> Result<RocCurve> {
    if y_true.len() != scores.len() {
        return Err(ClassifyError::InvalidArgument(format!(
            "y_true has {} labels, scores has {}",
            y_true.len(),
            scores.len()
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(ClassifyError::InvalidArgument(
            "scores must be finite".to_string(),
        ));
    }
    if let Some(bad) = y_true.iter().find(|&&v| v != 0.0 && v != 1.0) {
        return Err(ClassifyError::InvalidArgument(format!(
            "labels must be 0 or 1, found {}",
            bad
        )));
    }
    let n_pos = y_true.iter().filter(|&&v| v == 1.0).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(ClassifyError::InvalidArgument(
            "ROC needs both classes among the true labels".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let mut thresholds = vec![f64::INFINITY];
    let (mut tp, mut fp) = (0usize, 0usize);

    let mut k = 0;
    while k < order.len() {
        let threshold = scores[order[k]];
        while k < order.len() && scores[order[k]] == threshold {
            if y_true[order[k]] == 1.0 {
                tp += 1;
            } else {
                fp += 1;
            }
            k += 1;
        }
        fpr.push(fp as f64 / n_neg as f64);
        tpr.push(tp as f64 / n_pos as f64);
        thresholds.push(threshold);
    }

    let auc = trapezoid_auc(&fpr, &tpr);
    Ok(RocCurve {
        fpr,
        tpr,
        thresholds,
        auc,
    })
}

/// Trapezoidal area over the points sorted by fpr, ties by tpr
fn trapezoid_auc(fpr: &[f64], tpr: &[f64]) -> f64 {
    let mut points: Vec<(f64, f64)> = fpr.iter().copied().zip(tpr.iter().copied()).collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    points
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[1].1 + w[0].1) / 2.0)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_ranking() {
        let roc = roc_curve(&array![0.0, 0.0, 1.0, 1.0], &array![0.1, 0.2, 0.8, 0.9]).unwrap();
        assert_eq!(roc.auc, 1.0);
        assert_eq!(roc.fpr[0], 0.0);
        assert_eq!(roc.tpr[0], 0.0);
        assert_eq!(roc.thresholds[0], f64::INFINITY);
        assert_eq!(*roc.fpr.last().unwrap(), 1.0);
        assert_eq!(*roc.tpr.last().unwrap(), 1.0);
    }

    #[test]
    fn test_points_monotone_and_auc_in_range() {
        let y = array![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        let s = array![0.9, 0.8, 0.7, 0.7, 0.4, 0.3, 0.2, 0.1];
        let roc = roc_curve(&y, &s).unwrap();

        assert_eq!(roc.len(), 8); // +inf plus 7 distinct scores
        for w in roc.fpr.windows(2) {
            assert!(w[0] <= w[1]);
        }
        for w in roc.tpr.windows(2) {
            assert!(w[0] <= w[1]);
        }
        for w in roc.thresholds.windows(2) {
            assert!(w[0] > w[1]);
        }
        assert!((0.0..=1.0).contains(&roc.auc));
        // 8 concordant pairs plus one tie out of 16
        assert!((roc.auc - 8.5 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverted_scores() {
        let roc = roc_curve(&array![1.0, 1.0, 0.0], &array![0.0, 0.1, 5.0]).unwrap();
        assert_eq!(roc.auc, 0.0);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(roc_curve(&array![0.0, 1.0], &array![0.5]).is_err());
        assert!(roc_curve(&array![0.0, 1.0], &array![0.5, f64::NAN]).is_err());
        assert!(roc_curve(&array![1.0, 1.0], &array![0.5, 0.6]).is_err());
    }
}
