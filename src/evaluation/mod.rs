//! Model evaluation
//!
//! Row-normalised confusion matrices and ROC curves with AUC.

mod confusion;
mod roc;

pub use confusion::{confusion_matrix, ConfusionMatrix};
pub use roc::{roc_curve, RocCurve};
