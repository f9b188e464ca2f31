//! Comparison reporting
//!
//! Collects per-model outcomes of one run and lays them out side by side:
//! a `2 x 2N` block of confusion percentages, a text table, and a JSON
//! document for plotting.

use crate::error::{ClassifyError, Result};
use crate::evaluation::{ConfusionMatrix, RocCurve};
use crate::training::ModelKind;
use chrono::{DateTime, Utc};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Step of a model run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Train,
    Predict,
    Evaluate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Train => write!(f, "train"),
            Stage::Predict => write!(f, "predict"),
            Stage::Evaluate => write!(f, "evaluate"),
        }
    }
}

/// A model that was trained and evaluated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOutcome {
    pub label: String,
    pub kind: ModelKind,
    pub confusion: ConfusionMatrix,
    /// Present when the model exposes positive-class scores
    pub roc: Option<RocCurve>,
    pub train_secs: f64,
    /// Original features the model was trained on
    pub n_features: usize,
}

impl ModelOutcome {
    pub fn auc(&self) -> Option<f64> {
        self.roc.as_ref().map(|r| r.auc)
    }
}

/// A model whose run stopped with an error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFailure {
    pub model: String,
    pub kind: ModelKind,
    pub stage: Stage,
    pub category: String,
    pub error: String,
}

impl ModelFailure {
    pub fn new(model: impl Into<String>, kind: ModelKind, stage: Stage, error: &ClassifyError) -> Self {
        Self {
            model: model.into(),
            kind,
            stage,
            category: error.category().to_string(),
            error: error.to_string(),
        }
    }
}

impl std::fmt::Display for ModelFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed at {}: {}", self.model, self.stage, self.error)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelResult {
    Success(ModelOutcome),
    Failure(ModelFailure),
}

impl ModelResult {
    pub fn label(&self) -> &str {
        match self {
            ModelResult::Success(o) => o.label.as_str(),
            ModelResult::Failure(f) => f.model.as_str(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ModelResult::Success(_))
    }
}

/// Outcomes of every model in one comparison run, in run order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub created_at: DateTime<Utc>,
    pub seed: u64,
    pub n_train: usize,
    pub n_test: usize,
    results: Vec<ModelResult>,
}

impl ComparisonReport {
    pub fn new(seed: u64, n_train: usize, n_test: usize) -> Self {
        Self {
            created_at: Utc::now(),
            seed,
            n_train,
            n_test,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: ModelResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[ModelResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &ModelOutcome> {
        self.results.iter().filter_map(|r| match r {
            ModelResult::Success(o) => Some(o),
            ModelResult::Failure(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &ModelFailure> {
        self.results.iter().filter_map(|r| match r {
            ModelResult::Failure(f) => Some(f),
            ModelResult::Success(_) => None,
        })
    }

    pub fn outcome(&self, label: &str) -> Option<&ModelOutcome> {
        self.successes().find(|o| o.label == label)
    }

    /// Model labels in block order
    pub fn labels(&self) -> Vec<String> {
        self.results.iter().map(|r| r.label().to_string()).collect()
    }

    /// Row-normalised confusion percentages side by side, `2 x 2N`; a failed
    /// model contributes a `NaN` block
    pub fn confusion_block(&self) -> Array2<f64> {
        let mut block = Array2::from_elem((2, 2 * self.results.len()), f64::NAN);
        for (i, result) in self.results.iter().enumerate() {
            if let ModelResult::Success(outcome) = result {
                block
                    .slice_mut(s![.., 2 * i..2 * i + 2])
                    .assign(outcome.confusion.percentages());
            }
        }
        block
    }

    /// Successful model with the highest holdout accuracy
    pub fn best_by_accuracy(&self) -> Option<&ModelOutcome> {
        self.successes().fold(None, |best: Option<&ModelOutcome>, o| match best {
            Some(b) if b.confusion.accuracy() >= o.confusion.accuracy() => Some(b),
            _ => Some(o),
        })
    }

    /// Fixed-width text table, one row per model
    pub fn render_table(&self) -> String {
        let width = self
            .results
            .iter()
            .map(|r| r.label().len())
            .max()
            .unwrap_or(0)
            .max(5);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<width$}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}  {:>9}",
            "Model", "TN %", "FP %", "FN %", "TP %", "Acc %", "Prec %", "AUC", "Train s",
            width = width
        );
        let _ = writeln!(out, "{}", "-".repeat(width + 2 + 8 * 10 + 9));

        for result in &self.results {
            match result {
                ModelResult::Success(o) => {
                    let pct = o.confusion.percentages();
                    let _ = writeln!(
                        out,
                        "{:<width$}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}  {:>9.3}",
                        o.label,
                        fmt_num(pct[[0, 0]], 2),
                        fmt_num(pct[[0, 1]], 2),
                        fmt_num(pct[[1, 0]], 2),
                        fmt_num(pct[[1, 1]], 2),
                        fmt_num(o.confusion.accuracy() * 100.0, 2),
                        fmt_num(o.confusion.precision() * 100.0, 2),
                        o.auc().map(|a| fmt_num(a, 4)).unwrap_or_else(|| "-".to_string()),
                        o.train_secs,
                        width = width
                    );
                }
                ModelResult::Failure(f) => {
                    let _ = writeln!(
                        out,
                        "{:<width$}  FAILED ({}): {}",
                        f.model,
                        f.stage,
                        f.error,
                        width = width
                    );
                }
            }
        }
        out
    }

    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Document<'a> {
            #[serde(flatten)]
            report: &'a ComparisonReport,
            labels: Vec<String>,
            confusion_block: Array2<f64>,
        }

        Ok(serde_json::to_string_pretty(&Document {
            report: self,
            labels: self.labels(),
            confusion_block: self.confusion_block(),
        })?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

fn fmt_num(v: f64, decimals: usize) -> String {
    if v.is_finite() {
        format!("{:.*}", decimals, v)
    } else {
        "-".to_string()
    }
}
