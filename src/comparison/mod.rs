//! Comparison runner
//!
//! One run fits the encoder, draws a single holdout partition and trains
//! every enabled model on it. A model that fails is recorded with the stage
//! it failed at; the others carry on.

use crate::error::{ClassifyError, Result};
use crate::evaluation::{confusion_matrix, roc_curve};
use crate::preprocessing::{
    top_k_features, EncodedMatrix, Encoding, FeatureEncoder, HoldoutPartition, SelectionConfig,
    SelectionResult, SequentialFeatureSelector,
};
use crate::report::{ComparisonReport, ModelFailure, ModelOutcome, ModelResult, Stage};
use crate::training::{AdapterConfigs, ModelAdapter, ModelKind};
use crate::utils::{Dataset, ParallelConfig, Timer, WorkerPool};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Settings of one comparison run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Fraction of rows held out for testing
    pub holdout_fraction: f64,
    pub seed: u64,
    /// Draw the holdout per class
    pub stratify: bool,
    /// Worker threads (None = all cores)
    pub n_threads: Option<usize>,
    /// Models to run, in report order
    pub models: Vec<ModelKind>,
    pub adapters: AdapterConfigs,
    pub selection: SelectionConfig,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            holdout_fraction: 0.4,
            seed: 42,
            stratify: false,
            n_threads: None,
            models: ModelKind::ALL.to_vec(),
            adapters: AdapterConfigs::default(),
            selection: SelectionConfig::default(),
        }
    }
}

impl ComparisonConfig {
    /// Load from a JSON file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn with_holdout(mut self, fraction: f64) -> Self {
        self.holdout_fraction = fraction;
        self
    }

    /// Seed the partition, the selector folds and every seeded adapter
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.selection.seed = seed;
        self.adapters.reseed(seed);
        self
    }

    pub fn with_stratify(mut self, stratify: bool) -> Self {
        self.stratify = stratify;
        self
    }

    pub fn with_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }

    pub fn with_models(mut self, models: Vec<ModelKind>) -> Self {
        self.models = models;
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterConfigs) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_selection(mut self, selection: SelectionConfig) -> Self {
        self.selection = selection;
        self
    }

    pub fn parallel_config(&self) -> ParallelConfig {
        match self.n_threads {
            Some(n) => ParallelConfig::new().with_threads(n),
            None => ParallelConfig::new(),
        }
    }

    /// Run-level checks. Adapter hyperparameters are checked per model so a
    /// bad one only fails that model.
    pub fn validate(&self) -> Result<()> {
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(ClassifyError::InvalidArgument(format!(
                "holdout fraction must be in (0, 1), got {}",
                self.holdout_fraction
            )));
        }
        if self.models.is_empty() {
            return Err(ClassifyError::InvalidConfig("no models enabled".to_string()));
        }
        for (i, kind) in self.models.iter().enumerate() {
            if self.models[..i].contains(kind) {
                return Err(ClassifyError::InvalidConfig(format!(
                    "model '{}' is listed twice",
                    kind
                )));
            }
        }
        if self.n_threads == Some(0) {
            return Err(ClassifyError::InvalidConfig(
                "n_threads must be at least 1".to_string(),
            ));
        }
        self.selection.validate()
    }
}

/// Encoded data and the partition shared by every model of a run
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub encoder: FeatureEncoder,
    pub partition: HoldoutPartition,
    ordinal: EncodedMatrix,
    one_hot: EncodedMatrix,
}

impl PreparedData {
    pub fn matrix(&self, encoding: Encoding) -> &EncodedMatrix {
        match encoding {
            Encoding::OrdinalCodes => &self.ordinal,
            Encoding::OneHot => &self.one_hot,
        }
    }

    pub fn train(&self, encoding: Encoding) -> EncodedMatrix {
        self.matrix(encoding).select_rows(&self.partition.train_indices())
    }

    pub fn test(&self, encoding: Encoding) -> EncodedMatrix {
        self.matrix(encoding).select_rows(&self.partition.test_indices())
    }
}

/// Out-of-bag view of the ensemble grown on the training partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleTuning {
    pub oob_error: Vec<f64>,
    /// Smallest size within tolerance of the best OOB error
    pub suggested_size: Option<usize>,
    pub tolerance: f64,
    pub feature_names: Vec<String>,
    pub permutation_importance: Option<Array1<f64>>,
}

impl EnsembleTuning {
    /// `(feature name, importance)` in decreasing importance
    pub fn ranked_importance(&self) -> Vec<(String, f64)> {
        let Some(importance) = &self.permutation_importance else {
            return Vec::new();
        };
        top_k_features(importance, importance.len())
            .into_iter()
            .map(|i| (self.feature_names[i].clone(), importance[i]))
            .collect()
    }
}

/// Holdout comparison of the configured models
#[derive(Debug, Clone)]
pub struct Comparison {
    config: ComparisonConfig,
}

impl Comparison {
    pub fn new(config: ComparisonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComparisonConfig {
        &self.config
    }

    /// Fit the encoder and draw the partition
    pub fn prepare(&self, dataset: &Dataset) -> Result<PreparedData> {
        self.config.validate()?;
        let partition = if self.config.stratify {
            HoldoutPartition::stratified(dataset.labels(), self.config.holdout_fraction, self.config.seed)?
        } else {
            HoldoutPartition::new(dataset.n_rows(), self.config.holdout_fraction, self.config.seed)?
        };

        let encoder = FeatureEncoder::fit(dataset);
        let ordinal = encoder.transform(dataset, Encoding::OrdinalCodes)?;
        let one_hot = encoder.transform(dataset, Encoding::OneHot)?;
        info!(
            rows = dataset.n_rows(),
            n_train = partition.n_train(),
            n_test = partition.n_test(),
            one_hot_columns = one_hot.n_cols(),
            seed = self.config.seed,
            "Prepared holdout partition"
        );

        Ok(PreparedData { encoder, partition, ordinal, one_hot })
    }

    /// Train and evaluate every enabled model on the shared partition
    pub fn run(&self, dataset: &Dataset, pool: &WorkerPool) -> Result<ComparisonReport> {
        let prepared = self.prepare(dataset)?;
        self.run_prepared(&prepared, pool)
    }

    pub fn run_prepared(&self, prepared: &PreparedData, pool: &WorkerPool) -> Result<ComparisonReport> {
        let mut report = ComparisonReport::new(
            self.config.seed,
            prepared.partition.n_train(),
            prepared.partition.n_test(),
        );

        let encodings = [Encoding::OrdinalCodes, Encoding::OneHot];
        let splits: Vec<(EncodedMatrix, EncodedMatrix)> = encodings
            .iter()
            .map(|&e| (prepared.train(e), prepared.test(e)))
            .collect();
        let split_for = |encoding: Encoding| match encoding {
            Encoding::OrdinalCodes => &splits[0],
            Encoding::OneHot => &splits[1],
        };

        let n_features = prepared.encoder.n_features();
        let results: Vec<ModelResult> = pool.map(self.config.models.clone(), |kind| {
            let adapter = self.config.adapters.adapter(kind);
            let (train, test) = split_for(adapter.encoding());
            evaluate_model(kind.to_string(), adapter.as_ref(), train, test, n_features, pool)
        });

        for result in results {
            report.push(result);
        }
        info!(
            models = report.len(),
            failed = report.failures().count(),
            "Comparison finished"
        );
        Ok(report)
    }

    /// Grow the ensemble on the training partition for its importances
    fn ensemble_importance(&self, prepared: &PreparedData, pool: &WorkerPool) -> Result<Option<Array1<f64>>> {
        let train = prepared.train(Encoding::OrdinalCodes);
        let model = self.config.adapters.tree_ensemble.train(&train.x, &train.y, pool)?;
        Ok(model
            .ensemble_diagnostics()
            .and_then(|d| d.permutation_importance.clone()))
    }

    /// Sequential forward selection seeded with the ensemble's top features;
    /// the designated model retrained on the selected subset is appended to
    /// `report` as `"<model> (selected features)"`
    pub fn run_feature_selection(
        &self,
        dataset: &Dataset,
        pool: &WorkerPool,
        report: &mut ComparisonReport,
    ) -> Result<SelectionResult> {
        let prepared = self.prepare(dataset)?;
        let selection = &self.config.selection;
        let n_features = prepared.encoder.n_features();

        let mut forced = vec![false; n_features];
        if selection.top_k > 0 {
            match self.ensemble_importance(&prepared, pool)? {
                Some(importance) => {
                    for i in top_k_features(&importance, selection.top_k) {
                        forced[i] = true;
                    }
                }
                None => warn!("Ensemble produced no importances, starting selection from an empty subset"),
            }
        }

        let adapter = self.config.adapters.adapter(selection.model);
        let train = prepared.train(adapter.encoding());
        let selector = SequentialFeatureSelector::new(selection.clone());
        let result = selector.select(&train, adapter.as_ref(), &forced, pool)?;

        let names = dataset.feature_names();
        info!(
            model = %selection.model,
            selected = ?result.selected_indices().iter().map(|&i| names[i].as_str()).collect::<Vec<_>>(),
            criterion = result.final_criterion(),
            "Feature selection finished"
        );

        let test = prepared.test(adapter.encoding());
        let outcome = match (
            train.select_features(&result.included),
            test.select_features(&result.included),
        ) {
            (Ok(train_sel), Ok(test_sel)) => evaluate_model(
                format!("{} (selected features)", selection.model),
                adapter.as_ref(),
                &train_sel,
                &test_sel,
                result.selected_indices().len(),
                pool,
            ),
            (Err(e), _) | (_, Err(e)) => ModelResult::Failure(ModelFailure::new(
                format!("{} (selected features)", selection.model),
                selection.model,
                Stage::Train,
                &e,
            )),
        };
        report.push(outcome);
        Ok(result)
    }

    /// OOB error curve and suggested size of the ensemble
    pub fn tune_ensemble(&self, dataset: &Dataset, pool: &WorkerPool, tolerance: f64) -> Result<EnsembleTuning> {
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(ClassifyError::InvalidArgument(format!(
                "tolerance must be finite and non-negative, got {}",
                tolerance
            )));
        }
        let prepared = self.prepare(dataset)?;
        let train = prepared.train(Encoding::OrdinalCodes);
        let model = self.config.adapters.tree_ensemble.train(&train.x, &train.y, pool)?;
        let diagnostics = model.ensemble_diagnostics().ok_or_else(|| {
            ClassifyError::InvalidArgument(
                "training partition holds a single class, no out-of-bag curve".to_string(),
            )
        })?;

        let suggested_size = diagnostics.suggest_ensemble_size(tolerance);
        info!(
            n_trees = diagnostics.oob_error.len(),
            suggested = ?suggested_size,
            final_oob = diagnostics.final_oob_error().unwrap_or(f64::NAN),
            "Ensemble tuned"
        );
        Ok(EnsembleTuning {
            oob_error: diagnostics.oob_error.clone(),
            suggested_size,
            tolerance,
            feature_names: dataset.feature_names(),
            permutation_importance: diagnostics.permutation_importance.clone(),
        })
    }
}

/// Train, predict and evaluate one model inside `pool`; errors become a
/// failure entry
fn evaluate_model(
    label: String,
    adapter: &dyn ModelAdapter,
    train: &EncodedMatrix,
    test: &EncodedMatrix,
    n_features: usize,
    pool: &WorkerPool,
) -> ModelResult {
    pool.install(|| evaluate_in_pool(label, adapter, train, test, n_features, pool))
}

fn evaluate_in_pool(
    label: String,
    adapter: &dyn ModelAdapter,
    train: &EncodedMatrix,
    test: &EncodedMatrix,
    n_features: usize,
    pool: &WorkerPool,
) -> ModelResult {
    let kind = adapter.kind();
    let fail = |stage: Stage, e: ClassifyError| {
        warn!(model = %label, stage = %stage, error = %e, "Model failed");
        ModelResult::Failure(ModelFailure::new(label.clone(), kind, stage, &e))
    };

    let timer = Timer::start();
    let model = match adapter.train(&train.x, &train.y, pool) {
        Ok(m) => m,
        Err(e) => return fail(Stage::Train, e),
    };
    let train_secs = timer.elapsed_secs();

    let predicted = match model.predict(&test.x) {
        Ok(p) => p,
        Err(e) => return fail(Stage::Predict, e),
    };
    let scores = match model.positive_scores(&test.x) {
        Ok(s) => s,
        Err(e) => return fail(Stage::Predict, e),
    };

    let confusion = match confusion_matrix(&test.y, &predicted) {
        Ok(cm) => cm,
        Err(e) => return fail(Stage::Evaluate, e),
    };
    let roc = scores.and_then(|s| match roc_curve(&test.y, &s) {
        Ok(roc) => Some(roc),
        Err(e) => {
            debug!(model = %label, error = %e, "No ROC curve");
            None
        }
    });

    info!(
        model = %label,
        accuracy = confusion.accuracy(),
        sensitivity = confusion.sensitivity(),
        auc = roc.as_ref().map(|r| r.auc).unwrap_or(f64::NAN),
        train_secs,
        "Model evaluated"
    );
    ModelResult::Success(ModelOutcome {
        label,
        kind,
        confusion,
        roc,
        train_secs,
        n_features,
    })
}
