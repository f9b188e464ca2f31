//! Integration test: loading, holdout comparison and reporting end-to-end

mod common;

use marketing_classifiers::comparison::{Comparison, ComparisonConfig};
use marketing_classifiers::preprocessing::{Encoding, FeatureEncoder, HoldoutPartition};
use marketing_classifiers::report::{ModelResult, Stage};
use marketing_classifiers::training::{AdapterConfigs, ModelKind, SVMConfig};
use marketing_classifiers::utils::{DataLoader, Dataset, LoadOptions, WorkerPool};
use ndarray::Array1;

fn separable_dataset() -> Dataset {
    let file = common::write_temp_csv(&common::separable_bank_csv(100, 7));
    DataLoader::new(LoadOptions::bank_marketing())
        .load(file.path())
        .expect("fixture should load with the strict schema")
}

#[test]
fn test_every_model_separates_clean_data() {
    let dataset = separable_dataset();
    assert_eq!(dataset.n_rows(), 100);
    assert_eq!(dataset.n_features(), 16);

    let pool = WorkerPool::with_threads(4).unwrap();
    let report = Comparison::new(ComparisonConfig::default()).run(&dataset, &pool).unwrap();

    assert_eq!(report.len(), 8);
    assert_eq!(report.n_test, 40);
    assert_eq!(report.n_train, 60);
    for result in report.results() {
        match result {
            ModelResult::Success(outcome) => {
                assert_eq!(
                    outcome.confusion.accuracy(),
                    1.0,
                    "{} misclassified holdout rows: {:?}",
                    outcome.label,
                    outcome.confusion.counts()
                );
                if let Some(auc) = outcome.auc() {
                    assert!((auc - 1.0).abs() < 1e-9, "{} AUC {}", outcome.label, auc);
                }
            }
            ModelResult::Failure(f) => panic!("{}", f),
        }
    }

    let block = report.confusion_block();
    assert_eq!(block.dim(), (2, 16));
    for model in 0..8 {
        assert!((block[[0, 2 * model]] - 100.0).abs() < 1e-9);
        assert!((block[[1, 2 * model + 1]] - 100.0).abs() < 1e-9);
    }
}

#[test]
fn test_every_model_handles_single_class_training() {
    let dataset = separable_dataset();
    let (_, ordinal) = FeatureEncoder::fit_transform(&dataset, Encoding::OrdinalCodes).unwrap();
    let (_, one_hot) = FeatureEncoder::fit_transform(&dataset, Encoding::OneHot).unwrap();
    let pool = WorkerPool::with_threads(2).unwrap();
    let adapters = AdapterConfigs::default();

    for class in [0.0, 1.0] {
        for kind in ModelKind::ALL {
            let adapter = adapters.adapter(kind);
            let data = match adapter.encoding() {
                Encoding::OrdinalCodes => &ordinal,
                Encoding::OneHot => &one_hot,
            };
            let y = Array1::from_elem(data.n_rows(), class);
            let model = adapter.train(&data.x, &y, &pool).unwrap();
            let predicted = model.predict(&data.x).unwrap();
            assert!(predicted.iter().all(|&p| p == class), "{} ignored the single class", kind);
        }
    }
}

#[test]
fn test_failing_model_does_not_abort_siblings() {
    let dataset = separable_dataset();
    let mut adapters = AdapterConfigs::default();
    adapters.svm = SVMConfig { c: -1.0, ..SVMConfig::default() };
    adapters.knn.n_neighbors = 500;
    let config = ComparisonConfig::default().with_adapters(adapters);
    let pool = WorkerPool::with_threads(2).unwrap();

    let report = Comparison::new(config).run(&dataset, &pool).unwrap();
    assert_eq!(report.len(), 8);

    let failed: Vec<_> = report.failures().map(|f| (f.kind, f.stage, f.category.clone())).collect();
    assert_eq!(
        failed,
        vec![
            (ModelKind::KNN, Stage::Train, "invalid_config".to_string()),
            (ModelKind::SVM, Stage::Train, "invalid_config".to_string()),
        ]
    );
    assert_eq!(report.successes().count(), 6);

    let block = report.confusion_block();
    let knn = report.labels().iter().position(|l| l == "k-NN").unwrap();
    assert!(block.column(2 * knn).iter().all(|v| v.is_nan()));
    assert!(report.render_table().contains("FAILED (train)"));
}

#[test]
fn test_shared_partition_is_reproducible() {
    let dataset = separable_dataset();
    let comparison = Comparison::new(ComparisonConfig::default().with_seed(11));
    let first = comparison.prepare(&dataset).unwrap();
    let second = comparison.prepare(&dataset).unwrap();
    assert_eq!(first.partition, second.partition);
    assert_eq!(first.partition, HoldoutPartition::new(100, 0.4, 11).unwrap());
    assert_eq!(first.matrix(Encoding::OrdinalCodes).n_cols(), 16);
    assert!(first.matrix(Encoding::OneHot).n_cols() > 16);
}

#[test]
fn test_json_report_export() {
    let dataset = separable_dataset();
    let config = ComparisonConfig::default()
        .with_models(vec![ModelKind::NaiveBayes, ModelKind::DecisionTree])
        .with_stratify(true);
    let pool = WorkerPool::with_threads(2).unwrap();
    let report = Comparison::new(config).run(&dataset, &pool).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.write_json(&path).unwrap();

    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["labels"], serde_json::json!(["Naive Bayes", "Decision Tree"]));
    assert_eq!(value["results"][0]["status"], "success");
    assert_eq!(value["results"][0]["kind"], "naive_bayes");
    assert!(value["results"][0]["roc"]["auc"].is_number());
    assert_eq!(value["confusion_block"]["dim"], serde_json::json!([2, 4]));
}

#[test]
fn test_feature_selection_appends_retrained_model() {
    let dataset = common::dominant_feature_dataset(80, 4, 2, 3);
    let mut config = ComparisonConfig::default().with_models(vec![ModelKind::DecisionTree]);
    config.adapters.tree_ensemble.n_trees = 30;
    config.selection = config
        .selection
        .clone()
        .with_model(ModelKind::DecisionTree)
        .with_top_k(1)
        .with_max_steps(3);
    let pool = WorkerPool::with_threads(4).unwrap();
    let comparison = Comparison::new(config);

    let mut report = comparison.run(&dataset, &pool).unwrap();
    let selection = comparison.run_feature_selection(&dataset, &pool, &mut report).unwrap();

    assert!(selection.included[2], "dominant feature must be selected");
    assert!(selection.included.iter().filter(|&&b| !b).count() >= 1);
    assert!(selection.history.len() <= 3);
    assert_eq!(report.labels(), vec!["Decision Tree", "Decision Tree (selected features)"]);

    let retrained = report.outcome("Decision Tree (selected features)").unwrap();
    assert_eq!(retrained.n_features, selection.selected_indices().len());
    assert_eq!(retrained.confusion.accuracy(), 1.0);
}
