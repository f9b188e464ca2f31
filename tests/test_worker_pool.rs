//! Integration test: every parallel step stays on the explicit worker pool
//!
//! Lives in its own test binary so that nothing else in the process can
//! have initialised rayon's global pool first.

mod common;

use marketing_classifiers::comparison::{Comparison, ComparisonConfig};
use marketing_classifiers::training::ModelKind;
use marketing_classifiers::utils::WorkerPool;

#[test]
fn test_comparison_and_selection_leave_global_pool_untouched() {
    let dataset = common::dominant_feature_dataset(60, 3, 1, 17);
    let mut config = ComparisonConfig::default();
    config.adapters.tree_ensemble.n_trees = 20;
    config.selection = config
        .selection
        .clone()
        .with_model(ModelKind::TreeEnsemble)
        .with_top_k(1)
        .with_max_steps(1);
    let comparison = Comparison::new(config);

    {
        let pool = WorkerPool::with_threads(1).unwrap();
        let mut report = comparison.run(&dataset, &pool).unwrap();
        assert_eq!(report.len(), 8);

        comparison.run_feature_selection(&dataset, &pool, &mut report).unwrap();
        assert_eq!(report.len(), 9);

        let tuning = comparison.tune_ensemble(&dataset, &pool, 0.01).unwrap();
        assert_eq!(tuning.oob_error.len(), 20);

        let mut svm_config = comparison.config().clone();
        svm_config.selection = svm_config.selection.clone().with_model(ModelKind::SVM).with_top_k(0);
        let selection = Comparison::new(svm_config)
            .run_feature_selection(&dataset, &pool, &mut report)
            .unwrap();
        assert!(!selection.history.is_empty());
        assert_eq!(report.len(), 10);
    }

    // Fails with GlobalPoolAlreadyInitialized if any step fell back to the
    // implicit global pool
    let global = rayon::ThreadPoolBuilder::new().num_threads(1).build_global();
    assert!(global.is_ok(), "global pool was initialised: {:?}", global.err());
}
