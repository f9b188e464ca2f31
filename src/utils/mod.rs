//! Utility functions and types

pub mod data_loader;
mod parallel;

pub use data_loader::{
    Column, ColumnKind, ColumnSummary, DataLoader, Dataset, Feature, LabelSet, LoadOptions,
    BANK_MARKETING_COLUMNS, UNKNOWN_CATEGORY,
};
pub use parallel::{ParallelConfig, WorkerPool};

use std::time::{Duration, Instant};

/// Simple wall-clock timer used to report per-model training time
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
