//! Parallel processing utilities
//!
//! Training, candidate scoring and the comparison's per-model evaluation run
//! inside an explicit [`WorkerPool`]. Prediction iterators inherit whichever
//! pool they are called from, so callers outside the crate should reach them
//! through [`WorkerPool::install`] as well.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClassifyError, Result};

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Number of threads (None = use all available)
    pub n_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set number of threads
    pub fn with_threads(mut self, n: usize) -> Self {
        self.n_threads = Some(n);
        self
    }

    /// Get the number of threads to use
    pub fn num_threads(&self) -> usize {
        self.n_threads
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }
}

/// Lifetime-scoped worker pool.
///
/// Owns a dedicated rayon pool. Dropping the value signals its threads to
/// exit once idle, whether the consuming steps succeeded or not; it does not
/// wait for them.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    n_threads: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("n_threads", &self.n_threads)
            .finish()
    }
}

impl WorkerPool {
    /// Build a pool from configuration
    pub fn new(config: &ParallelConfig) -> Result<Self> {
        let n_threads = config.num_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("classify-worker-{}", i))
            .build()
            .map_err(|e| ClassifyError::ThreadPoolError(e.to_string()))?;
        debug!(n_threads, "Worker pool started");
        Ok(Self { pool, n_threads })
    }

    /// Build a pool with a fixed number of threads
    pub fn with_threads(n: usize) -> Result<Self> {
        Self::new(&ParallelConfig::new().with_threads(n))
    }

    /// Number of worker threads
    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Run a closure inside the pool; rayon iterators used by the closure
    /// execute on this pool's threads.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Map independent tasks across the pool and join the results in order
    pub fn map<T, U, F>(&self, items: Vec<T>, f: F) -> Vec<U>
    where
        T: Send,
        U: Send,
        F: Fn(T) -> U + Send + Sync,
    {
        self.pool.install(|| items.into_par_iter().map(f).collect())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        debug!(n_threads = self.n_threads, "Worker pool released");
    }
}
