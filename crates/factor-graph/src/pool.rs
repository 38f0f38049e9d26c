//! Bounded worker pool for CPU-bound fan-out.
//!
//! Batches smaller than the threshold run sequentially on the calling thread.
//! Larger ones run on a rayon pool; every call returns only after all items
//! finished, which is the join barrier the caller relies on.

use std::sync::Arc;

use rayon::prelude::*;

use crate::error::ModelError;

/// Batches below this size are not worth dispatching to the pool.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 8;

#[derive(Clone)]
pub struct WorkerPool {
    pool: Option<Arc<rayon::ThreadPool>>,
    threshold: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl Default for WorkerPool {
    /// Rayon's global pool with the default threshold.
    fn default() -> Self {
        Self {
            pool: None,
            threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl WorkerPool {
    /// Dedicated pool with `num_threads` workers (`0` = one per core).
    pub fn new(num_threads: usize, threshold: usize) -> Result<Self, ModelError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("factor-worker-{i}"))
            .build()?;
        tracing::debug!(
            threads = pool.current_num_threads(),
            threshold,
            "Worker pool started"
        );
        Ok(Self {
            pool: Some(Arc::new(pool)),
            threshold,
        })
    }

    /// Never fans out.
    pub fn sequential() -> Self {
        Self {
            pool: None,
            threshold: usize::MAX,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether a batch of `len` items would be dispatched to the pool.
    pub fn is_parallel_for(&self, len: usize) -> bool {
        len >= self.threshold
    }

    /// Map `f` over `items`, preserving order.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        if !self.is_parallel_for(items.len()) {
            return items.iter().map(f).collect();
        }
        self.install(|| items.par_iter().map(&f).collect())
    }

    /// Run `f` on every item, stopping at the first error.
    pub fn try_for_each_mut<T, E, F>(&self, items: &mut [T], f: F) -> Result<(), E>
    where
        T: Send,
        E: Send,
        F: Fn(&mut T) -> Result<(), E> + Sync + Send,
    {
        if !self.is_parallel_for(items.len()) {
            return items.iter_mut().try_for_each(f);
        }
        self.install(|| items.par_iter_mut().try_for_each(&f))
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}
