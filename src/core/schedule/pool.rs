//! Bounded worker pool
//!
//! Worker tasks run on the tokio runtime's worker threads. A semaphore bounds
//! how many run at once; the join set tracks every submitted task so the
//! controller can drain the pool at phase barriers.

use crate::domain::TransformError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinSet};

/// Records per worker before the pool grows by one
const RECORDS_PER_WORKER: usize = 10;

/// Pool size for a batch: `max(1, min(cap, total_records / 10))`
pub fn pool_size(total_records: usize, cap: usize) -> usize {
    cap.min(total_records / RECORDS_PER_WORKER).max(1)
}

/// Bounded set of in-flight worker tasks
pub struct WorkerPool {
    tasks: JoinSet<Result<(), TransformError>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `size` tasks at once
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            tasks: JoinSet::new(),
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Creates a pool sized for a batch of `total_records`
    pub fn sized_for(total_records: usize, cap: usize) -> Self {
        Self::new(pool_size(total_records, cap))
    }

    pub fn pool_size(&self) -> usize {
        self.size
    }

    /// Submits a task; it starts once a worker slot is free
    pub fn submit<F>(&mut self, task: F) -> AbortHandle
    where
        F: Future<Output = Result<(), TransformError>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| TransformError::WorkerPanicked(format!("worker pool closed: {e}")))?;
            task.await
        })
    }

    /// Tasks submitted and not yet drained
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for every submitted task and returns their errors
    ///
    /// Never stops early: sibling tasks of a failed task run to completion.
    /// A panicked or cancelled task is reported as
    /// [`TransformError::WorkerPanicked`].
    pub async fn drain_and_collect_errors(&mut self) -> Vec<TransformError> {
        let mut errors = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(TransformError::WorkerPanicked(e.to_string())),
            }
        }
        errors
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("in_flight", &self.tasks.len())
            .finish()
    }
}
