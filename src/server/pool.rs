//! Bounded worker pool for deferred handlers
//!
//! Every submitted job gets its own lightweight task that waits for one of
//! `capacity` permits and then runs the job on the blocking thread pool, so
//! no more than `capacity` jobs execute at once however many are queued.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Worker pool is closed")]
    Closed,

    #[error("Job failed: {0}")]
    Panicked(String),
}

#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        debug!("Starting worker pool with {} workers", capacity);

        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs currently holding a worker
    pub fn active(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Queue `job` and hand its result to `deliver` from the worker side
    ///
    /// Jobs still waiting for a worker when the pool closes are delivered
    /// [`PoolError::Closed`]; running jobs are left to finish.
    pub fn spawn<T, J, D>(&self, job: J, deliver: D)
    where
        T: Send + 'static,
        J: FnOnce() -> T + Send + 'static,
        D: FnOnce(Result<T, PoolError>) + Send + 'static,
    {
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(permit) => tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    job()
                })
                .await
                .map_err(|e| PoolError::Panicked(e.to_string())),
                Err(_) => Err(PoolError::Closed),
            };

            trace!("Worker pool job finished");
            deliver(result);
        });
    }

    /// Refuse queued and future jobs
    pub fn close(&self) {
        if !self.permits.is_closed() {
            debug!("Closing worker pool ({} active)", self.active());
            self.permits.close();
        }
    }
}
