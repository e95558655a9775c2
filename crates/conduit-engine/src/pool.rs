//! Bounded worker pool.
//!
//! `workers` permits bound how many handlers execute at once. Operations
//! beyond that wait for a permit; with `max_queue_depth` set, an operation
//! that would make the waiting line longer than the limit is refused with
//! `Overloaded` instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use conduit_core::config::PoolConfig;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::IntentError;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    workers: usize,
    max_queue_depth: Option<usize>,
    outstanding: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// `workers` is clamped to at least one.
    pub fn new(workers: usize, max_queue_depth: Option<usize>) -> Self {
        let workers = workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
            max_queue_depth,
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.workers, config.max_queue_depth)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Most operations that may be admitted at once (running plus waiting),
    /// or `None` when the queue is unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.max_queue_depth.map(|depth| self.workers + depth)
    }

    /// Operations admitted and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Permits not currently held by a running handler.
    pub fn available_workers(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Stop handing out permits. Admitted operations still waiting for a
    /// worker fail, and later admissions are refused.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Reserve a place for one operation.
    pub fn admit(&self) -> Result<Admission, IntentError> {
        if self.is_closed() {
            return Err(self.overloaded(self.outstanding()));
        }

        match self.capacity() {
            Some(capacity) => {
                self.outstanding
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        (n < capacity).then_some(n + 1)
                    })
                    .map_err(|n| {
                        tracing::warn!(outstanding = n, capacity, "Worker pool full, refusing operation");
                        self.overloaded(n)
                    })?;
            }
            None => {
                self.outstanding.fetch_add(1, Ordering::SeqCst);
            }
        }

        Ok(Admission {
            pool: self.clone(),
            slot: Slot {
                outstanding: Arc::clone(&self.outstanding),
            },
        })
    }

    fn overloaded(&self, outstanding: usize) -> IntentError {
        IntentError::Overloaded {
            outstanding,
            capacity: self.capacity().unwrap_or(self.workers),
        }
    }
}

/// Counts one operation as outstanding until dropped.
#[derive(Debug)]
struct Slot {
    outstanding: Arc<AtomicUsize>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An admitted operation that has not yet got a worker.
#[derive(Debug)]
pub struct Admission {
    pool: WorkerPool,
    slot: Slot,
}

impl Admission {
    /// Wait for a free worker.
    pub async fn acquire(self) -> Result<WorkerPermit, IntentError> {
        match Arc::clone(&self.pool.semaphore).acquire_owned().await {
            Ok(permit) => Ok(WorkerPermit {
                _permit: permit,
                _slot: self.slot,
            }),
            Err(_) => Err(self.pool.overloaded(self.pool.outstanding())),
        }
    }
}

/// Held for as long as a handler occupies a worker.
#[derive(Debug)]
pub struct WorkerPermit {
    _permit: OwnedSemaphorePermit,
    _slot: Slot,
}
