//! Concurrency budget for file workers
//!
//! Admission takes a slot from a counting semaphore; the slot is released when
//! the [`WorkerSlot`] is dropped, which happens on every exit path of the task
//! that owns it (normal return, error, or panic unwind).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Process-wide bound on running file workers
#[derive(Clone)]
pub struct ConcurrencyBudget {
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
    max: usize,
}

#[derive(Default)]
struct Counters {
    running: AtomicUsize,
    peak: AtomicUsize,
}

/// A held admission slot
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.counters.running.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyBudget {
    /// A budget of `max` slots; zero is raised to one
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            counters: Arc::new(Counters::default()),
            max,
        }
    }

    /// Wait until a slot is free and take it
    pub async fn admit(&self) -> Result<WorkerSlot, AcquireError> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;

        let running = self.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(running, Ordering::SeqCst);

        Ok(WorkerSlot {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Workers currently holding a slot
    pub fn running(&self) -> usize {
        self.counters.running.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously held slots so far
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn is_idle(&self) -> bool {
        self.running() == 0
    }
}
