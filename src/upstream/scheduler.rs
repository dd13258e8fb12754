//! Global admission gate for upstream calls.
//!
//! # Responsibilities
//! - Bound the number of upstream calls in flight
//! - Start queued calls in strict FIFO order
//! - Pace dispatches: a finished call frees its slot only after a fixed delay
//!
//! # Design Decisions
//! - Slots are permits of a fair (FIFO) `tokio::sync::Semaphore`
//! - Admitted calls run on their own task, so a caller going away never
//!   cancels a call or frees its slot early
//! - The pending queue is unbounded; overload grows latency, not errors

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::SchedulerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("scheduled task did not complete: {0}")]
    Aborted(String),
}

/// Point-in-time view of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub active: usize,
    pub pending: usize,
}

/// Concurrency-bounded FIFO scheduler shared by every upstream call site.
#[derive(Debug)]
pub struct UpstreamScheduler {
    slots: Arc<Semaphore>,
    dispatch_delay: Duration,
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    pending: AtomicUsize,
}

impl Counters {
    fn publish(&self) {
        metrics::record_scheduler(
            self.active.load(Ordering::SeqCst),
            self.pending.load(Ordering::SeqCst),
        );
    }
}

impl UpstreamScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self::with_limits(
            config.concurrency,
            Duration::from_millis(config.dispatch_delay_ms),
        )
    }

    pub fn with_limits(concurrency: usize, dispatch_delay: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(concurrency.max(1))),
            dispatch_delay,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Queue `task` and wait for its outcome.
    ///
    /// `task` is invoked only once a slot is free; its future then runs to
    /// completion on a separate task even if this call is dropped.
    pub async fn schedule<F, Fut, T>(&self, task: F) -> Result<T, ScheduleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let slot = self.acquire().await;
        let future = task();
        let handle = tokio::spawn(async move {
            let outcome = future.await;
            slot.release();
            outcome
        });

        handle
            .await
            .map_err(|e| ScheduleError::Aborted(e.to_string()))
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            active: self.counters.active.load(Ordering::SeqCst),
            pending: self.counters.pending.load(Ordering::SeqCst),
        }
    }

    async fn acquire(&self) -> DispatchSlot {
        let waiting = PendingGuard::enter(self.counters.clone());
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .expect("Semaphore closed unexpectedly");
        drop(waiting);

        self.counters.active.fetch_add(1, Ordering::SeqCst);
        self.counters.publish();
        DispatchSlot {
            permit: Some(permit),
            counters: self.counters.clone(),
            delay: self.dispatch_delay,
        }
    }
}

/// Marks a caller as queued until dropped.
struct PendingGuard {
    counters: Arc<Counters>,
}

impl PendingGuard {
    fn enter(counters: Arc<Counters>) -> Self {
        counters.pending.fetch_add(1, Ordering::SeqCst);
        counters.publish();
        Self { counters }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.counters.pending.fetch_sub(1, Ordering::SeqCst);
        self.counters.publish();
    }
}

/// A held concurrency slot. Dropping it frees the slot immediately.
struct DispatchSlot {
    permit: Option<OwnedSemaphorePermit>,
    counters: Arc<Counters>,
    delay: Duration,
}

impl DispatchSlot {
    /// Free the slot once the dispatch delay has elapsed.
    fn release(self) {
        if self.delay.is_zero() {
            return;
        }
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            drop(self);
        });
    }
}

impl Drop for DispatchSlot {
    fn drop(&mut self) {
        if self.permit.take().is_some() {
            self.counters.active.fetch_sub(1, Ordering::SeqCst);
            self.counters.publish();
        }
    }
}
