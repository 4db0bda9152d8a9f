//! # Concurrency Limiter
//!
//! Caps how many submitted operations run at once. Submission never blocks:
//! once `max_parallelism` operations are in flight, new calls wait in a FIFO
//! queue and start as soon as a running call settles, whether it succeeded,
//! failed, or panicked.
//!
//! One limiter is shared by the scan and update flows so that their budgets
//! are unified.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let limiter = ConcurrencyLimiter::new(config.max_parallelism);
//! let pending: Vec<_> = folders
//!     .into_iter()
//!     .map(|folder| limiter.submit(ingest(folder)))
//!     .collect();
//! let results = futures::future::join_all(pending).await;
//! ```

use crate::error::{Result, SyncError};
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{trace, warn};

type Job = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct State {
    in_flight: usize,
    queue: VecDeque<Job>,
}

struct Inner {
    max_parallelism: usize,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Jobs never run while the lock is held, so a poisoned lock still
        // holds consistent counters.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dispatch(&self, job: Job) {
        let run_now = {
            let mut state = self.lock();
            if state.in_flight < self.max_parallelism {
                state.in_flight += 1;
                Some(job)
            } else {
                state.queue.push_back(job);
                trace!(queued = state.queue.len(), "Limiter saturated, call queued");
                None
            }
        };

        if let Some(job) = run_now {
            job();
        }
    }

    fn release(&self) {
        let next = {
            let mut state = self.lock();
            match state.queue.pop_front() {
                Some(job) => Some(job),
                None => {
                    state.in_flight -= 1;
                    None
                }
            }
        };

        // The freed slot passes straight to the next queued call.
        if let Some(job) = next {
            job();
        }
    }
}

/// Bounded-concurrency executor for async operations.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<Inner>,
}

impl ConcurrencyLimiter {
    /// Create a limiter. A `max_parallelism` of zero is treated as one.
    pub fn new(max_parallelism: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_parallelism: max_parallelism.max(1),
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn max_parallelism(&self) -> usize {
        self.inner.max_parallelism
    }

    /// Number of calls currently executing.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// Number of calls waiting for a slot.
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Submit an operation.
    ///
    /// The call is accepted immediately. The returned future resolves with
    /// the operation's output once it has run, or with
    /// [`SyncError::TaskAborted`] if it panicked. Must be called from within
    /// a Tokio runtime.
    pub fn submit<F, T>(&self, operation: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);

        let job: Job = Box::new(move || {
            tokio::spawn(async move {
                let outcome = AssertUnwindSafe(operation).catch_unwind().await;
                if outcome.is_err() {
                    warn!("Limited operation panicked");
                }
                let result = outcome
                    .map_err(|_| SyncError::TaskAborted("operation panicked".to_string()));
                // The submitter may have stopped waiting.
                let _ = tx.send(result);
                inner.release();
            });
        });
        self.inner.dispatch(job);

        async move {
            match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(SyncError::TaskAborted("operation dropped".to_string())),
            }
        }
    }
}

impl std::fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyLimiter")
            .field("max_parallelism", &self.inner.max_parallelism)
            .field("in_flight", &self.in_flight())
            .field("queued", &self.queued())
            .finish()
    }
}
