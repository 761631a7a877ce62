//! Bounded-parallelism job scheduling for fingerprint computations.
//!
//! The queue keeps at most `max_concurrent` jobs in flight; the rest wait
//! in a priority-ordered pending list. Every admitted job races its task
//! against a per-job timeout. A timed-out task is abandoned, not killed:
//! the spawned future keeps running detached and its eventual result is
//! discarded, so tasks must stay side-effect-light enough that an
//! abandoned run does no detectable harm.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Lowest accepted parallelism bound
pub const MIN_CONCURRENT: usize = 1;

/// Highest accepted parallelism bound
pub const MAX_CONCURRENT: usize = 10;

/// Poll interval for quiescence detection
const COMPLETION_POLL_MS: u64 = 50;

type TaskFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// A job waiting for admission. Owned exclusively by the queue and
/// destroyed on settlement.
struct PendingJob<T> {
    id: String,
    priority: i32,
    enqueued_at: Instant,
    task: TaskFuture<T>,
    settle: oneshot::Sender<Result<T>>,
}

struct QueueState<T> {
    pending: VecDeque<PendingJob<T>>,
    active: Vec<String>,
    max_concurrent: usize,
    job_timeout: Duration,
}

/// Bounded-parallelism scheduler for expensive async jobs.
///
/// Cloning yields another handle to the same queue.
pub struct JobQueue<T> {
    state: Arc<Mutex<QueueState<T>>>,
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> JobQueue<T> {
    /// Create a queue admitting at most `max_concurrent` jobs at a time,
    /// each bounded by `job_timeout`. Out-of-range bounds are clamped.
    pub fn new(max_concurrent: usize, job_timeout: Duration) -> Self {
        let bounded = max_concurrent.clamp(MIN_CONCURRENT, MAX_CONCURRENT);
        if bounded != max_concurrent {
            warn!(
                "max_concurrent {} clamped to {} (allowed {}..={})",
                max_concurrent, bounded, MIN_CONCURRENT, MAX_CONCURRENT
            );
        }

        Self {
            state: Arc::new(Mutex::new(QueueState {
                pending: VecDeque::new(),
                active: Vec::new(),
                max_concurrent: bounded,
                job_timeout,
            })),
        }
    }

    /// Queue `task`, ordered by descending `priority` with insertion order
    /// preserved among equal priorities.
    ///
    /// The returned receiver resolves once the job settles: the task's own
    /// result, [`Error::Timeout`] after the per-job timeout, or
    /// [`Error::QueueCleared`] when the job is rejected before starting.
    /// Timed-out tasks are left running detached; whatever they eventually
    /// produce is discarded.
    pub fn enqueue<F>(&self, id: impl Into<String>, priority: i32, task: F) -> oneshot::Receiver<Result<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (settle, receiver) = oneshot::channel();
        let job = PendingJob {
            id: id.into(),
            priority,
            enqueued_at: Instant::now(),
            task: Box::pin(task),
            settle,
        };

        {
            let mut state = self.lock();
            let slot = state
                .pending
                .partition_point(|queued| queued.priority >= priority);
            debug!(
                "job '{}' queued at slot {} ({} pending, {} active)",
                job.id,
                slot,
                state.pending.len() + 1,
                state.active.len()
            );
            state.pending.insert(slot, job);
        }
        self.pump();

        receiver
    }

    /// Reject every job that has not started yet with `reason`. Active
    /// jobs are unaffected and run to completion.
    pub fn clear_pending(&self, reason: &str) {
        let drained: Vec<PendingJob<T>> = {
            let mut state = self.lock();
            state.pending.drain(..).collect()
        };
        if drained.is_empty() {
            return;
        }

        warn!("rejecting {} pending jobs: {}", drained.len(), reason);
        for job in drained {
            let _ = job.settle.send(Err(Error::QueueCleared {
                reason: reason.to_string(),
            }));
        }
    }

    /// Resolve once the queue is quiescent: no active and no pending jobs.
    ///
    /// Detection polls rather than subscribing, so a queue that refills
    /// between polls simply keeps the wait alive.
    pub async fn wait_for_completion(&self) {
        loop {
            {
                let state = self.lock();
                if state.active.is_empty() && state.pending.is_empty() {
                    return;
                }
            }
            sleep(Duration::from_millis(COMPLETION_POLL_MS)).await;
        }
    }

    /// Update the parallelism bound. Values outside
    /// `MIN_CONCURRENT..=MAX_CONCURRENT` are logged and ignored; growth
    /// admits pending jobs immediately.
    pub fn set_max_concurrent(&self, max_concurrent: usize) {
        if !(MIN_CONCURRENT..=MAX_CONCURRENT).contains(&max_concurrent) {
            warn!(
                "ignoring max_concurrent {}, allowed range is {}..={}",
                max_concurrent, MIN_CONCURRENT, MAX_CONCURRENT
            );
            return;
        }

        let grew = {
            let mut state = self.lock();
            let grew = max_concurrent > state.max_concurrent;
            state.max_concurrent = max_concurrent;
            grew
        };
        if grew {
            self.pump();
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.lock().max_concurrent
    }

    /// Jobs waiting for admission.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Jobs currently in flight.
    pub fn active_len(&self) -> usize {
        self.lock().active.len()
    }

    /// Admit pending jobs while capacity remains.
    fn pump(&self) {
        loop {
            let job = {
                let mut state = self.lock();
                if state.active.len() >= state.max_concurrent {
                    return;
                }
                let Some(job) = state.pending.pop_front() else {
                    return;
                };
                state.active.push(job.id.clone());
                job
            };
            self.run(job);
        }
    }

    fn run(&self, job: PendingJob<T>) {
        let queue = self.clone();
        let job_timeout = self.lock().job_timeout;

        tokio::spawn(async move {
            let PendingJob {
                id,
                task,
                settle,
                enqueued_at,
                ..
            } = job;
            debug!("job '{}' started after {:?} queued", id, enqueued_at.elapsed());

            // The task runs in its own spawn so that a timeout abandons it
            // instead of cancelling it at a suspension point.
            let handle = tokio::spawn(task);
            let outcome = match timeout(job_timeout, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_error)) => Err(Error::Task {
                    job_id: id.clone(),
                    reason: join_error.to_string(),
                }),
                Err(_elapsed) => {
                    warn!(
                        "job '{}' timed out after {}ms, abandoning the running task",
                        id,
                        job_timeout.as_millis()
                    );
                    Err(Error::Timeout {
                        job_id: id.clone(),
                        timeout_ms: job_timeout.as_millis() as u64,
                    })
                }
            };

            if settle.send(outcome).is_err() {
                debug!("job '{}' settled with no listener", id);
            }
            queue.settle(&id);
        });
    }

    /// Sole re-entry point for draining the queue: every settlement frees
    /// a slot and attempts further admissions.
    fn settle(&self, id: &str) {
        {
            let mut state = self.lock();
            if let Some(position) = state.active.iter().position(|active| active == id) {
                state.active.swap_remove(position);
            }
        }
        self.pump();
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
