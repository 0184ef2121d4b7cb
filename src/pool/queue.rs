//! Bounded job queue with in-flight accounting.
//!
//! A FIFO of fixed capacity. `put` and `get` block up to a timeout; every
//! successful `get` must be matched by one `mark_done` so that `join` can
//! tell when all accepted work has completed. Producers `close` the queue
//! once they will put nothing more, which lets consumers stop as soon as it
//! drains instead of waiting out their timeout.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::job::Job;

/// Errors returned by queue operations.
pub enum QueueError {
    /// The queue stayed full until the timeout; the job is handed back.
    Full(Job),
    /// The queue stayed empty until the timeout.
    Empty,
    /// The queue is closed. Carries the rejected job for `put`.
    Closed(Option<Job>),
    /// `mark_done` was called more times than items were taken.
    Unbalanced,
}

impl QueueError {
    /// Recover the job a failed `put` was given.
    pub fn into_job(self) -> Option<Job> {
        match self {
            QueueError::Full(job) | QueueError::Closed(Some(job)) => Some(job),
            _ => None,
        }
    }
}

impl fmt::Debug for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Full(job) => f.debug_tuple("Full").field(&job.name()).finish(),
            QueueError::Empty => f.write_str("Empty"),
            QueueError::Closed(_) => f.write_str("Closed"),
            QueueError::Unbalanced => f.write_str("Unbalanced"),
        }
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Full(_) => write!(f, "queue full"),
            QueueError::Empty => write!(f, "queue empty"),
            QueueError::Closed(_) => write!(f, "queue closed"),
            QueueError::Unbalanced => write!(f, "mark_done called more times than items taken"),
        }
    }
}

impl std::error::Error for QueueError {}

struct QueueState {
    items: VecDeque<Job>,
    /// Items queued plus items taken but not yet marked done.
    in_flight: usize,
    closed: bool,
}

/// Thread-safe bounded FIFO of [`Job`]s.
pub struct JobQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    drained: Condvar,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` jobs (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                in_flight: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    // Jobs run outside the lock, so a poisoned mutex still holds
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a job, waiting up to `timeout` for free space.
    pub fn put(&self, job: Job, timeout: Duration) -> Result<(), QueueError> {
        let deadline = deadline_after(timeout);
        let mut state = self.lock();

        loop {
            if state.closed {
                return Err(QueueError::Closed(Some(job)));
            }
            if state.items.len() < self.capacity {
                break;
            }
            state = match wait_until(&self.not_full, state, deadline) {
                Some(state) => state,
                None => return Err(QueueError::Full(job)),
            };
        }

        state.items.push_back(job);
        state.in_flight += 1;
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue without waiting.
    pub fn try_put(&self, job: Job) -> Result<(), QueueError> {
        self.put(job, Duration::ZERO)
    }

    /// Dequeue a job, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `Closed` right away once the queue is closed and drained.
    pub fn get(&self, timeout: Duration) -> Result<Job, QueueError> {
        let deadline = deadline_after(timeout);
        let mut state = self.lock();

        loop {
            if let Some(job) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(job);
            }
            if state.closed {
                return Err(QueueError::Closed(None));
            }
            state = match wait_until(&self.not_empty, state, deadline) {
                Some(state) => state,
                None => return Err(QueueError::Empty),
            };
        }
    }

    /// Record that a job taken with `get` has finished, however it ended.
    pub fn mark_done(&self) -> Result<(), QueueError> {
        let mut state = self.lock();
        // Items still sitting in the queue have not been taken yet.
        if state.in_flight <= state.items.len() {
            return Err(QueueError::Unbalanced);
        }
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.drained.notify_all();
        }
        Ok(())
    }

    /// Block until every accepted job has been marked done.
    pub fn join(&self) {
        let mut state = self.lock();
        while state.in_flight > 0 {
            state = self
                .drained
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`join`](Self::join) but gives up after `timeout`.
    ///
    /// Returns `true` if the queue drained.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        let mut state = self.lock();
        while state.in_flight > 0 {
            state = match wait_until(&self.drained, state, deadline) {
                Some(state) => state,
                None => return false,
            };
        }
        true
    }

    /// Stop accepting jobs. Queued jobs can still be taken.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of jobs waiting in the queue.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Jobs queued plus jobs taken but not yet marked done.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// `None` when `timeout` is too large to be a point in time; such waits
/// never time out.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Wait on `condvar` until woken or `deadline` passes.
///
/// Returns `None` once the deadline has passed.
fn wait_until<'a>(
    condvar: &Condvar,
    state: MutexGuard<'a, QueueState>,
    deadline: Option<Instant>,
) -> Option<MutexGuard<'a, QueueState>> {
    match deadline {
        None => Some(condvar.wait(state).unwrap_or_else(PoisonError::into_inner)),
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            Some(
                condvar
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0,
            )
        }
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("JobQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("in_flight", &state.in_flight)
            .field("closed", &state.closed)
            .finish()
    }
}
