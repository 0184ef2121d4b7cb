//! Pool events and the sink they are reported to.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::pool::PoolError;

/// Which queue a producer was blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStage {
    /// The pool's own input queue (source consumer).
    Input,
    /// The forwarding queue to the next pool (workers).
    Output,
}

impl QueueStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStage::Input => "input",
            QueueStage::Output => "output",
        }
    }
}

/// Something that happened inside a pool.
#[derive(Debug)]
pub enum PoolEvent<'a> {
    /// `run` spawned the workers.
    Started { pool: &'a str, workers: usize },
    /// `wait` returned.
    Finished { pool: &'a str, elapsed: Duration },
    /// A job returned normally.
    JobCompleted {
        pool: &'a str,
        worker: usize,
        job: &'a str,
        duration: Duration,
        forwarded: bool,
    },
    /// A job returned an error or panicked. The worker keeps running.
    JobFailed {
        pool: &'a str,
        worker: usize,
        job: &'a str,
        duration: Duration,
        error: &'a PoolError,
    },
    /// A `put` timed out against a full queue and will be retried.
    QueueFull {
        pool: &'a str,
        stage: QueueStage,
        attempt: usize,
    },
    /// A job's result could not be handed to the next pool and was dropped.
    ForwardFailed {
        pool: &'a str,
        worker: usize,
        job: &'a str,
        error: &'a PoolError,
    },
    /// A worker left its loop.
    WorkerStopped {
        pool: &'a str,
        worker: usize,
        executed: usize,
    },
    /// The source ran dry after feeding `fed` jobs.
    SourceExhausted { pool: &'a str, fed: usize },
    /// The source consumer aborted.
    SourceFailed {
        pool: &'a str,
        fed: usize,
        error: &'a PoolError,
    },
}

impl PoolEvent<'_> {
    /// Name of the pool that emitted the event.
    pub fn pool(&self) -> &str {
        match self {
            PoolEvent::Started { pool, .. }
            | PoolEvent::Finished { pool, .. }
            | PoolEvent::JobCompleted { pool, .. }
            | PoolEvent::JobFailed { pool, .. }
            | PoolEvent::QueueFull { pool, .. }
            | PoolEvent::ForwardFailed { pool, .. }
            | PoolEvent::WorkerStopped { pool, .. }
            | PoolEvent::SourceExhausted { pool, .. }
            | PoolEvent::SourceFailed { pool, .. } => *pool,
        }
    }
}

/// Sink for pool events, shared by every thread of a pool.
pub trait PoolObserver: Send + Sync {
    fn observe(&self, event: &PoolEvent<'_>);
}

/// Default observer: turns events into `tracing` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PoolObserver for TracingObserver {
    fn observe(&self, event: &PoolEvent<'_>) {
        match *event {
            PoolEvent::Started { pool, workers } => {
                info!(pool = %pool, workers, "pool started");
            }
            PoolEvent::Finished { pool, elapsed } => {
                info!(
                    pool = %pool,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "pool finished"
                );
            }
            PoolEvent::JobCompleted {
                pool,
                worker,
                job,
                duration,
                forwarded,
            } => {
                debug!(
                    pool = %pool,
                    worker,
                    job = %job,
                    duration_us = duration.as_micros() as u64,
                    forwarded,
                    "job completed"
                );
            }
            PoolEvent::JobFailed {
                pool,
                worker,
                job,
                duration,
                error,
            } => {
                warn!(
                    pool = %pool,
                    worker,
                    job = %job,
                    duration_us = duration.as_micros() as u64,
                    error = %error,
                    "job failed"
                );
            }
            PoolEvent::QueueFull {
                pool,
                stage,
                attempt,
            } => {
                debug!(pool = %pool, stage = stage.as_str(), attempt, "queue full, retrying");
            }
            PoolEvent::ForwardFailed {
                pool,
                worker,
                job,
                error,
            } => {
                error!(
                    pool = %pool,
                    worker,
                    job = %job,
                    error = %error,
                    "dropped job result"
                );
            }
            PoolEvent::WorkerStopped {
                pool,
                worker,
                executed,
            } => {
                debug!(pool = %pool, worker, executed, "worker stopped");
            }
            PoolEvent::SourceExhausted { pool, fed } => {
                debug!(pool = %pool, fed, "source exhausted");
            }
            PoolEvent::SourceFailed { pool, fed, error } => {
                error!(pool = %pool, fed, error = %error, "source consumer aborted");
            }
        }
    }
}
