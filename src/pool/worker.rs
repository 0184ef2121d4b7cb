//! Worker thread loop.
//!
//! Each worker repeatedly takes a job from the pool's input queue, runs it
//! inside a panic boundary and forwards its result to the next pool when one
//! is attached. A failing job is reported and counted as done; the worker
//! itself keeps going. Workers stop when the queue is closed and empty, or,
//! for pools fed only through `add`, when no job arrives within
//! `queue_timeout`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use super::error::PoolError;
use super::job::Job;
use super::queue::{JobQueue, QueueError};
use super::Shared;
use crate::observability::{PoolEvent, QueueStage};

/// Worker thread main loop.
pub(crate) fn worker_loop(id: usize, shared: Arc<Shared>) {
    tracing::trace!(pool = %shared.name, worker = id, "worker started");

    let mut executed = 0;
    loop {
        let job = match shared.input.get(shared.queue_timeout) {
            Ok(job) => job,
            // A source consumer is still feeding; keep waiting.
            Err(QueueError::Empty) if shared.fed_by_source => continue,
            Err(_) => break,
        };

        execute(id, &shared, job);
        executed += 1;

        if let Err(e) = shared.input.mark_done() {
            tracing::error!(pool = %shared.name, worker = id, error = %e, "queue accounting broken");
        }
    }

    shared.observer.observe(&PoolEvent::WorkerStopped {
        pool: &shared.name,
        worker: id,
        executed,
    });

    // The last worker out tells the next pool that no more results follow.
    if shared.live_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
        if let Some(output) = &shared.output {
            output.close();
        }
    }
}

/// Run one job and forward its result.
fn execute(id: usize, shared: &Shared, job: Job) {
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.execute()));
    let duration = started.elapsed();

    let next = match outcome {
        Ok(Ok(next)) => next,
        Ok(Err(e)) => {
            report_failure(id, shared, &job, duration, PoolError::Execution(e.to_string()));
            return;
        }
        Err(payload) => {
            let error = PoolError::WorkerPanic(panic_message(&*payload));
            report_failure(id, shared, &job, duration, error);
            return;
        }
    };

    let forwarded = match (&shared.output, next) {
        (Some(output), Some(next)) => match forward(shared, output, next) {
            Ok(()) => true,
            Err(error) => {
                shared.observer.observe(&PoolEvent::ForwardFailed {
                    pool: &shared.name,
                    worker: id,
                    job: job.name(),
                    error: &error,
                });
                false
            }
        },
        // Results are only kept when another pool consumes them.
        _ => false,
    };

    shared.observer.observe(&PoolEvent::JobCompleted {
        pool: &shared.name,
        worker: id,
        job: job.name(),
        duration,
        forwarded,
    });
}

fn report_failure(
    id: usize,
    shared: &Shared,
    job: &Job,
    duration: std::time::Duration,
    error: PoolError,
) {
    shared.observer.observe(&PoolEvent::JobFailed {
        pool: &shared.name,
        worker: id,
        job: job.name(),
        duration,
        error: &error,
    });
}

/// Push a result onto the next pool's queue under the retry policy.
fn forward(shared: &Shared, output: &JobQueue, next: Job) -> Result<(), PoolError> {
    put_with_retry(shared, output, next, QueueStage::Output)
}

/// `put` that retries a rejected job until it is accepted or the retry
/// policy gives up.
pub(crate) fn put_with_retry(
    shared: &Shared,
    queue: &JobQueue,
    mut job: Job,
    stage: QueueStage,
) -> Result<(), PoolError> {
    let mut attempts = 0;
    loop {
        match queue.put(job, shared.queue_timeout) {
            Ok(()) => return Ok(()),
            Err(QueueError::Full(rejected)) => {
                attempts += 1;
                shared.observer.observe(&PoolEvent::QueueFull {
                    pool: &shared.name,
                    stage,
                    attempt: attempts,
                });
                if shared.retry.is_exhausted(attempts) {
                    return Err(PoolError::SourceStalled { attempts });
                }
                thread::sleep(shared.retry.interval());
                job = rejected;
            }
            Err(_) => return Err(PoolError::QueueClosed),
        }
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
