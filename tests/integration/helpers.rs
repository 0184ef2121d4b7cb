//! Test helpers and utilities

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chain_pool::{Callable, PoolConfig, PoolEvent, PoolObserver, RetryPolicy};

/// Pool config with timeouts short enough for tests.
pub fn config(name: &str, size: usize, capacity: usize) -> PoolConfig {
    PoolConfig::default()
        .with_name(name)
        .with_pool_size(size)
        .with_queue_capacity(capacity)
        .with_queue_timeout(Duration::from_millis(50))
        .with_retry(RetryPolicy::unbounded(Duration::from_millis(1)))
}

/// Collects the integer argument of every job that ran.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<i64>>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records its first argument and returns nothing.
    pub fn callable(&self) -> Callable {
        let seen = Arc::clone(&self.seen);
        Callable::named("record", move |args| {
            seen.lock().unwrap().push(args.require_i64(0)?);
            Ok(None)
        })
    }

    /// Records its first argument after sleeping `delay`.
    pub fn slow_callable(&self, delay: Duration) -> Callable {
        let seen = Arc::clone(&self.seen);
        Callable::named("slow_record", move |args| {
            thread::sleep(delay);
            seen.lock().unwrap().push(args.require_i64(0)?);
            Ok(None)
        })
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Recorded values, sorted.
    pub fn sorted(&self) -> Vec<i64> {
        let mut values = self.seen.lock().unwrap().clone();
        values.sort_unstable();
        values
    }
}

/// Counts the events it sees, by kind.
#[derive(Default)]
pub struct CountingObserver {
    pub completed: AtomicUsize,
    pub failed: AtomicUsize,
    pub queue_full: AtomicUsize,
    pub forward_failed: AtomicUsize,
    pub workers_stopped: AtomicUsize,
    pub source_failed: AtomicUsize,
    pub errors: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl CountingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn queue_full(&self) -> usize {
        self.queue_full.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl PoolObserver for CountingObserver {
    fn observe(&self, event: &PoolEvent<'_>) {
        match event {
            PoolEvent::JobCompleted { .. } => {
                self.completed.fetch_add(1, Ordering::SeqCst);
            }
            PoolEvent::JobFailed { error, .. } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                self.errors.lock().unwrap().push(error.to_string());
            }
            PoolEvent::QueueFull { .. } => {
                self.queue_full.fetch_add(1, Ordering::SeqCst);
            }
            PoolEvent::ForwardFailed { .. } => {
                self.forward_failed.fetch_add(1, Ordering::SeqCst);
            }
            PoolEvent::WorkerStopped { .. } => {
                self.workers_stopped.fetch_add(1, Ordering::SeqCst);
            }
            PoolEvent::SourceFailed { error, .. } => {
                self.source_failed.fetch_add(1, Ordering::SeqCst);
                self.errors.lock().unwrap().push(error.to_string());
            }
            _ => {}
        }
    }
}
