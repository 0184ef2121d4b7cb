//! Bounded thread pool with pipelining.
//!
//! # Architecture
//!
//! ```text
//!  Source ──▶ consumer ──▶ [input queue] ──▶ workers ──┐
//!                          (pool A)                    │ results
//!                                                      ▼
//!                                               [forward queue]
//!                                                      │
//!             consumer ◀───────────────────────────────┘
//!                │
//!                ▼
//!          [input queue] ──▶ workers
//!           (pool B)
//! ```
//!
//! Every queue is bounded. A slow stage fills its input queue, which makes
//! the previous stage's workers block on `put`, which stops them taking new
//! work, which in turn stalls that stage's source consumer. Memory use stays
//! capped at the queue capacities no matter how long the source is.
//!
//! # Example
//!
//! ```rust,ignore
//! use chain_pool::{Args, Callable, PoolConfig, ThreadPool};
//!
//! let mut pool = ThreadPool::new(PoolConfig::default().with_pool_size(4))?;
//! pool.run()?;
//! let double = Callable::named("double", |args| {
//!     println!("{}", args.require_i64(0)? * 2);
//!     Ok(None)
//! });
//! for n in 0..10 {
//!     pool.add(double.clone(), Args::new().arg(n))?;
//! }
//! pool.wait()?;
//! ```

mod error;
mod job;
mod queue;
mod source;
mod worker;

pub use error::{PoolError, PoolResult};
pub use job::{Args, Callable, Job, JobError, JobResult, JobSpec, Registry};
pub use queue::{JobQueue, QueueError};
pub use source::Source;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crate::config::{PoolConfig, RetryPolicy};
use crate::observability::{PoolEvent, PoolObserver, TracingObserver};

/// Lifecycle of a pool. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Built, threads not spawned yet.
    Created,
    /// `run` has spawned the threads.
    Running,
    /// `wait` has returned.
    Finished,
}

/// State shared by a running pool's threads.
pub(crate) struct Shared {
    pub(crate) name: String,
    pub(crate) input: Arc<JobQueue>,
    pub(crate) output: Option<Arc<JobQueue>>,
    pub(crate) observer: Arc<dyn PoolObserver>,
    pub(crate) queue_timeout: Duration,
    pub(crate) retry: RetryPolicy,
    /// Workers wait out empty queues while a consumer is still feeding.
    pub(crate) fed_by_source: bool,
    pub(crate) live_workers: Arc<AtomicUsize>,
}

/// A fixed set of worker threads draining one bounded job queue.
pub struct ThreadPool {
    config: PoolConfig,
    input: Arc<JobQueue>,
    /// Forward queue to the next pool, set by `forward`.
    output: Option<Arc<JobQueue>>,
    source: Source,
    observer: Arc<dyn PoolObserver>,
    state: PoolState,
    workers: Vec<JoinHandle<()>>,
    consumer: Option<JoinHandle<(usize, PoolResult<()>)>>,
    live_workers: Arc<AtomicUsize>,
    fed: usize,
    source_error: Option<PoolError>,
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
    started_at: Option<Instant>,
    elapsed: Option<Duration>,
}

impl ThreadPool {
    /// Create a pool fed by hand through [`add`](Self::add).
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            input: Arc::new(JobQueue::new(config.queue_capacity())),
            config,
            output: None,
            source: Source::None,
            observer: Arc::new(TracingObserver),
            state: PoolState::Created,
            workers: Vec::new(),
            consumer: None,
            live_workers: Arc::new(AtomicUsize::new(0)),
            fed: 0,
            source_error: None,
            start_time: None,
            end_time: None,
            started_at: None,
            elapsed: None,
        })
    }

    /// Create a pool fed from `source` by a background consumer.
    pub fn with_source(config: PoolConfig, source: Source) -> PoolResult<Self> {
        let mut pool = Self::new(config)?;
        pool.source = source;
        Ok(pool)
    }

    /// Report events to `observer` instead of `tracing`.
    pub fn with_observer(mut self, observer: Arc<dyn PoolObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the source. Only allowed before `run`.
    pub fn set_source(&mut self, source: Source) -> PoolResult<()> {
        self.ensure_created()?;
        self.source = source;
        Ok(())
    }

    /// Send every job result of this pool to `next` as a new job.
    ///
    /// Both pools must not be running yet. Chains are built by calling
    /// `forward` on each stage in turn.
    pub fn forward(&mut self, next: &mut ThreadPool) -> PoolResult<()> {
        self.ensure_created()?;
        next.ensure_created()?;

        let link = Arc::new(JobQueue::new(self.config.queue_capacity()));
        self.output = Some(Arc::clone(&link));
        next.source = Source::Queue(link);
        Ok(())
    }

    /// Enqueue a job, failing with `QueueFull` if no slot frees up within
    /// `queue_timeout`.
    pub fn add(&self, callable: Callable, args: Args) -> PoolResult<()> {
        self.add_job(Job::new(callable, args))
    }

    /// Enqueue a prebuilt job.
    pub fn add_job(&self, job: Job) -> PoolResult<()> {
        if self.state == PoolState::Finished {
            return Err(PoolError::AlreadyFinished);
        }
        match self.input.put(job, self.config.queue_timeout()) {
            Ok(()) => Ok(()),
            Err(QueueError::Full(_)) => Err(PoolError::QueueFull {
                capacity: self.input.capacity(),
            }),
            Err(_) => Err(PoolError::QueueClosed),
        }
    }

    /// Spawn the workers, and the source consumer if a source is set.
    ///
    /// Returns immediately; call [`wait`](Self::wait) to block until the
    /// pool is drained.
    pub fn run(&mut self) -> PoolResult<()> {
        self.ensure_created()?;
        self.start();

        let pending_source = std::mem::take(&mut self.source);
        let shared = Arc::new(Shared {
            name: self.config.name().to_string(),
            input: Arc::clone(&self.input),
            output: self.output.clone(),
            observer: Arc::clone(&self.observer),
            queue_timeout: self.config.queue_timeout(),
            retry: self.config.retry(),
            fed_by_source: !pending_source.is_none(),
            live_workers: Arc::clone(&self.live_workers),
        });

        if let Err(e) = self.build_pool(&shared) {
            self.state = PoolState::Finished;
            return Err(e);
        }

        if !pending_source.is_none() {
            let consumer_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-source", shared.name))
                .spawn(move || source::consume(pending_source, consumer_shared));

            match spawned {
                Ok(handle) => self.consumer = Some(handle),
                Err(e) => {
                    // Let the workers drain what is there and stop.
                    self.input.close();
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        Ok(())
    }

    /// Block until every accepted job has completed, then finalize.
    ///
    /// Job failures are reported to the observer as they happen and are
    /// not returned here.
    pub fn wait(&mut self) -> PoolResult<()> {
        match self.state {
            PoolState::Created => return Err(PoolError::NotStarted),
            PoolState::Finished => return Err(PoolError::AlreadyFinished),
            PoolState::Running => {}
        }

        if let Some(consumer) = self.consumer.take() {
            match consumer.join() {
                Ok((fed, result)) => {
                    self.fed = fed;
                    self.source_error = result.err();
                }
                Err(_) => {
                    self.source_error =
                        Some(PoolError::WorkerPanic("source consumer panicked".to_string()));
                }
            }
            // A panicking consumer never closed the queue.
            self.input.close();
        }

        // Jobs added after every worker went idle would never complete.
        while !self.input.join_timeout(self.config.queue_timeout()) {
            if self.live_workers.load(Ordering::Acquire) == 0 {
                tracing::warn!(
                    pool = %self.config.name(),
                    abandoned = self.input.len(),
                    "no workers left, queued jobs dropped"
                );
                break;
            }
        }
        // Drained: idle workers stop now instead of at their next timeout.
        self.input.close();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!(pool = %self.config.name(), "worker thread panicked");
            }
        }

        self.finish();
        Ok(())
    }

    /// Live workers plus queued jobs. For monitoring only.
    pub fn jobs_count(&self) -> usize {
        self.live_workers.load(Ordering::Acquire) + self.input.len()
    }

    /// Number of worker threads still running.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The input queue, e.g. to inspect depth and in-flight count.
    pub fn queue(&self) -> &JobQueue {
        &self.input
    }

    /// Jobs the source consumer fed, including before a source error;
    /// known after `wait`.
    pub fn fed_count(&self) -> usize {
        self.fed
    }

    /// Why the source consumer stopped early, if it did.
    pub fn source_error(&self) -> Option<&PoolError> {
        self.source_error.as_ref()
    }

    pub fn start_time(&self) -> Option<SystemTime> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<SystemTime> {
        self.end_time
    }

    /// Time between `run` and the end of `wait`.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    fn ensure_created(&self) -> PoolResult<()> {
        match self.state {
            PoolState::Created => Ok(()),
            PoolState::Running => Err(PoolError::AlreadyStarted),
            PoolState::Finished => Err(PoolError::AlreadyFinished),
        }
    }

    /// Called before any thread is spawned.
    fn start(&mut self) {
        self.start_time = Some(SystemTime::now());
        self.started_at = Some(Instant::now());
        self.state = PoolState::Running;
    }

    /// Called when `wait` completes.
    fn finish(&mut self) {
        self.end_time = Some(SystemTime::now());
        let elapsed = self
            .started_at
            .map(|started| started.elapsed())
            .unwrap_or_default();
        self.elapsed = Some(elapsed);
        self.state = PoolState::Finished;

        self.observer.observe(&PoolEvent::Finished {
            pool: self.config.name(),
            elapsed,
        });
    }

    /// Spawn `pool_size` workers. Fails only if none could be started.
    fn build_pool(&mut self, shared: &Arc<Shared>) -> PoolResult<()> {
        let size = self.config.pool_size();
        self.workers.reserve(size);

        for id in 0..size {
            let worker_shared = Arc::clone(shared);
            self.live_workers.fetch_add(1, Ordering::AcqRel);

            let spawned = thread::Builder::new()
                .name(format!("{}-{}", shared.name, id))
                .spawn(move || worker::worker_loop(id, worker_shared));

            match spawned {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    self.live_workers.fetch_sub(1, Ordering::AcqRel);
                    if self.workers.is_empty() {
                        return Err(PoolError::Spawn(e));
                    }
                    tracing::warn!(
                        pool = %shared.name,
                        spawned = self.workers.len(),
                        requested = size,
                        error = %e,
                        "running with fewer workers"
                    );
                    break;
                }
            }
        }

        self.observer.observe(&PoolEvent::Started {
            pool: &shared.name,
            workers: self.workers.len(),
        });
        Ok(())
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.config.name())
            .field("size", &self.config.pool_size())
            .field("state", &self.state)
            .field("queue", &self.input)
            .field("forwarding", &self.output.is_some())
            .finish()
    }
}
