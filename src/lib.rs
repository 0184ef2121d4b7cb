//! chain_pool - bounded thread pools that can be chained into pipelines.
//!
//! A [`ThreadPool`] runs a fixed number of worker threads over a bounded job
//! queue. Jobs arrive by hand through [`ThreadPool::add`] or from a [`Source`]
//! drained on a background consumer thread. A pool can forward every job's
//! result into the queue of another pool, so several pools form a pipeline
//! in which a slow stage holds back the stages before it instead of letting
//! memory grow.
//!
//! # Features
//!
//! - **Bounded queues**: `put`/`get` with timeouts and `join` accounting
//! - **Backpressure**: full queues are retried, never dropped
//! - **Failure isolation**: a job that errors or panics never kills its worker
//! - **Declarative jobs**: JSON specs resolved against a callable [`Registry`]
//! - **Observability**: `tracing` events by default, Prometheus on demand
//!
//! # Example
//!
//! ```rust,ignore
//! use chain_pool::{Args, Callable, PoolConfig, ThreadPool};
//!
//! let mut pool = ThreadPool::new(PoolConfig::default().with_pool_size(4))?;
//! pool.run()?;
//! for n in 0..10 {
//!     pool.add(Callable::new(|args| { println!("{:?}", args.get(0)); Ok(None) }), Args::new().arg(n))?;
//! }
//! pool.wait()?;
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod logging;
pub mod observability;
pub mod pool;

// Re-exports for convenience
pub use config::{Config, PoolConfig, RetryPolicy};
pub use observability::{MetricsObserver, PoolEvent, PoolObserver, TracingObserver};
pub use pool::{
    Args, Callable, Job, JobError, JobQueue, JobResult, JobSpec, PoolError, PoolResult, PoolState,
    QueueError, Registry, Source, ThreadPool,
};
