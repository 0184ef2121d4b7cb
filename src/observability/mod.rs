//! Observability for pools.
//!
//! Workers, source consumers and the pool lifecycle report what happens as
//! [`PoolEvent`]s to the [`PoolObserver`] the pool was built with. Only
//! internal faults (broken queue accounting, dead threads) are logged
//! directly.
//!
//! - [`TracingObserver`] (default) emits structured `tracing` events
//! - [`MetricsObserver`] records Prometheus metrics
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chain_pool::observability::MetricsObserver;
//!
//! let metrics = Arc::new(MetricsObserver::new()?);
//! let pool = ThreadPool::new(config)?.with_observer(metrics.clone());
//! // ... run and wait ...
//! println!("{}", metrics.export()?);
//! ```

pub mod metrics;
mod observer;

pub use metrics::MetricsObserver;
pub use observer::{PoolEvent, PoolObserver, QueueStage, TracingObserver};
