//! Prometheus metrics for pools.
//!
//! `MetricsObserver` is a [`PoolObserver`] that counts jobs, queue
//! backpressure and live workers per pool. Several pools can share one
//! observer; every metric is labelled with the pool name.

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

use super::observer::{PoolEvent, PoolObserver};

/// Prometheus registry with all pool metrics.
pub struct MetricsObserver {
    registry: Registry,

    /// Jobs finished by pool and status (success, error, dropped)
    pub jobs_total: CounterVec,

    /// Job execution time in seconds
    pub job_duration_seconds: HistogramVec,

    /// Failed `put` attempts against a full queue, by stage
    pub queue_full_total: CounterVec,

    /// Jobs fed into a pool by its source consumer
    pub source_jobs_total: CounterVec,

    /// Source consumers that aborted
    pub source_failures_total: CounterVec,

    /// Workers currently running
    pub workers_active: GaugeVec,
}

impl MetricsObserver {
    /// Create a new metrics registry with all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Job latency buckets (in seconds)
        let job_buckets = vec![
            0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
        ];

        let jobs_total = CounterVec::new(
            Opts::new("chain_pool_jobs_total", "Total jobs executed"),
            &["pool", "status"],
        )?;
        registry.register(Box::new(jobs_total.clone()))?;

        let job_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "chain_pool_job_duration_seconds",
                "Job execution duration in seconds",
            )
            .buckets(job_buckets),
            &["pool"],
        )?;
        registry.register(Box::new(job_duration_seconds.clone()))?;

        let queue_full_total = CounterVec::new(
            Opts::new(
                "chain_pool_queue_full_total",
                "Puts rejected by a full queue",
            ),
            &["pool", "stage"],
        )?;
        registry.register(Box::new(queue_full_total.clone()))?;

        let source_jobs_total = CounterVec::new(
            Opts::new(
                "chain_pool_source_jobs_total",
                "Jobs fed from a source",
            ),
            &["pool"],
        )?;
        registry.register(Box::new(source_jobs_total.clone()))?;

        let source_failures_total = CounterVec::new(
            Opts::new(
                "chain_pool_source_failures_total",
                "Source consumers that aborted",
            ),
            &["pool"],
        )?;
        registry.register(Box::new(source_failures_total.clone()))?;

        let workers_active = GaugeVec::new(
            Opts::new("chain_pool_workers_active", "Running worker threads"),
            &["pool"],
        )?;
        registry.register(Box::new(workers_active.clone()))?;

        Ok(Self {
            registry,
            jobs_total,
            job_duration_seconds,
            queue_full_total,
            source_jobs_total,
            source_failures_total,
            workers_active,
        })
    }

    /// Export metrics in Prometheus text format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Get the Prometheus registry (for custom metrics).
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl PoolObserver for MetricsObserver {
    fn observe(&self, event: &PoolEvent<'_>) {
        match *event {
            PoolEvent::Started { pool, workers } => {
                self.workers_active
                    .with_label_values(&[pool])
                    .add(workers as f64);
            }
            PoolEvent::JobCompleted { pool, duration, .. } => {
                self.jobs_total.with_label_values(&[pool, "success"]).inc();
                self.job_duration_seconds
                    .with_label_values(&[pool])
                    .observe(duration.as_secs_f64());
            }
            PoolEvent::JobFailed { pool, duration, .. } => {
                self.jobs_total.with_label_values(&[pool, "error"]).inc();
                self.job_duration_seconds
                    .with_label_values(&[pool])
                    .observe(duration.as_secs_f64());
            }
            PoolEvent::ForwardFailed { pool, .. } => {
                self.jobs_total.with_label_values(&[pool, "dropped"]).inc();
            }
            PoolEvent::QueueFull { pool, stage, .. } => {
                self.queue_full_total
                    .with_label_values(&[pool, stage.as_str()])
                    .inc();
            }
            PoolEvent::WorkerStopped { pool, .. } => {
                self.workers_active.with_label_values(&[pool]).dec();
            }
            PoolEvent::SourceExhausted { pool, fed } => {
                self.source_jobs_total
                    .with_label_values(&[pool])
                    .inc_by(fed as f64);
            }
            PoolEvent::SourceFailed { pool, fed, .. } => {
                self.source_jobs_total
                    .with_label_values(&[pool])
                    .inc_by(fed as f64);
                self.source_failures_total.with_label_values(&[pool]).inc();
            }
            PoolEvent::Finished { .. } => {}
        }
    }
}
