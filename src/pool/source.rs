//! Job sources and the consumer thread that drains them.
//!
//! A pool is fed either by hand through `add`, or by exactly one [`Source`]
//! drained on a background thread. The consumer never drops an item: when
//! the input queue is full it sleeps and retries the same job, so a slow pool
//! holds back the source instead of buffering it. When the source ends, or
//! the consumer gives up, the input queue is closed so the workers can stop
//! once it drains.

use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use serde_json::Value;

use super::error::{PoolError, PoolResult};
use super::job::{Job, JobSpec, Registry};
use super::queue::{JobQueue, QueueError};
use super::worker::put_with_retry;
use super::Shared;
use crate::observability::{PoolEvent, QueueStage};

type BoxIter<T> = Box<dyn Iterator<Item = T> + Send>;

/// Where a pool's jobs come from.
#[derive(Default)]
pub enum Source {
    /// Jobs are added by hand with `ThreadPool::add`.
    #[default]
    None,
    /// A lazy, possibly endless sequence of ready jobs.
    Jobs(BoxIter<Job>),
    /// Declarative job specs, resolved against a registry as they arrive.
    Specs {
        items: BoxIter<PoolResult<JobSpec>>,
        registry: Registry,
    },
    /// Results of another pool, as set up by `ThreadPool::forward`.
    Queue(Arc<JobQueue>),
}

impl Source {
    /// Feed ready-made jobs.
    pub fn jobs<I>(jobs: I) -> Self
    where
        I: IntoIterator<Item = Job>,
        I::IntoIter: Send + 'static,
    {
        Source::Jobs(Box::new(jobs.into_iter()))
    }

    /// Feed specs, resolved against `registry`.
    pub fn specs<I>(specs: I, registry: Registry) -> Self
    where
        I: IntoIterator<Item = JobSpec>,
        I::IntoIter: Send + 'static,
    {
        Source::Specs {
            items: Box::new(specs.into_iter().map(Ok)),
            registry,
        }
    }

    /// Feed JSON values in either spec form (object or triple).
    pub fn values<I>(values: I, registry: Registry) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        Source::Specs {
            items: Box::new(values.into_iter().map(JobSpec::try_from)),
            registry,
        }
    }

    /// Feed one JSON job spec per line. Blank lines are skipped.
    pub fn json_lines<R>(reader: R, registry: Registry) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let items = reader
            .lines()
            .enumerate()
            .filter(|(_, line)| !matches!(line, Ok(l) if l.trim().is_empty()))
            .map(|(n, line)| {
                let line = line.map_err(|e| {
                    PoolError::MalformedJob(format!("line {}: read failed: {}", n + 1, e))
                })?;
                JobSpec::from_json(&line).map_err(|e| match e {
                    PoolError::MalformedJob(msg) => {
                        PoolError::MalformedJob(format!("line {}: {}", n + 1, msg))
                    }
                    other => other,
                })
            });

        Source::Specs {
            items: Box::new(items),
            registry,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Source::None)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::None => f.write_str("Source::None"),
            Source::Jobs(_) => f.write_str("Source::Jobs(..)"),
            Source::Specs { registry, .. } => f
                .debug_struct("Source::Specs")
                .field("registry", registry)
                .finish_non_exhaustive(),
            Source::Queue(queue) => f.debug_tuple("Source::Queue").field(queue).finish(),
        }
    }
}

/// Consumer thread body: drain `source` into the pool's input queue.
///
/// Returns the number of jobs fed, along with the error that stopped the
/// consumer early, if any.
pub(crate) fn consume(source: Source, shared: Arc<Shared>) -> (usize, PoolResult<()>) {
    let mut fed = 0;
    let result = match source {
        Source::None => Ok(()),
        Source::Jobs(jobs) => feed(&shared, jobs.map(Ok), &mut fed),
        Source::Specs { items, registry } => {
            let jobs = items.map(move |item| item.and_then(|spec| registry.resolve(spec)));
            feed(&shared, jobs, &mut fed)
        }
        Source::Queue(upstream) => drain(&shared, &upstream, &mut fed),
    };

    // Nothing more will be put; workers exit once the queue drains.
    shared.input.close();

    match &result {
        Ok(()) => shared.observer.observe(&PoolEvent::SourceExhausted {
            pool: &shared.name,
            fed,
        }),
        Err(error) => shared.observer.observe(&PoolEvent::SourceFailed {
            pool: &shared.name,
            fed,
            error,
        }),
    }
    (fed, result)
}

/// Feed a sequence of jobs, stopping at the first malformed item.
fn feed<I>(shared: &Shared, jobs: I, fed: &mut usize) -> PoolResult<()>
where
    I: Iterator<Item = PoolResult<Job>>,
{
    for job in jobs {
        put_with_retry(shared, &shared.input, job?, QueueStage::Input)?;
        *fed += 1;
    }
    Ok(())
}

/// Move jobs from an upstream pool's output until it is closed and empty.
fn drain(shared: &Shared, upstream: &JobQueue, fed: &mut usize) -> PoolResult<()> {
    loop {
        let job = match upstream.get(shared.queue_timeout) {
            Ok(job) => job,
            // Upstream still running.
            Err(QueueError::Empty) => continue,
            Err(_) => return Ok(()),
        };

        let accepted = put_with_retry(shared, &shared.input, job, QueueStage::Input);
        if let Err(e) = upstream.mark_done() {
            tracing::error!(pool = %shared.name, error = %e, "upstream queue accounting broken");
        }
        if let Err(e) = accepted {
            // Nobody reads the link any more; release upstream workers
            // blocked on forwarding into it.
            upstream.close();
            return Err(e);
        }
        *fed += 1;
    }
}
