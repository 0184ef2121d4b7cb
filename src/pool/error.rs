//! Worker pool error types.

use std::fmt;

use crate::config::ConfigError;

/// Errors that can occur during pool operations.
#[derive(Debug)]
pub enum PoolError {
    /// The input queue stayed full for the whole `queue_timeout`.
    QueueFull {
        /// Maximum queue capacity.
        capacity: usize,
    },

    /// The queue stayed empty for the whole `queue_timeout`.
    QueueEmpty,

    /// The queue was closed by its producers.
    QueueClosed,

    /// A source item could not be turned into a job.
    MalformedJob(String),

    /// The bounded retry against a full queue gave up.
    SourceStalled {
        /// Number of `put` attempts made for the same job.
        attempts: usize,
    },

    /// A job returned an error.
    Execution(String),

    /// A job panicked.
    WorkerPanic(String),

    /// `run` was called on a pool that is already running.
    AlreadyStarted,

    /// `wait` was called before `run`.
    NotStarted,

    /// The pool has already been waited on.
    AlreadyFinished,

    /// The OS refused to spawn a thread.
    Spawn(std::io::Error),

    /// The pool configuration is invalid.
    Config(ConfigError),
}

impl PoolError {
    /// Check if this is a queue full error.
    pub fn is_queue_full(&self) -> bool {
        matches!(self, PoolError::QueueFull { .. })
    }

    /// Check if this is a malformed job error.
    pub fn is_malformed(&self) -> bool {
        matches!(self, PoolError::MalformedJob(_))
    }

    /// Check if this error came from executing a job.
    pub fn is_job_failure(&self) -> bool {
        matches!(self, PoolError::Execution(_) | PoolError::WorkerPanic(_))
    }

    /// Get the error message for logging.
    pub fn message(&self) -> &str {
        match self {
            PoolError::QueueFull { .. } => "Queue full",
            PoolError::QueueEmpty => "Queue empty",
            PoolError::QueueClosed => "Queue closed",
            PoolError::MalformedJob(_) => "Malformed job",
            PoolError::SourceStalled { .. } => "Source stalled",
            PoolError::Execution(msg) => msg,
            PoolError::WorkerPanic(_) => "Worker panic",
            PoolError::AlreadyStarted => "Pool already started",
            PoolError::NotStarted => "Pool not started",
            PoolError::AlreadyFinished => "Pool already finished",
            PoolError::Spawn(_) => "Thread spawn failed",
            PoolError::Config(_) => "Invalid configuration",
        }
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::QueueFull { capacity } => {
                write!(f, "queue full: {} jobs pending", capacity)
            }
            PoolError::QueueEmpty => write!(f, "queue empty"),
            PoolError::QueueClosed => write!(f, "queue closed"),
            PoolError::MalformedJob(msg) => write!(f, "malformed job: {}", msg),
            PoolError::SourceStalled { attempts } => {
                write!(f, "queue still full after {} attempts", attempts)
            }
            PoolError::Execution(msg) => write!(f, "execution error: {}", msg),
            PoolError::WorkerPanic(msg) => write!(f, "job panicked: {}", msg),
            PoolError::AlreadyStarted => write!(f, "pool has already been started"),
            PoolError::NotStarted => write!(f, "pool has not been started"),
            PoolError::AlreadyFinished => write!(f, "pool has already finished"),
            PoolError::Spawn(e) => write!(f, "failed to spawn thread: {}", e),
            PoolError::Config(e) => write!(f, "invalid pool configuration: {}", e),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Spawn(e) => Some(e),
            PoolError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for PoolError {
    fn from(e: ConfigError) -> Self {
        PoolError::Config(e)
    }
}

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
