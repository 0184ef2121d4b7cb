//! Pool configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use super::parse::{env_duration, env_or, env_parse};
use super::ConfigError;

/// Worker threads per pool unless configured otherwise.
pub const DEFAULT_POOL_SIZE: usize = 30;

/// Jobs a queue holds before `put` starts blocking.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// How long `put`/`get` block before giving up.
pub const DEFAULT_QUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause between retries against a full queue.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// How producers retry a job that a full queue rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    /// Max `put` attempts per job; `None` retries forever.
    limit: Option<NonZeroUsize>,
}

impl RetryPolicy {
    /// Retry forever, sleeping `interval` between attempts.
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            limit: None,
        }
    }

    /// Give up after `limit` attempts (0 means unbounded).
    pub fn bounded(interval: Duration, limit: usize) -> Self {
        Self {
            interval,
            limit: NonZeroUsize::new(limit),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit.map(NonZeroUsize::get)
    }

    /// Whether `attempts` failed puts exhaust the policy.
    pub fn is_exhausted(&self, attempts: usize) -> bool {
        self.limit.is_some_and(|limit| attempts >= limit.get())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(DEFAULT_RETRY_INTERVAL)
    }
}

/// Configuration of a single pool.
///
/// Built with the `with_*` methods or loaded from the environment, then
/// checked by [`validate`](Self::validate) when a pool is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    name: String,
    pool_size: usize,
    queue_capacity: usize,
    queue_timeout: Duration,
    retry: RetryPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl PoolConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let pool_size = Self::parse_pool_size()?;
        let queue_capacity = env_parse("QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?;

        let queue_timeout = env_duration("QUEUE_TIMEOUT", "500ms")?.ok_or_else(|| {
            ConfigError::Invalid {
                key: "QUEUE_TIMEOUT".into(),
                message: "queue timeout cannot be zero".into(),
            }
        })?;

        let retry_interval = env_duration("SOURCE_RETRY_INTERVAL", "100ms")?.ok_or_else(|| {
            ConfigError::Invalid {
                key: "SOURCE_RETRY_INTERVAL".into(),
                message: "retry interval cannot be zero".into(),
            }
        })?;

        // "off" and "0" both mean retry forever
        let retry_limit = match env_or("SOURCE_RETRY_LIMIT", "0").trim() {
            "off" => 0,
            raw => raw.parse().map_err(|e| ConfigError::Parse {
                key: "SOURCE_RETRY_LIMIT".into(),
                value: raw.to_string(),
                error: format!("{e}"),
            })?,
        };

        let config = Self {
            name: env_or("POOL_NAME", "pool"),
            pool_size,
            queue_capacity,
            queue_timeout,
            retry: RetryPolicy::bounded(retry_interval, retry_limit),
        };
        config.validate()?;
        Ok(config)
    }

    fn parse_pool_size() -> Result<usize, ConfigError> {
        let workers: usize = env_parse("POOL_SIZE", DEFAULT_POOL_SIZE)?;

        // Resolve 0 to CPU count
        Ok(if workers == 0 { num_cpus::get() } else { workers })
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid {
                key: "POOL_NAME".into(),
                message: "pool name cannot be empty".into(),
            });
        }
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "POOL_SIZE".into(),
                message: "pool size cannot be zero".into(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "QUEUE_CAPACITY".into(),
                message: "queue capacity cannot be zero".into(),
            });
        }
        if self.queue_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "QUEUE_TIMEOUT".into(),
                message: "queue timeout cannot be zero".into(),
            });
        }
        if self.retry.interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "SOURCE_RETRY_INTERVAL".into(),
                message: "retry interval cannot be zero".into(),
            });
        }
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_queue_timeout(mut self, queue_timeout: Duration) -> Self {
        self.queue_timeout = queue_timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    #[inline]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    #[inline]
    pub fn queue_timeout(&self) -> Duration {
        self.queue_timeout
    }

    #[inline]
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }
}
