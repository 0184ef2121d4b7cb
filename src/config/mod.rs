//! Configuration module for chain_pool.
//!
//! Every setting has a default, so pools can be built from
//! `PoolConfig::default()` alone; `from_env` overrides them from environment
//! variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use chain_pool::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Workers: {}", config.pool.pool_size());
//! ```

mod error;
mod logging;
mod parse;
mod pool;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use parse::parse_duration;
pub use pool::{
    PoolConfig, RetryPolicy, DEFAULT_POOL_SIZE, DEFAULT_QUEUE_CAPACITY, DEFAULT_QUEUE_TIMEOUT,
    DEFAULT_RETRY_INTERVAL,
};

/// Complete application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Pool configuration.
    pub pool: PoolConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            pool: PoolConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        info!("Configuration loaded:");
        info!("  Pool: {}", self.pool.name());
        info!("  Workers: {}", self.pool.pool_size());
        info!("  Queue capacity: {}", self.pool.queue_capacity());
        info!("  Queue timeout: {:?}", self.pool.queue_timeout());

        let retry = self.pool.retry();
        match retry.limit() {
            Some(limit) => info!(
                "  Source retry: every {:?}, up to {} attempts",
                retry.interval(),
                limit
            ),
            None => info!("  Source retry: every {:?}, unbounded", retry.interval()),
        }

        info!("  Log format: {:?}", self.logging.format);
    }
}

/// Serializes tests that mutate process environment variables.
#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    ENV_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
