//! Client configuration types and builders.

use std::num::NonZeroUsize;
use std::time::Duration;

/// Default delay before the first flush of a batching period.
const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(1);
/// Default delay between flushes while requests keep arriving.
const DEFAULT_SUSTAINED_BATCH_WINDOW: Duration = Duration::from_millis(3);
/// Default maximum number of requests written in one batch.
const DEFAULT_MAX_BATCH_SIZE: usize = 1000;
/// Default time the response listener waits for a collector to be registered.
const DEFAULT_COLLECTOR_WAIT_TIMEOUT: Duration = Duration::from_secs(1);
/// Default connection timeout.
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns the number of executors used when none is configured.
pub fn default_executor_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the validation message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for txstream_core::TxStreamError {
    fn from(err: ConfigError) -> Self {
        txstream_core::TxStreamError::Configuration(err.message)
    }
}

/// Request batching configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    batch_window: Duration,
    sustained_batch_window: Duration,
    executor_count: usize,
    max_batch_size: usize,
}

impl BatchConfig {
    /// Returns the delay before the first flush after an executor wakes up.
    pub fn batch_window(&self) -> Duration {
        self.batch_window
    }

    /// Returns the delay between consecutive flushes of a busy executor.
    pub fn sustained_batch_window(&self) -> Duration {
        self.sustained_batch_window
    }

    /// Returns the number of executors in the pool.
    pub fn executor_count(&self) -> usize {
        self.executor_count
    }

    /// Returns the maximum number of requests written in one batch.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_window: DEFAULT_BATCH_WINDOW,
            sustained_batch_window: DEFAULT_SUSTAINED_BATCH_WINDOW,
            executor_count: default_executor_count(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl From<BatchConfig> for BatchConfigBuilder {
    fn from(config: BatchConfig) -> Self {
        Self {
            batch_window: Some(config.batch_window),
            sustained_batch_window: Some(config.sustained_batch_window),
            executor_count: Some(config.executor_count),
            max_batch_size: Some(config.max_batch_size),
        }
    }
}

/// Builder for `BatchConfig`.
#[derive(Debug, Clone, Default)]
pub struct BatchConfigBuilder {
    batch_window: Option<Duration>,
    sustained_batch_window: Option<Duration>,
    executor_count: Option<usize>,
    max_batch_size: Option<usize>,
}

impl BatchConfigBuilder {
    /// Creates a new batch configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delay before the first flush after an executor wakes up.
    pub fn batch_window(mut self, window: Duration) -> Self {
        self.batch_window = Some(window);
        self
    }

    /// Sets the delay between consecutive flushes of a busy executor.
    pub fn sustained_batch_window(mut self, window: Duration) -> Self {
        self.sustained_batch_window = Some(window);
        self
    }

    /// Sets the number of executors in the pool.
    pub fn executor_count(mut self, count: usize) -> Self {
        self.executor_count = Some(count);
        self
    }

    /// Sets the maximum number of requests written in one batch.
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size);
        self
    }

    /// Builds the batch configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `batch_window` is zero
    /// - `sustained_batch_window` is shorter than `batch_window`
    /// - `executor_count` or `max_batch_size` is zero
    pub fn build(self) -> Result<BatchConfig, ConfigError> {
        let batch_window = self.batch_window.unwrap_or(DEFAULT_BATCH_WINDOW);
        let sustained_batch_window = self
            .sustained_batch_window
            .unwrap_or_else(|| DEFAULT_SUSTAINED_BATCH_WINDOW.max(batch_window));
        let executor_count = self.executor_count.unwrap_or_else(default_executor_count);
        let max_batch_size = self.max_batch_size.unwrap_or(DEFAULT_MAX_BATCH_SIZE);

        if batch_window.is_zero() {
            return Err(ConfigError::new("batch_window must be greater than zero"));
        }

        if sustained_batch_window < batch_window {
            return Err(ConfigError::new(
                "sustained_batch_window must not be shorter than batch_window",
            ));
        }

        if executor_count == 0 {
            return Err(ConfigError::new("executor_count must be at least 1"));
        }

        if max_batch_size == 0 {
            return Err(ConfigError::new("max_batch_size must be at least 1"));
        }

        Ok(BatchConfig {
            batch_window,
            sustained_batch_window,
            executor_count,
            max_batch_size,
        })
    }
}

/// Configuration for a transaction stream client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    batch: BatchConfig,
    collector_wait_timeout: Duration,
    response_timeout: Option<Duration>,
    connection_timeout: Duration,
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the batching configuration.
    pub fn batch(&self) -> &BatchConfig {
        &self.batch
    }

    /// Returns how long the response listener waits for a collector before
    /// declaring a protocol violation.
    pub fn collector_wait_timeout(&self) -> Duration {
        self.collector_wait_timeout
    }

    /// Returns the timeout applied to `execute` calls, if any.
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout
    }

    /// Returns the TCP connection timeout.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            collector_wait_timeout: DEFAULT_COLLECTOR_WAIT_TIMEOUT,
            response_timeout: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    batch: BatchConfigBuilder,
    collector_wait_timeout: Option<Duration>,
    response_timeout: Option<Duration>,
    connection_timeout: Option<Duration>,
}

impl ClientConfigBuilder {
    /// Creates a new client configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures request batching using a closure.
    pub fn batch<F>(mut self, f: F) -> Self
    where
        F: FnOnce(BatchConfigBuilder) -> BatchConfigBuilder,
    {
        self.batch = f(self.batch);
        self
    }

    /// Sets the delay before the first flush after an executor wakes up.
    pub fn batch_window(mut self, window: Duration) -> Self {
        self.batch = self.batch.batch_window(window);
        self
    }

    /// Sets the number of executors in the pool.
    pub fn executor_count(mut self, count: usize) -> Self {
        self.batch = self.batch.executor_count(count);
        self
    }

    /// Sets how long the response listener waits for a collector.
    pub fn collector_wait_timeout(mut self, timeout: Duration) -> Self {
        self.collector_wait_timeout = Some(timeout);
        self
    }

    /// Sets the timeout applied to `execute` calls.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Sets the TCP connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Builds the client configuration, returning an error if validation fails.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let batch = self.batch.build()?;
        let collector_wait_timeout = self
            .collector_wait_timeout
            .unwrap_or(DEFAULT_COLLECTOR_WAIT_TIMEOUT);
        let connection_timeout = self.connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT);

        if collector_wait_timeout.is_zero() {
            return Err(ConfigError::new(
                "collector_wait_timeout must be greater than zero",
            ));
        }

        if self.response_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::new("response_timeout must be greater than zero"));
        }

        if connection_timeout.is_zero() {
            return Err(ConfigError::new("connection_timeout must be greater than zero"));
        }

        Ok(ClientConfig {
            batch,
            collector_wait_timeout,
            response_timeout: self.response_timeout,
            connection_timeout,
        })
    }
}
