//! Declarative configuration loading from YAML, TOML, and environment variables.
//!
//! The mirror structs here deserialize with serde and are converted into the
//! programmatic [`ClientConfig`](crate::config::ClientConfig) through the
//! builder API, so file-based and programmatic configuration share one set of
//! validation rules.
//!
//! # Supported Formats
//!
//! - **YAML** (requires `config-file` feature): `ClientConfig::from_yaml("txstream.yaml")`
//! - **TOML** (requires `config-file` feature): `ClientConfig::from_toml("txstream.toml")`
//! - **Environment Variables** (always available): `ClientConfig::from_env()`
//!
//! # Example YAML
//!
//! ```yaml
//! batch:
//!   batch-window-micros: 1000
//!   sustained-batch-window-micros: 3000
//!   executor-count: 4
//!   max-batch-size: 500
//! collector-wait-timeout-ms: 1000
//! response-timeout-ms: 30000
//! connection-timeout-ms: 5000
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ClientConfig, ClientConfigBuilder, ConfigError};

/// Top-level file-based configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Request batching configuration.
    pub batch: Option<FileBatchConfig>,
    /// Time the response listener waits for a collector, in milliseconds.
    pub collector_wait_timeout_ms: Option<u64>,
    /// Timeout applied to `execute` calls, in milliseconds.
    pub response_timeout_ms: Option<u64>,
    /// TCP connection timeout in milliseconds.
    pub connection_timeout_ms: Option<u64>,
}

/// File-based batching configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileBatchConfig {
    /// Delay before the first flush, in microseconds.
    pub batch_window_micros: Option<u64>,
    /// Delay between flushes while busy, in microseconds.
    pub sustained_batch_window_micros: Option<u64>,
    /// Number of executors in the pool.
    pub executor_count: Option<usize>,
    /// Maximum number of requests written in one batch.
    pub max_batch_size: Option<usize>,
}

impl TryFrom<FileConfig> for ClientConfig {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let mut builder = ClientConfigBuilder::new();

        if let Some(batch) = file.batch {
            builder = builder.batch(|mut b| {
                if let Some(us) = batch.batch_window_micros {
                    b = b.batch_window(Duration::from_micros(us));
                }
                if let Some(us) = batch.sustained_batch_window_micros {
                    b = b.sustained_batch_window(Duration::from_micros(us));
                }
                if let Some(n) = batch.executor_count {
                    b = b.executor_count(n);
                }
                if let Some(n) = batch.max_batch_size {
                    b = b.max_batch_size(n);
                }
                b
            });
        }

        if let Some(ms) = file.collector_wait_timeout_ms {
            builder = builder.collector_wait_timeout(Duration::from_millis(ms));
        }

        if let Some(ms) = file.response_timeout_ms {
            builder = builder.response_timeout(Duration::from_millis(ms));
        }

        if let Some(ms) = file.connection_timeout_ms {
            builder = builder.connection_timeout(Duration::from_millis(ms));
        }

        builder.build()
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::new(format!("{name} must be a number, got {val:?}"))),
        Err(_) => Ok(None),
    }
}

impl ClientConfig {
    /// Loads configuration from a YAML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_yaml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::new(format!("failed to read YAML config file: {e}"))
        })?;
        let file_config: FileConfig = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::new(format!("failed to parse YAML config: {e}"))
        })?;
        file_config.try_into()
    }

    /// Loads configuration from a TOML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::new(format!("failed to read TOML config file: {e}"))
        })?;
        let file_config: FileConfig = toml_crate::from_str(&content).map_err(|e| {
            ConfigError::new(format!("failed to parse TOML config: {e}"))
        })?;
        file_config.try_into()
    }

    /// Loads configuration from environment variables.
    ///
    /// This method is always available (no feature flag required). Unset
    /// variables keep their defaults; unparsable values are rejected.
    ///
    /// # Supported Environment Variables
    ///
    /// | Variable | Maps to |
    /// |----------|---------|
    /// | `TXSTREAM_BATCH_WINDOW_MICROS` | `batch.batch_window` |
    /// | `TXSTREAM_SUSTAINED_BATCH_WINDOW_MICROS` | `batch.sustained_batch_window` |
    /// | `TXSTREAM_EXECUTOR_COUNT` | `batch.executor_count` |
    /// | `TXSTREAM_MAX_BATCH_SIZE` | `batch.max_batch_size` |
    /// | `TXSTREAM_COLLECTOR_WAIT_TIMEOUT_MS` | `collector_wait_timeout` |
    /// | `TXSTREAM_RESPONSE_TIMEOUT_MS` | `response_timeout` |
    /// | `TXSTREAM_CONNECTION_TIMEOUT_MS` | `connection_timeout` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut file_config = FileConfig::default();

        if let Some(us) = env_number("TXSTREAM_BATCH_WINDOW_MICROS")? {
            file_config.batch.get_or_insert_with(Default::default).batch_window_micros = Some(us);
        }

        if let Some(us) = env_number("TXSTREAM_SUSTAINED_BATCH_WINDOW_MICROS")? {
            file_config
                .batch
                .get_or_insert_with(Default::default)
                .sustained_batch_window_micros = Some(us);
        }

        if let Some(n) = env_number("TXSTREAM_EXECUTOR_COUNT")? {
            file_config.batch.get_or_insert_with(Default::default).executor_count = Some(n);
        }

        if let Some(n) = env_number("TXSTREAM_MAX_BATCH_SIZE")? {
            file_config.batch.get_or_insert_with(Default::default).max_batch_size = Some(n);
        }

        file_config.collector_wait_timeout_ms = env_number("TXSTREAM_COLLECTOR_WAIT_TIMEOUT_MS")?;
        file_config.response_timeout_ms = env_number("TXSTREAM_RESPONSE_TIMEOUT_MS")?;
        file_config.connection_timeout_ms = env_number("TXSTREAM_CONNECTION_TIMEOUT_MS")?;

        file_config.try_into()
    }
}

/// Loads a configuration file, auto-detecting the format by extension.
///
/// Supports `.yaml`, `.yml`, and `.toml` extensions.
/// Requires the `config-file` feature.
#[cfg(feature = "config-file")]
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => ClientConfig::from_yaml(path),
        Some("toml") => ClientConfig::from_toml(path),
        Some(ext) => Err(ConfigError::new(format!(
            "unsupported config file extension: .{ext} (expected .yaml, .yml, or .toml)"
        ))),
        None => Err(ConfigError::new(
            "config file has no extension; expected .yaml, .yml, or .toml",
        )),
    }
}
