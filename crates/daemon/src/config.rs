//! Daemon configuration
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - optional config file (`--config`, any format the `config` crate detects by extension)
//! - `BATCHWORK__`-prefixed environment variables, `__` separating nested keys
//!
//! ```text
//! BATCHWORK__WORKER__THREAD_COUNT=4 BATCHWORK__LOG__FORMAT=json ./batchwork
//! ```

use anyhow::{Context, Result};
use batchwork_core::domain::{DispatchConfig, WorkerPoolConfig};
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::Path;

const ENV_PREFIX: &str = "BATCHWORK";
const DEFAULT_SOURCE_TOPIC: &str = "stdin";
const DEFAULT_OUTPUT_TOPIC: &str = "processed";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_FILE_PREFIX: &str = "batchwork";
const DEFAULT_LOG_MAX_FILES: usize = 7;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub source_topic: String,
    pub output_topic: String,
    pub worker: WorkerPoolConfig,
    pub dispatch: DispatchConfig,
    pub log: LogConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            source_topic: DEFAULT_SOURCE_TOPIC.to_string(),
            output_topic: DEFAULT_OUTPUT_TOPIC.to_string(),
            worker: WorkerPoolConfig::default(),
            dispatch: DispatchConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging setup, handed explicitly to the subscriber at startup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set
    pub level: String,
    pub format: LogFormat,
    /// Daily-rotated log files are written here when set (`~` is expanded)
    pub directory: Option<String>,
    pub file_prefix: String,
    /// Rotated files kept on disk
    pub max_files: usize,
    /// Also log to stderr; stdout carries the output stream
    pub log_in_console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Pretty,
            directory: None,
            file_prefix: DEFAULT_LOG_FILE_PREFIX.to_string(),
            max_files: DEFAULT_LOG_MAX_FILES,
            log_in_console: true,
        }
    }
}

/// Load the layered configuration and reject unusable values up front
pub fn load(path: Option<&Path>) -> Result<DaemonConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    let builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );
    build(builder)
}

fn build(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<DaemonConfig> {
    let config: DaemonConfig = builder
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")?;
    config.worker.validate().context("Invalid worker config")?;
    config.dispatch.validate().context("Invalid dispatch config")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<DaemonConfig> {
        build(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = build(Config::builder()).unwrap();
        assert_eq!(config.source_topic, "stdin");
        assert_eq!(config.output_topic, "processed");
        assert_eq!(config.worker, WorkerPoolConfig::default());
        assert_eq!(config.dispatch, DispatchConfig::default());
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.log.max_files, 7);
    }

    #[test]
    fn test_file_overrides_nested_fields() {
        let config = from_toml(
            r#"
            output_topic = "enriched"

            [worker]
            thread_count = 4
            tick_interval_ms = 100

            [dispatch]
            queue_capacity = 10

            [log]
            format = "json"
            directory = "/var/log/batchwork"
            "#,
        )
        .unwrap();

        assert_eq!(config.output_topic, "enriched");
        assert_eq!(config.worker.thread_count, 4);
        assert_eq!(config.worker.tick_interval_ms, 100);
        assert_eq!(config.worker.batch_size, 1024);
        assert_eq!(config.dispatch.queue_capacity, 10);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.directory.as_deref(), Some("/var/log/batchwork"));
    }

    #[test]
    fn test_zero_threads_is_fatal() {
        let err = from_toml("[worker]\nthread_count = 0\n").unwrap_err();
        assert!(format!("{:#}", err).contains("thread_count"));
    }
}
