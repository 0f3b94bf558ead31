//! Logging setup
//!
//! Console output goes to stderr in pretty or JSON form; with a log directory
//! configured, records are also written to daily-rotated files through a
//! non-blocking appender.

use crate::config::{LogConfig, LogFormat};
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber
///
/// The returned guard must be held until exit, dropping it flushes the file writer.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Failed to create env filter")?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.log_in_console {
        layers.push(match config.format {
            LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
            LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
        });
    }

    let guard = match &config.directory {
        Some(directory) => {
            let directory = shellexpand::tilde(directory).into_owned();
            std::fs::create_dir_all(&directory)
                .with_context(|| format!("Failed to create log directory {}", directory))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(&config.file_prefix)
                .filename_suffix("log")
                .max_log_files(config.max_files)
                .build(&directory)
                .context("Failed to create rolling log file")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(match config.format {
                LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
                LogFormat::Pretty => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
            });
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
