//! Batchwork - Main Entry Point
//! Lines on stdin are queued, batch-handled by the worker pool, and republished
//! as JSON lines on stdout through the dispatcher.

mod config;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use batchwork_core::application::{shutdown_channel, Dispatcher, IngestAdapter, WorkerPool};
use batchwork_core::port::handler_fn;
use batchwork_infra_io::{JsonLinesSender, LineSource};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "batchwork")]
#[command(about = "Buffered batch processing between a message stream and its handlers", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (toml, yaml or json)
    #[arg(short, long, env = "BATCHWORK_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration (invalid values are fatal here, never later)
    let config = config::load(cli.config.as_deref())?;

    // 2. Initialize logging
    let _log_guard = telemetry::init_logging(&config.log)?;
    info!("Batchwork v{} starting...", VERSION);

    // 3. Outbound side: dispatcher over a JSON-lines stdout transport
    let sender = Arc::new(JsonLinesSender::stdout(config.dispatch.flush_interval()));
    let mut dispatcher = Dispatcher::new(&config.output_topic, config.dispatch.clone(), sender)?;
    let (dispatch_stop, dispatch_token) = shutdown_channel();
    dispatcher.run(dispatch_token)?;

    // 4. Worker pool; the handler republishes every payload
    let output = dispatcher.handle();
    let handler = Arc::new(handler_fn(move |payload| {
        // Drops are already reported by the dispatcher
        let _ = output.send(payload, None);
    }));
    let mut pool = WorkerPool::new(config.worker.clone(), handler)?;
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    pool.start(shutdown_rx.clone())?;

    // 5. Ingest: stdin lines into the task queue
    info!(topic = %config.source_topic, "Starting ingest from stdin...");
    let adapter = IngestAdapter::new(LineSource::stdin(&config.source_topic), pool.sink());
    let mut ingest_handle = tokio::spawn(adapter.run(shutdown_rx));

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for a signal or for the input to end
    let ingest_result = tokio::select! {
        signal = shutdown_signal() => {
            info!(signal = signal?, "Shutdown signal received. Draining...");
            shutdown_tx.shutdown();
            ingest_handle.await
        }
        result = &mut ingest_handle => {
            info!("Input exhausted. Draining...");
            shutdown_tx.shutdown();
            result
        }
    };
    match ingest_result {
        Ok(Ok(stats)) => info!(
            received = stats.received,
            committed = stats.committed,
            "Ingest finished"
        ),
        Ok(Err(e)) => error!(error = %e, "Ingest failed"),
        Err(e) => error!(error = %e, "Ingest task failed"),
    }

    // 7. Graceful shutdown: pool first so its output still reaches the dispatcher
    let report = pool.close().await;
    if report.residual > 0 {
        warn!(residual = report.residual, "Tasks left behind at shutdown");
    }
    let flushed = dispatcher.close().await?;
    drop(dispatch_stop);

    info!(
        processed = report.processed,
        flushed, "Shutdown complete."
    );
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}
