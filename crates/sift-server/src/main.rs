#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use server::config::{CliArgs, Endpoint, ServerConfig};
use server::reporter::report_counters;
use server::telemetry::init_telemetry;
use sift_ingest::{
    Classifier, Counters, Error, IngestionLoop, JsonLinesStore, LineSource, SourceError,
    sift_pool::WorkerPool,
};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

type Input = Box<dyn AsyncRead + Unpin + Send>;
type Output = Box<dyn AsyncWrite + Unpin + Send>;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build Tokio runtime")?;

    let counters = Arc::new(Counters::new());
    let res = runtime.block_on(async {
        let providers = init_telemetry(&counters)?;
        log_startup_info(&config);
        let res = run_pipeline(config, Arc::clone(&counters)).await;
        providers.shutdown();
        res
    });

    // A stdin read parked on the blocking pool cannot be interrupted, so do
    // not wait for it.
    runtime.shutdown_background();
    res
}

async fn run_pipeline(config: ServerConfig, counters: Arc<Counters>) -> anyhow::Result<()> {
    let source = open_input(&config.input)
        .await?
        .with_max_line_len(config.max_line_bytes);
    let store = Arc::new(open_output(&config.output).await?);
    let pool = WorkerPool::with_config(config.pool)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let reporter = config.report_interval.map(|period| {
        tokio::spawn(report_counters(
            Arc::clone(&counters),
            period,
            shutdown.clone(),
        ))
    });

    let mut ingest = IngestionLoop::new(Classifier::new(config.threshold), counters, store);
    let res = ingest.run(source, pool, shutdown.clone()).await;

    // Stops the reporter when ingestion ended on its own.
    shutdown.cancel();
    if let Some(reporter) = reporter {
        if let Err(e) = reporter.await {
            tracing::error!("Counter reporter terminated abnormally: {e}");
        }
    }

    match res {
        Ok(report) => {
            tracing::info!(
                "Service shut down successfully after {} messages",
                report.submitted
            );
            Ok(())
        }
        // A finite input running out is the normal way a file run ends.
        Err(Error::Source(SourceError::EndOfStream)) => {
            tracing::info!("Input exhausted, all messages processed");
            Ok(())
        }
        Err(e) => Err(e).context("ingestion failed"),
    }
}

async fn open_input(endpoint: &Endpoint) -> anyhow::Result<LineSource<BufReader<Input>>> {
    let reader: Input = match endpoint {
        Endpoint::Stdio => Box::new(tokio::io::stdin()),
        Endpoint::File(path) => Box::new(
            File::open(path)
                .await
                .with_context(|| format!("failed to open input {}", path.display()))?,
        ),
    };
    Ok(LineSource::new(BufReader::new(reader)))
}

async fn open_output(endpoint: &Endpoint) -> anyhow::Result<JsonLinesStore<Output>> {
    let writer: Output = match endpoint {
        Endpoint::Stdio => Box::new(tokio::io::stdout()),
        Endpoint::File(path) => Box::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("failed to open output {}", path.display()))?,
        ),
    };
    Ok(JsonLinesStore::new(writer))
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting sift with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting sift with {} workers, threshold {}",
            config.pool.capacity,
            config.threshold
        );
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
        () = shutdown.cancelled() => return,
    }

    tracing::info!("Shutdown signal received, draining in-flight messages...");
    shutdown.cancel();
}
