mod config;
mod envelope;
mod health;
mod queue;
mod storage;
mod worker;

use anyhow::{Context, Result};
use config::Config;
use health::StatusWriter;
use queue::{NullQueue, Queue, SqsQueue};
use std::sync::Arc;
use storage::{LocalObjectStore, ObjectStore, S3ObjectStore, Uploader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use worker::ArchiveWorker;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Mailstream archive worker"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Select backends per configuration
    let store: Arc<dyn ObjectStore> = if config.storage.offline {
        info!(root = %config.storage.local_root, "Using local filesystem archive");
        Arc::new(LocalObjectStore::new(&config.storage.local_root))
    } else {
        Arc::new(
            S3ObjectStore::new(&config.storage)
                .await
                .context("Failed to initialize S3 object store")?,
        )
    };

    let queue: Arc<dyn Queue> = if config.queue.offline {
        info!("Using offline queue stub");
        Arc::new(NullQueue)
    } else {
        Arc::new(
            SqsQueue::new(&config.queue)
                .await
                .context("Failed to initialize SQS queue client")?,
        )
    };

    let uploader = Uploader::new(store, config.storage.prefix.clone());
    let status_writer = StatusWriter::new(&config.worker.health_dir);
    let worker = ArchiveWorker::new(queue, uploader, status_writer, config.worker.clone());

    // Run the worker until a termination signal arrives
    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    shutdown_signal().await;

    info!("Shutting down archive worker");
    shutdown.cancel();
    worker_handle
        .await
        .context("Worker task failed to shut down")?;

    info!("Archive worker stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
