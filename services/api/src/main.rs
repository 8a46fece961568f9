mod config;
mod publisher;
mod routes;
mod types;

use anyhow::{Context, Result};
use config::Config;
use publisher::{LogPublisher, Publisher, SqsPublisher};
use routes::{create_router, AppState};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        version = %config.service.version,
        "Starting Mailstream ingestion API"
    );

    // Select the publisher per configuration
    let publisher: Arc<dyn Publisher> = if config.queue.offline {
        info!("Using offline publisher, envelopes will be logged");
        Arc::new(LogPublisher)
    } else {
        Arc::new(
            SqsPublisher::new(&config.queue)
                .await
                .context("Failed to initialize SQS publisher")?,
        )
    };

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = AppState {
        publisher,
        config: Arc::new(config),
    };
    let router = create_router(state);

    info!(address = %addr, "Ingestion API listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    info!("Ingestion API stopped");

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
