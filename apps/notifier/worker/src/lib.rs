//! Notifier Worker
//!
//! Consumes event messages from NATS JetStream and relays each one to the
//! HTTP endpoint named by its routing rule.
//!
//! ## Architecture
//!
//! ```text
//! NATS JetStream (<stream>, one subject per queue_name)
//!   ↓ (durable pull consumer per topic)
//! NatsQueueClient
//!   ↓
//! NotificationHandler ── threshold / terminal 4xx ──▶ DLQ_<topic> (<stream>_DLQ)
//!   ↓ (render body, 3 attempts)
//! External HTTP API
//! ```
//!
//! ## Features
//!
//! - Broker-owned redelivery count as the only retry state
//! - Graceful shutdown that cancels in-flight delivery ladders
//! - Health check endpoints for Kubernetes probes
//! - Prometheus metrics

pub mod config;
pub mod health;

pub use config::{nats_config, WorkerSettings};
pub use health::{HealthServer, HealthState, HealthStatus};

use core_config::{Environment, FromEnv};
use domain_notifications::{
    DeadLetterEscalator, DeliveryExecutor, NotificationHandler, RelayConfig,
};
use eyre::{Result, WrapErr};
use messaging::nats::NatsQueueClient;
use messaging::QueueClient;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Run the notifier worker
///
/// 1. Sets up error reports, structured logging and the Prometheus recorder
/// 2. Loads and validates the relay configuration
/// 3. Connects the consumer and the dead-letter publisher to NATS
/// 4. Subscribes the handler to every configured topic and starts consuming
/// 5. Waits for SIGINT/SIGTERM and drains in-flight messages
///
/// # Errors
///
/// Returns an error if the settings or relay configuration are invalid, or
/// if NATS is unreachable at startup.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    let metrics_handle = init_metrics()?;
    domain_notifications::metrics::describe();

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        environment = ?environment,
        "Starting notifier worker"
    );

    let settings = WorkerSettings::from_env().wrap_err("Invalid worker settings")?;

    let relay = RelayConfig::load(&settings.config_path).wrap_err_with(|| {
        format!(
            "Failed to load relay config from {}",
            settings.config_path.display()
        )
    })?;
    let routes = Arc::new(relay.routing_table());
    info!(
        rules = routes.len(),
        topics = ?routes.topics(),
        max_retries = relay.max_retries(),
        "Relay configuration loaded"
    );

    let http_client = DeliveryExecutor::build_client(settings.http_timeout)
        .wrap_err("Failed to build HTTP client")?;

    let nats = nats_config(&relay.mq, settings.nats_url.as_deref());
    info!(url = %nats.url, stream = %nats.stream_name, "Connecting to NATS...");
    let consumer = NatsQueueClient::connect(nats.clone())
        .await
        .wrap_err_with(|| format!("Failed to connect consumer to NATS at {}", nats.url))?;
    let dead_letters = NatsQueueClient::connect(nats.clone())
        .await
        .wrap_err_with(|| format!("Failed to connect DLQ publisher to NATS at {}", nats.url))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handler = Arc::new(NotificationHandler::new(
        routes.clone(),
        relay.max_retries(),
        DeliveryExecutor::new(http_client).with_shutdown(shutdown_rx.clone()),
        DeadLetterEscalator::new(Arc::new(dead_letters)),
    ));

    for topic in routes.topics() {
        consumer
            .subscribe(topic, handler.clone())
            .await
            .wrap_err_with(|| format!("Failed to subscribe to {}", topic))?;
    }
    consumer.start().await.wrap_err("Failed to start consumer")?;

    let health_server = HealthServer::new(settings.health.clone()).with_metrics(metrics_handle);
    let health = health_server.state();
    health.set_consumer_running(true).await;

    let health_shutdown = shutdown_rx.clone();
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run(health_shutdown).await {
            error!(error = %e, "Health server failed");
        }
    });

    info!("Notifier worker running");
    shutdown_signal().await;

    health.set_consumer_running(false).await;
    let _ = shutdown_tx.send(true);

    if let Err(e) = consumer.shutdown().await {
        warn!(error = %e, "Consumer did not shut down cleanly");
    }
    if let Err(e) = health_task.await {
        warn!(error = %e, "Health server task failed");
    }

    info!("Notifier worker stopped");
    Ok(())
}

/// Install the global Prometheus recorder.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("Failed to install Prometheus recorder")
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }
}
