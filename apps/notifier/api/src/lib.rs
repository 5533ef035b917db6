//! Notifier API
//!
//! Accepts events over HTTP and publishes them to the queue named by their
//! routing rule, for the worker to relay.
//!
//! ```text
//! POST /events ─▶ decode ─▶ route by type ─▶ fill id/timestamp ─▶ publish(queue_name)
//! ```

pub mod config;
pub mod error;

pub use config::{ApiSettings, nats_config};
pub use error::IngestError;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use core_config::{Environment, FromEnv};
use domain_notifications::{Event, RelayConfig, RoutingTable};
use eyre::{Result, WrapErr};
use messaging::nats::NatsQueueClient;
use messaging::Publisher;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RoutingTable>,
    pub publisher: Arc<dyn Publisher>,
}

impl AppState {
    pub fn new(routes: Arc<RoutingTable>, publisher: Arc<dyn Publisher>) -> Self {
        Self { routes, publisher }
    }
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(ingest_event))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Validate an event, fill its defaults and publish it to its rule's queue.
#[instrument(skip_all)]
async fn ingest_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), IngestError> {
    let mut event = Event::decode(&body).map_err(|_| IngestError::InvalidBody)?;

    if event.event_type.is_empty() {
        return Err(IngestError::MissingType);
    }

    let rule = state
        .routes
        .get(&event.event_type)
        .ok_or_else(|| IngestError::UnknownType(event.event_type.clone()))?;

    event.fill_defaults();
    let payload = event.encode().map_err(IngestError::Encode)?;

    state
        .publisher
        .publish(&rule.queue_name, &payload, &HashMap::new())
        .await
        .map_err(IngestError::Publish)?;

    info!(
        event_id = %event.id,
        event_type = %event.event_type,
        topic = %rule.queue_name,
        "Event accepted"
    );
    Ok((StatusCode::ACCEPTED, "Event accepted"))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Run the ingestion API until SIGINT/SIGTERM.
///
/// # Errors
///
/// Returns an error if the settings or relay configuration are invalid, if
/// NATS is unreachable at startup or the listener cannot bind.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        environment = ?environment,
        "Starting notifier API"
    );

    let settings = ApiSettings::from_env().wrap_err("Invalid API settings")?;
    let relay = RelayConfig::load(&settings.config_path).wrap_err_with(|| {
        format!(
            "Failed to load relay config from {}",
            settings.config_path.display()
        )
    })?;
    let routes = Arc::new(relay.routing_table());

    let nats = nats_config(&relay.mq, settings.nats_url.as_deref());
    let publisher = NatsQueueClient::connect(nats.clone())
        .await
        .wrap_err_with(|| format!("Failed to connect to NATS at {}", nats.url))?;
    publisher
        .provision(routes.topics())
        .await
        .wrap_err("Failed to provision streams")?;

    let app = router(AppState::new(routes, Arc::new(publisher)));

    let listener = tokio::net::TcpListener::bind(settings.server.address())
        .await
        .wrap_err_with(|| format!("Failed to bind {}", settings.server.address()))?;
    info!("API server listening on {}", settings.server.address());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("Server error")?;

    info!("Notifier API stopped");
    Ok(())
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
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
