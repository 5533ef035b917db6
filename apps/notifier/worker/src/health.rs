//! Health and metrics endpoints for K8s probes.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use core_config::server::ServerConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::info;

/// Health status of the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub consumer_running: bool,
}

/// Shared health state, updated by the worker lifecycle.
#[derive(Clone, Default)]
pub struct HealthState {
    inner: Arc<RwLock<HealthStateInner>>,
}

#[derive(Default)]
struct HealthStateInner {
    consumer_running: bool,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the queue consumer as started or stopped.
    pub async fn set_consumer_running(&self, running: bool) {
        self.inner.write().await.consumer_running = running;
    }

    /// Readiness: consuming.
    pub async fn is_ready(&self) -> bool {
        self.inner.read().await.consumer_running
    }

    pub async fn status(&self) -> HealthStatus {
        let consumer_running = self.inner.read().await.consumer_running;
        let status = if consumer_running { "healthy" } else { "starting" };
        HealthStatus {
            status: status.to_string(),
            consumer_running,
        }
    }
}

/// Health server for K8s probes and Prometheus scraping.
pub struct HealthServer {
    server: ServerConfig,
    state: HealthState,
    metrics_handle: Option<PrometheusHandle>,
}

impl HealthServer {
    pub fn new(server: ServerConfig) -> Self {
        Self {
            server,
            state: HealthState::new(),
            metrics_handle: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Get the health state for updates.
    pub fn state(&self) -> HealthState {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/readyz", get(ready_handler))
            .with_state(self.state.clone());

        if let Some(handle) = self.metrics_handle.clone() {
            router = router.route(
                "/metrics",
                get(move || {
                    let handle = handle.clone();
                    async move { handle.render() }
                }),
            );
        }

        router
    }

    /// Serve until `shutdown` turns `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), std::io::Error> {
        let router = self.router();
        let addr = self.server.address();

        info!(addr = %addr, "Starting health server");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await?;

        Ok(())
    }
}

/// Liveness probe: answers while the process serves, so a broker hiccup
/// does not restart the pod.
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.status().await))
}

async fn ready_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let code = if state.is_ready().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(state.status().await))
}
