//! Outbound HTTP delivery with bounded local retry.
//!
//! One delivery is a ladder of at most [`RetryPolicy::max_attempts`] HTTP
//! attempts. The first fires immediately; attempt `i` (0-based) is preceded by
//! `backoff.delay(i)`, i.e. 200ms then 400ms with the default policy.
//!
//! | Outcome                      | Action                     |
//! |------------------------------|----------------------------|
//! | 2xx                          | success                    |
//! | 400, 401, 403, 404           | terminal, stop immediately |
//! | any other status             | retryable                  |
//! | transport error / timeout    | retryable                  |
//!
//! When attempts run out, the last error is returned.

use crate::config::RoutingRule;
use crate::event::Event;
use crate::metrics::RelayMetrics;
use messaging::BackoffStrategy;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default timeout for one HTTP attempt.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Response bodies kept in errors are cut to this many bytes.
const MAX_ERROR_BODY_BYTES: usize = 1024;

/// Errors from a delivery ladder.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Connection refused, DNS failure, timeout...
    #[error("transport error: {message}")]
    Transport { message: String, timeout: bool },

    /// Non-2xx response
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Shutdown was signalled before the ladder finished
    #[error("delivery cancelled by shutdown")]
    Cancelled,

    /// The request could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DeliveryError {
    /// A client error that redelivery cannot fix.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryError::Status { status, .. } if is_terminal_status(*status))
    }

    /// Whether another local attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Transport { .. } => true,
            DeliveryError::Status { status, .. } => !is_terminal_status(*status),
            DeliveryError::Cancelled | DeliveryError::InvalidRequest(_) => false,
        }
    }

    /// HTTP status, for status errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn from_transport(error: reqwest::Error) -> Self {
        DeliveryError::Transport {
            timeout: error.is_timeout(),
            message: error.to_string(),
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            DeliveryError::Cancelled => "cancelled",
            e if e.is_terminal() => "terminal",
            e if e.is_retryable() => "retryable",
            _ => "invalid",
        }
    }
}

/// Client errors that stop the ladder at once.
pub fn is_terminal_status(status: u16) -> bool {
    matches!(status, 400 | 401 | 403 | 404)
}

/// Local retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (at least 1)
    pub max_attempts: u32,
    /// Delay before attempt `i` is `backoff.delay(i)`
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                base: Duration::from_millis(100),
                max: Duration::from_secs(10),
            },
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Delay before the attempt with 0-based `index` (none before the first).
    pub fn delay_before(&self, index: u32) -> Option<Duration> {
        (index > 0).then(|| self.backoff.delay(index))
    }
}

/// Source of backoff sleeps, injectable so tests need not wait.
pub trait Sleeper: Send + Sync + fmt::Debug {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// A successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub status: u16,
    /// Attempts made, the successful one included
    pub attempts: u32,
}

/// Issues the HTTP request described by a routing rule.
///
/// Safe to share across concurrent handler invocations: the client is
/// pooled and no per-delivery state is kept.
#[derive(Clone)]
pub struct DeliveryExecutor {
    client: reqwest::Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    shutdown: Option<watch::Receiver<bool>>,
    metrics: RelayMetrics,
}

impl fmt::Debug for DeliveryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryExecutor")
            .field("policy", &self.policy)
            .field("sleeper", &self.sleeper)
            .field("cancellable", &self.shutdown.is_some())
            .finish()
    }
}

impl DeliveryExecutor {
    /// Create an executor with the default policy and real sleeps.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            shutdown: None,
            metrics: RelayMetrics::new(),
        }
    }

    /// Build an HTTP client with a per-request `timeout`.
    pub fn build_client(timeout: Duration) -> Result<reqwest::Client, DeliveryError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::InvalidRequest(e.to_string()))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Abort ladders when `shutdown` turns `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver `body` (already rendered) as described by `rule`.
    ///
    /// `body = None` sends no request body. The body is serialized once and
    /// sent with exactly the rule's headers.
    pub async fn deliver(
        &self,
        rule: &RoutingRule,
        body: Option<&Value>,
        event: &Event,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| DeliveryError::InvalidRequest(e.to_string()))?;

        let started = Instant::now();
        let result = self.run_ladder(rule, payload.as_deref(), event).await;
        self.metrics
            .delivery_duration(&event.event_type, started.elapsed());
        result
    }

    async fn run_ladder(
        &self,
        rule: &RoutingRule,
        payload: Option<&[u8]>,
        event: &Event,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let mut last_error = None;

        for index in 0..self.policy.max_attempts {
            let attempt = index + 1;

            if let Some(delay) = self.policy.delay_before(index) {
                debug!(
                    event_id = %event.id,
                    attempt = attempt,
                    delay_ms = millis(delay),
                    "Backing off before retry"
                );
                self.cancellable(self.sleeper.sleep(delay)).await?;
            }

            let result = match self.cancellable(self.send(rule, payload)).await {
                Ok(result) => result,
                Err(cancelled) => {
                    self.metrics
                        .delivery_attempt(&event.event_type, cancelled.metric_label());
                    return Err(cancelled);
                }
            };

            match result {
                Ok(status) => {
                    self.metrics.delivery_attempt(&event.event_type, "success");
                    info!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        status = status,
                        attempt = attempt,
                        "Event delivered"
                    );
                    return Ok(DeliveryReceipt {
                        status,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    self.metrics
                        .delivery_attempt(&event.event_type, e.metric_label());
                    warn!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        attempt = attempt,
                        status = e.status(),
                        error = %e,
                        "Delivery attempt failed"
                    );
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DeliveryError::InvalidRequest("no delivery attempts made".to_string())))
    }

    async fn send(
        &self,
        rule: &RoutingRule,
        payload: Option<&[u8]>,
    ) -> Result<u16, DeliveryError> {
        let mut request = self
            .client
            .request(rule.method.into(), rule.url.clone())
            .headers(rule.headers.clone());
        if let Some(payload) = payload {
            request = request.body(payload.to_vec());
        }

        let response = request.send().await.map_err(DeliveryError::from_transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(status.as_u16());
        }

        let body = match response.bytes().await {
            Ok(bytes) => {
                let end = bytes.len().min(MAX_ERROR_BODY_BYTES);
                String::from_utf8_lossy(&bytes[..end]).into_owned()
            }
            Err(e) => format!("<unreadable body: {e}>"),
        };

        Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Run `future` unless shutdown is (or becomes) signalled.
    async fn cancellable<F: Future>(&self, future: F) -> Result<F::Output, DeliveryError> {
        let Some(shutdown) = &self.shutdown else {
            return Ok(future.await);
        };

        let mut shutdown = shutdown.clone();
        if *shutdown.borrow() {
            return Err(DeliveryError::Cancelled);
        }

        tokio::select! {
            output = future => Ok(output),
            _ = shutdown_signalled(&mut shutdown) => Err(DeliveryError::Cancelled),
        }
    }
}

async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        // Sender gone without a shutdown: never cancel.
        std::future::pending::<()>().await;
    }
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
