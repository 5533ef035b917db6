//! Notifications Domain
//!
//! Relays business events from a message queue to external HTTP APIs, one
//! routing rule per event type.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Queue client   │  ← delivers QueueMessage batches
//! └────────┬────────┘
//!          │
//! ┌────────▼────────────┐  redelivery_count ≥ max_retries
//! │ NotificationHandler │ ─────────────────────────────────┐
//! └────────┬────────────┘                                  │
//!          │ decode → route → render                       │
//! ┌────────▼────────┐   terminal 4xx    ┌─────────────────▼───┐
//! │DeliveryExecutor │ ─────────────────▶│ DeadLetterEscalator │ → DLQ_<topic>
//! └────────┬────────┘                   └─────────────────────┘
//!          │ 3 attempts, 200ms / 400ms backoff
//!          ▼
//!   external HTTP API
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{
//!     DeadLetterEscalator, DeliveryExecutor, NotificationHandler, RelayConfig,
//! };
//!
//! let config = RelayConfig::load("config.json")?;
//! let handler = NotificationHandler::new(
//!     Arc::new(config.routing_table()),
//!     config.max_retries(),
//!     DeliveryExecutor::new(http_client).with_shutdown(shutdown_rx),
//!     DeadLetterEscalator::new(publisher),
//! );
//! queue.subscribe("user_events", Arc::new(handler)).await?;
//! ```

pub mod config;
pub mod delivery;
pub mod escalation;
pub mod event;
pub mod handler;
pub mod metrics;
pub mod template;

// Re-export commonly used types
pub use config::{
    HttpMethod, MqConfig, RelayConfig, RelayConfigError, RelayConfigFile, RoutingRule,
    RoutingTable, DEFAULT_MAX_RETRIES,
};
pub use delivery::{
    DeliveryError, DeliveryExecutor, DeliveryReceipt, RetryPolicy, Sleeper, TokioSleeper,
    DEFAULT_HTTP_TIMEOUT,
};
pub use escalation::{DeadLetterEscalator, EscalationError};
pub use event::Event;
pub use handler::{NotificationHandler, Outcome};
pub use metrics::RelayMetrics;
pub use template::render;
