//! NATS JetStream queue backend.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐     ┌─────────────────────┐     ┌────────────────┐
//! │   Publisher    │────▶│   NATS JetStream    │────▶│  Fetch loop    │
//! │ (publish+ack)  │     │  <stream> subjects  │     │  (per topic)   │
//! └────────────────┘     │   = topics          │     └────────────────┘
//!                        └─────────────────────┘             │
//!                        ┌─────────────────────┐             ▼
//!                        │  <stream>_DLQ       │     ┌────────────────┐
//!                        │  DLQ_<topic>        │     │ MessageHandler │
//!                        └─────────────────────┘     └────────────────┘
//! ```
//!
//! Each topic gets a durable pull consumer with unlimited deliveries.
//! `Acknowledge` acks the message; `RetryLater` naks it with the configured
//! redelivery backoff, so the broker's delivery count grows on every retry.
//!
//! # Example
//!
//! ```rust,ignore
//! use messaging::nats::{NatsConfig, NatsQueueClient};
//! use messaging::QueueClient;
//!
//! let client = NatsQueueClient::connect(NatsConfig::new("nats://localhost:4222")).await?;
//! client.subscribe("user_events", handler).await?;
//! client.start().await?;
//! // ...
//! client.shutdown().await?;
//! ```

mod client;
mod config;
mod consumer;

pub use client::NatsQueueClient;
pub use config::{NatsConfig, DEFAULT_STREAM_NAME};
