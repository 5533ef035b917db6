//! Queue-client abstractions for message-driven services.
//!
//! This library provides backend-agnostic traits and types for consuming and
//! publishing messages:
//! - [`QueueMessage`] and [`Disposition`]: what a handler receives and returns
//! - [`MessageHandler`]: the callback a queue client invokes per batch
//! - [`Publisher`] / [`QueueClient`]: the narrow broker interface
//! - [`BackoffStrategy`]: delay calculation for retries and redelivery
//!
//! Backends:
//! - [`memory::InMemoryQueue`]: broker-less, for tests and local runs
//! - `nats::NatsQueueClient`: NATS JetStream (feature `nats`)
//!
//! # Example
//!
//! ```ignore
//! use messaging::{memory::InMemoryQueue, Publisher, QueueClient};
//!
//! let queue = InMemoryQueue::new();
//! queue.subscribe("user_events", handler).await?;
//! queue.start().await?;
//! queue.publish("user_events", br#"{"type":"user.created"}"#, &HashMap::new()).await?;
//! queue.run_until_idle("user_events", 10).await?;
//! ```

mod client;
mod config;
mod error;
mod handler;
mod message;

pub mod memory;

#[cfg(feature = "nats")]
pub mod nats;

pub use client::{Publisher, QueueClient};
pub use config::BackoffStrategy;
pub use error::{HandlerError, QueueError};
pub use handler::{dispatch, MessageHandler, RecordingHandler};
pub use message::{dead_letter_topic, Disposition, QueueMessage, DEAD_LETTER_PREFIX};
