//! Error types for queue clients and message handlers.

use thiserror::Error;

/// Error raised by a queue client (connect, subscribe, publish, ack).
#[derive(Debug, Error)]
pub enum QueueError {
    /// Broker connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Subscription could not be registered
    #[error("subscribe error on topic {topic}: {message}")]
    Subscribe { topic: String, message: String },

    /// Publish was rejected or not acknowledged
    #[error("publish error on topic {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Ack/nak could not be sent back to the broker
    #[error("acknowledgement error: {0}")]
    Acknowledge(String),

    /// Stream or consumer provisioning error
    #[error("stream error: {0}")]
    Stream(String),

    /// Client used in the wrong lifecycle state
    #[error("invalid state: {0}")]
    State(String),
}

impl QueueError {
    /// Create a publish error.
    pub fn publish(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a subscribe error.
    pub fn subscribe(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscribe {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a stream provisioning error from any displayable error.
    pub fn stream(error: impl std::fmt::Display) -> Self {
        Self::Stream(error.to_string())
    }

    /// Check if the broker was unreachable (retrying later may help).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QueueError::Connection(_) | QueueError::Publish { .. } | QueueError::Acknowledge(_)
        )
    }
}

/// Error returned by a message handler.
///
/// The queue client treats any handler error as `Disposition::RetryLater`
/// and logs it.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Handler-internal failure
    #[error("handler error: {0}")]
    Internal(String),

    /// Queue operation failed while handling
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl HandlerError {
    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
