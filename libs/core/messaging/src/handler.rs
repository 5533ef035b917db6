//! Message handler trait invoked by queue clients.

use crate::error::HandlerError;
use crate::message::{Disposition, QueueMessage};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::error;

/// Callback registered with a queue client for one or more topics.
///
/// A queue client may invoke the same handler concurrently for independent
/// batches, so implementations must not keep per-invocation state in `self`.
///
/// # Contract
///
/// - The whole batch resolves to a single [`Disposition`].
/// - `Err(HandlerError)` is treated as [`Disposition::RetryLater`].
///
/// # Example
///
/// ```rust,ignore
/// use messaging::{Disposition, HandlerError, MessageHandler, QueueMessage};
/// use async_trait::async_trait;
///
/// struct Printer;
///
/// #[async_trait]
/// impl MessageHandler for Printer {
///     async fn handle(&self, batch: &[QueueMessage]) -> Result<Disposition, HandlerError> {
///         for msg in batch {
///             println!("{}: {} bytes", msg.topic, msg.body.len());
///         }
///         Ok(Disposition::Acknowledge)
///     }
///
///     fn name(&self) -> &'static str {
///         "printer"
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a delivered batch.
    async fn handle(&self, batch: &[QueueMessage]) -> Result<Disposition, HandlerError>;

    /// Handler name, used for logging and metrics labels.
    fn name(&self) -> &'static str;
}

/// Invoke `handler` and fold its result into a disposition.
///
/// Used by every queue client so error handling is identical across backends.
pub async fn dispatch(handler: &dyn MessageHandler, batch: &[QueueMessage]) -> Disposition {
    match handler.handle(batch).await {
        Ok(disposition) => disposition,
        Err(e) => {
            error!(
                handler = handler.name(),
                batch_size = batch.len(),
                error = %e,
                "Handler failed, requesting redelivery"
            );
            Disposition::RetryLater
        }
    }
}

/// A handler that returns a fixed disposition and records what it saw.
#[derive(Debug)]
pub struct RecordingHandler {
    disposition: Disposition,
    seen: Mutex<Vec<QueueMessage>>,
}

impl RecordingHandler {
    pub fn acknowledging() -> Self {
        Self::returning(Disposition::Acknowledge)
    }

    pub fn returning(disposition: Disposition) -> Self {
        Self {
            disposition,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Messages handled so far, in delivery order.
    pub fn seen(&self) -> Vec<QueueMessage> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, batch: &[QueueMessage]) -> Result<Disposition, HandlerError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.extend_from_slice(batch);
        }
        Ok(self.disposition)
    }

    fn name(&self) -> &'static str {
        "recording_handler"
    }
}
