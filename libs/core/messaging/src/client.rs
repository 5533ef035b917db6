//! Queue client interface.

use crate::error::QueueError;
use crate::handler::MessageHandler;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Synchronous (broker-acknowledged) send.
///
/// Implementations must be safe for concurrent use: one publisher is shared
/// by every in-flight handler invocation.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `body` with `properties` to `topic`, returning once the broker
    /// has accepted the message.
    async fn publish(
        &self,
        topic: &str,
        body: &[u8],
        properties: &HashMap<String, String>,
    ) -> Result<(), QueueError>;
}

/// Consumer side of a broker client.
///
/// Lifecycle: `subscribe` for every topic, then `start`, then `shutdown`.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Register `handler` for `topic`. Several topics may share one handler.
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), QueueError>;

    /// Begin delivering messages to the registered handlers.
    async fn start(&self) -> Result<(), QueueError>;

    /// Stop delivering and wait for in-flight handlers to finish.
    async fn shutdown(&self) -> Result<(), QueueError>;
}
