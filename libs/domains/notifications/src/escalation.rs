//! Dead-letter escalation.

use messaging::{dead_letter_topic, Publisher, QueueError, QueueMessage};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("failed to publish to dead-letter topic {topic}: {source}")]
    Publish {
        topic: String,
        #[source]
        source: QueueError,
    },
}

/// Republishes exhausted messages, unmodified, to their dead-letter topic.
#[derive(Clone)]
pub struct DeadLetterEscalator {
    publisher: Arc<dyn Publisher>,
}

impl DeadLetterEscalator {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    /// Publish the original body and properties to `DLQ_<topic>`.
    ///
    /// Returns the dead-letter topic. On error the caller must not
    /// acknowledge the message.
    pub async fn escalate(&self, message: &QueueMessage) -> Result<String, EscalationError> {
        let topic = dead_letter_topic(&message.topic);

        warn!(
            topic = %message.topic,
            dead_letter_topic = %topic,
            message_id = %message.id,
            redelivery_count = message.redelivery_count,
            "Escalating message to dead-letter topic"
        );

        match self
            .publisher
            .publish(&topic, &message.body, &message.properties)
            .await
        {
            Ok(()) => Ok(topic),
            Err(source) => {
                error!(
                    dead_letter_topic = %topic,
                    message_id = %message.id,
                    error = %source,
                    "Dead-letter publish failed"
                );
                Err(EscalationError::Publish { topic, source })
            }
        }
    }
}
