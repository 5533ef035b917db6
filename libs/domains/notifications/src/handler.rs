//! Message handler: dead-letter threshold, decode, route, render, deliver.

use crate::config::RoutingTable;
use crate::delivery::{DeliveryError, DeliveryExecutor};
use crate::escalation::DeadLetterEscalator;
use crate::event::Event;
use crate::metrics::RelayMetrics;
use crate::template::render;
use async_trait::async_trait;
use messaging::{Disposition, HandlerError, MessageHandler, QueueMessage};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How a single message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered to the external API
    Delivered,
    /// Redelivery threshold reached, dead-lettered
    DeadLettered,
    /// Rejected by the API with a terminal status, dead-lettered
    RejectedDeadLettered,
    /// Dead-letter publish failed
    EscalationFailed,
    /// Body is not an event, dropped
    Undecodable,
    /// No routing rule for the event type, dropped
    Unrouted,
    /// Retryable delivery failure (or shutdown)
    DeliveryFailed,
}

impl Outcome {
    pub fn disposition(&self) -> Disposition {
        match self {
            Outcome::EscalationFailed | Outcome::DeliveryFailed => Disposition::RetryLater,
            _ => Disposition::Acknowledge,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Delivered => "delivered",
            Outcome::DeadLettered => "dead_lettered",
            Outcome::RejectedDeadLettered => "rejected_dead_lettered",
            Outcome::EscalationFailed => "escalation_failed",
            Outcome::Undecodable => "undecodable",
            Outcome::Unrouted => "unrouted",
            Outcome::DeliveryFailed => "delivery_failed",
        }
    }
}

/// Relays queue messages to the HTTP endpoints named by their routing rule.
///
/// Stateless across messages; the broker's redelivery count is the only
/// retry state.
pub struct NotificationHandler {
    routes: Arc<RoutingTable>,
    max_retries: u32,
    executor: DeliveryExecutor,
    escalator: DeadLetterEscalator,
    metrics: RelayMetrics,
}

impl NotificationHandler {
    pub fn new(
        routes: Arc<RoutingTable>,
        max_retries: u32,
        executor: DeliveryExecutor,
        escalator: DeadLetterEscalator,
    ) -> Self {
        Self {
            routes,
            max_retries,
            executor,
            escalator,
            metrics: RelayMetrics::new(),
        }
    }

    /// Handle one message and record the outcome.
    #[instrument(
        skip_all,
        fields(
            topic = %message.topic,
            message_id = %message.id,
            redelivery_count = message.redelivery_count
        )
    )]
    pub async fn handle_message(&self, message: &QueueMessage) -> Outcome {
        let outcome = self.process(message).await;
        self.metrics.message_handled(&message.topic, outcome.as_str());
        debug!(outcome = outcome.as_str(), "Message handled");
        outcome
    }

    async fn process(&self, message: &QueueMessage) -> Outcome {
        if message.redelivery_count >= self.max_retries {
            warn!(max_retries = self.max_retries, "Redelivery threshold reached");
            return self.escalate(message, Outcome::DeadLettered).await;
        }

        let event = match Event::decode(&message.body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Dropping message that is not a valid event");
                return Outcome::Undecodable;
            }
        };

        let Some(rule) = self.routes.get(&event.event_type) else {
            warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Dropping event with no routing rule"
            );
            return Outcome::Unrouted;
        };

        let body = rule.body.as_ref().map(|template| render(template, &event.data));

        match self.executor.deliver(rule, body.as_ref(), &event).await {
            Ok(_) => Outcome::Delivered,
            Err(e) if e.is_terminal() => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Endpoint rejected event"
                );
                self.escalate(message, Outcome::RejectedDeadLettered).await
            }
            Err(DeliveryError::Cancelled) => {
                info!(event_id = %event.id, "Delivery cancelled by shutdown");
                Outcome::DeliveryFailed
            }
            Err(e) => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Delivery failed, requesting redelivery"
                );
                Outcome::DeliveryFailed
            }
        }
    }

    async fn escalate(&self, message: &QueueMessage, on_success: Outcome) -> Outcome {
        match self.escalator.escalate(message).await {
            Ok(topic) => {
                self.metrics.dead_lettered(&message.topic);
                info!(dead_letter_topic = %topic, "Message dead-lettered");
                on_success
            }
            Err(_) => Outcome::EscalationFailed,
        }
    }
}

#[async_trait]
impl MessageHandler for NotificationHandler {
    /// Messages are handled in order; the first `RetryLater` ends the batch,
    /// since the whole batch will be redelivered.
    async fn handle(&self, batch: &[QueueMessage]) -> Result<Disposition, HandlerError> {
        let mut disposition = Disposition::Acknowledge;
        for message in batch {
            disposition = disposition.combine(self.handle_message(message).await.disposition());
            if !disposition.is_acknowledge() {
                break;
            }
        }
        Ok(disposition)
    }

    fn name(&self) -> &'static str {
        "notification_handler"
    }
}
