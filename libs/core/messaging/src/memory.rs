//! In-memory queue backend.
//!
//! Implements [`Publisher`] and [`QueueClient`] without a broker. Every
//! publish is recorded per topic and queued for delivery; redelivery is
//! simulated by [`InMemoryQueue::run_until_idle`], which increments the
//! redelivery count each time a handler answers `RetryLater`.

use crate::client::{Publisher, QueueClient};
use crate::error::QueueError;
use crate::handler::{dispatch, MessageHandler};
use crate::message::{Disposition, QueueMessage};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

#[derive(Default)]
struct State {
    published: HashMap<String, Vec<QueueMessage>>,
    pending: HashMap<String, VecDeque<QueueMessage>>,
}

/// Broker-less queue for tests and local runs.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<State>,
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    fail_publishes: AtomicBool,
    started: AtomicBool,
    next_id: AtomicU64,
}

/// Summary of a [`InMemoryQueue::run_until_idle`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Deliveries answered with `Acknowledge`
    pub acknowledged: usize,
    /// Deliveries answered with `RetryLater`
    pub retried: usize,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail (simulates an unavailable broker).
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Every message published to `topic`, in publish order.
    pub fn published(&self, topic: &str) -> Vec<QueueMessage> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.published.get(topic).cloned().unwrap_or_default()
    }

    /// Number of messages waiting for delivery on `topic`.
    pub fn pending(&self, topic: &str) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending.get(topic).map_or(0, VecDeque::len)
    }

    /// Queue a message for delivery as-is (keeps its id and redelivery count).
    pub fn enqueue(&self, message: QueueMessage) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .pending
            .entry(message.topic.clone())
            .or_default()
            .push_back(message);
    }

    /// Hand `batch` to the handler subscribed to `topic`.
    pub async fn deliver(
        &self,
        topic: &str,
        batch: &[QueueMessage],
    ) -> Result<Disposition, QueueError> {
        let handler = self.handler_for(topic)?;
        Ok(dispatch(handler.as_ref(), batch).await)
    }

    /// Deliver pending messages on `topic` one at a time until none are left
    /// or `max_deliveries` deliveries have been made.
    ///
    /// A `RetryLater` answer puts the message back at the end of the queue
    /// with its redelivery count incremented.
    pub async fn run_until_idle(
        &self,
        topic: &str,
        max_deliveries: usize,
    ) -> Result<DrainReport, QueueError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(QueueError::State("queue not started".to_string()));
        }

        let handler = self.handler_for(topic)?;
        let mut report = DrainReport::default();

        for _ in 0..max_deliveries {
            let Some(message) = self.pop(topic) else {
                break;
            };

            match dispatch(handler.as_ref(), std::slice::from_ref(&message)).await {
                Disposition::Acknowledge => report.acknowledged += 1,
                Disposition::RetryLater => {
                    report.retried += 1;
                    debug!(
                        topic = %topic,
                        message_id = %message.id,
                        redelivery_count = message.redelivery_count + 1,
                        "Redelivering message"
                    );
                    self.enqueue(message.redelivered());
                }
            }
        }

        Ok(report)
    }

    fn pop(&self, topic: &str) -> Option<QueueMessage> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.pending.get_mut(topic).and_then(VecDeque::pop_front)
    }

    fn handler_for(&self, topic: &str) -> Result<Arc<dyn MessageHandler>, QueueError> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers
            .get(topic)
            .cloned()
            .ok_or_else(|| QueueError::subscribe(topic, "no handler subscribed"))
    }
}

#[async_trait]
impl Publisher for InMemoryQueue {
    async fn publish(
        &self,
        topic: &str,
        body: &[u8],
        properties: &HashMap<String, String>,
    ) -> Result<(), QueueError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(QueueError::publish(topic, "broker unavailable"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let message = QueueMessage {
            topic: topic.to_string(),
            id: id.to_string(),
            body: body.to_vec(),
            redelivery_count: 0,
            properties: properties.clone(),
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .published
            .entry(topic.to_string())
            .or_default()
            .push(message.clone());
        state
            .pending
            .entry(topic.to_string())
            .or_default()
            .push_back(message);

        Ok(())
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), QueueError> {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.insert(topic.to_string(), handler);
        Ok(())
    }

    async fn start(&self) -> Result<(), QueueError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), QueueError> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}
