//! Messages delivered by a queue client and the verdict returned for them.

use std::collections::HashMap;
use std::fmt;

/// Prefix of every dead-letter topic.
pub const DEAD_LETTER_PREFIX: &str = "DLQ_";

/// Dead-letter topic for messages consumed from `topic`.
///
/// Shared by publishers of dead letters and by backends that provision
/// dead-letter storage, so both always agree on the subject.
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{DEAD_LETTER_PREFIX}{topic}")
}

/// A message handed to a handler by the queue client.
///
/// Owned by the broker: handlers only read it and return a [`Disposition`].
/// The same logical message may be delivered many times, with
/// `redelivery_count` increasing on each attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Topic the message was published to
    pub topic: String,
    /// Broker-assigned message id
    pub id: String,
    /// Raw payload bytes
    pub body: Vec<u8>,
    /// Number of previous deliveries of this message (0 on first delivery)
    pub redelivery_count: u32,
    /// Message metadata (trace/correlation identifiers, ...)
    pub properties: HashMap<String, String>,
}

impl QueueMessage {
    /// Create a first-delivery message with no properties.
    pub fn new(topic: impl Into<String>, id: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            id: id.into(),
            body: body.into(),
            redelivery_count: 0,
            properties: HashMap::new(),
        }
    }

    /// Set the redelivery count.
    pub fn with_redelivery_count(mut self, count: u32) -> Self {
        self.redelivery_count = count;
        self
    }

    /// Add a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Check if this is a redelivery.
    pub fn is_redelivery(&self) -> bool {
        self.redelivery_count > 0
    }

    /// Copy of this message as the broker would redeliver it.
    pub fn redelivered(&self) -> Self {
        Self {
            redelivery_count: self.redelivery_count.saturating_add(1),
            ..self.clone()
        }
    }
}

/// Verdict a handler returns for a delivered batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Done, do not redeliver
    Acknowledge,
    /// Redeliver according to broker policy
    RetryLater,
}

impl Disposition {
    /// Combine the verdicts of a batch: any `RetryLater` wins.
    pub fn combine(self, other: Disposition) -> Disposition {
        match (self, other) {
            (Disposition::Acknowledge, Disposition::Acknowledge) => Disposition::Acknowledge,
            _ => Disposition::RetryLater,
        }
    }

    pub fn is_acknowledge(&self) -> bool {
        matches!(self, Disposition::Acknowledge)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Acknowledge => write!(f, "acknowledge"),
            Disposition::RetryLater => write!(f, "retry_later"),
        }
    }
}
