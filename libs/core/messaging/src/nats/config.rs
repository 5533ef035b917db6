//! Configuration for the NATS JetStream queue client.

use crate::config::BackoffStrategy;
use crate::message::dead_letter_topic;
use std::time::Duration;

/// Default JetStream stream holding every work topic.
pub const DEFAULT_STREAM_NAME: &str = "NOTIFICATIONS";

/// NATS JetStream client configuration.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// Server URL (e.g., "nats://localhost:4222")
    pub url: String,

    /// Optional user/password credentials
    pub credentials: Option<(String, String)>,

    /// Stream whose subjects are the work topics
    pub stream_name: String,

    /// Stream whose subjects are the dead-letter topics
    pub dlq_stream: String,

    /// Durable consumer name prefix (one consumer per topic)
    pub consumer_prefix: String,

    /// Batch size for fetching messages
    pub batch_size: usize,

    /// How long a fetch waits for messages before returning
    pub fetch_timeout: Duration,

    /// Time the broker waits for an ack before redelivering
    pub ack_wait: Duration,

    /// Maximum messages handled at once per topic
    pub max_concurrent_messages: usize,

    /// Delay requested from the broker when a handler answers `RetryLater`
    pub redelivery_backoff: BackoffStrategy,

    /// Retention for work streams
    pub max_age: Duration,

    /// Retention for the dead-letter stream
    pub dlq_max_age: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            credentials: None,
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            dlq_stream: format!("{}_DLQ", DEFAULT_STREAM_NAME),
            consumer_prefix: "notifier".to_string(),
            batch_size: 10,
            fetch_timeout: Duration::from_secs(5),
            ack_wait: Duration::from_secs(60),
            max_concurrent_messages: 4,
            redelivery_backoff: BackoffStrategy::default(),
            max_age: Duration::from_secs(7 * 24 * 60 * 60), // 7 days
            dlq_max_age: Duration::from_secs(30 * 24 * 60 * 60), // 30 days
        }
    }
}

impl NatsConfig {
    /// Create a configuration for the given server URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Authenticate with user and password.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    /// Set the work stream name; the DLQ stream becomes `<name>_DLQ`.
    pub fn with_stream(mut self, name: impl Into<String>) -> Self {
        self.stream_name = name.into();
        self.dlq_stream = format!("{}_DLQ", self.stream_name);
        self
    }

    /// Set the durable consumer name prefix.
    pub fn with_consumer_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.consumer_prefix = prefix.into();
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the ack wait.
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    /// Set the maximum concurrent messages per topic.
    pub fn with_max_concurrent_messages(mut self, max: usize) -> Self {
        self.max_concurrent_messages = max.max(1);
        self
    }

    /// Set the redelivery backoff.
    pub fn with_redelivery_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.redelivery_backoff = backoff;
        self
    }

    /// How often in-flight messages are reported as still in progress.
    ///
    /// Half of `ack_wait`, so one lost progress report never lets the
    /// broker redeliver a message that is still being handled.
    pub fn progress_interval(&self) -> Duration {
        (self.ack_wait / 2).max(Duration::from_millis(100))
    }

    /// Durable consumer name for `topic`.
    ///
    /// Consumer names may not contain `.`, `*` or `>`.
    pub fn durable_name(&self, topic: &str) -> String {
        let sanitized: String = topic
            .chars()
            .map(|c| match c {
                '.' | '*' | '>' | ' ' => '_',
                other => other,
            })
            .collect();
        format!("{}-{}", self.consumer_prefix, sanitized)
    }

    /// Dead-letter subject for `topic`, as published by [`dead_letter_topic`].
    pub fn dead_letter_subject(&self, topic: &str) -> String {
        dead_letter_topic(topic)
    }
}
