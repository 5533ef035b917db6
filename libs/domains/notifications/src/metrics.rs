//! Prometheus metrics for the relay.
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Duration;

pub const MESSAGES_TOTAL: &str = "notifier_messages_total";
pub const DELIVERY_ATTEMPTS_TOTAL: &str = "notifier_delivery_attempts_total";
pub const DEAD_LETTERS_TOTAL: &str = "notifier_dead_letters_total";
pub const DELIVERY_DURATION_SECONDS: &str = "notifier_delivery_duration_seconds";

/// Register metric descriptions with the installed recorder.
pub fn describe() {
    describe_counter!(MESSAGES_TOTAL, "Messages handled, by topic and outcome");
    describe_counter!(
        DELIVERY_ATTEMPTS_TOTAL,
        "Outbound HTTP attempts, by event type and result"
    );
    describe_counter!(DEAD_LETTERS_TOTAL, "Messages republished to a dead-letter topic");
    describe_histogram!(
        DELIVERY_DURATION_SECONDS,
        Unit::Seconds,
        "Time spent delivering one event, retries included"
    );
}

/// Relay metrics recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayMetrics;

impl RelayMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Record how a message was handled.
    pub fn message_handled(&self, topic: &str, outcome: &'static str) {
        counter!(
            MESSAGES_TOTAL,
            "topic" => topic.to_string(),
            "outcome" => outcome
        )
        .increment(1);
    }

    /// Record one HTTP attempt (`success`, `terminal`, `retryable`, `cancelled`).
    pub fn delivery_attempt(&self, event_type: &str, result: &'static str) {
        counter!(
            DELIVERY_ATTEMPTS_TOTAL,
            "event_type" => event_type.to_string(),
            "result" => result
        )
        .increment(1);
    }

    /// Record a dead-letter publish.
    pub fn dead_lettered(&self, topic: &str) {
        counter!(DEAD_LETTERS_TOTAL, "topic" => topic.to_string()).increment(1);
    }

    /// Record the duration of a whole delivery ladder.
    pub fn delivery_duration(&self, event_type: &str, duration: Duration) {
        histogram!(
            DELIVERY_DURATION_SECONDS,
            "event_type" => event_type.to_string()
        )
        .record(duration.as_secs_f64());
    }
}
