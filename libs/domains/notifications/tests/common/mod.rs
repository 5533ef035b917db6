//! Shared fixtures for notifications integration tests.
//!
//! Provides a recording sleeper, wiremock responders and a mocked publisher
//! so delivery and handler behavior can be checked without real time or a
//! broker.

#![allow(dead_code)]

use async_trait::async_trait;
use domain_notifications::{
    DeadLetterEscalator, DeliveryExecutor, NotificationHandler, RelayConfig, RoutingTable,
    Sleeper,
};
use messaging::{Publisher, QueueError, QueueMessage};
use mockall::mock;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::{Request, Respond, ResponseTemplate};

pub const USER_TOPIC: &str = "user_events";
pub const ORDER_TOPIC: &str = "order_events";

// ---------------------------------------------------------------------------
// RecordingSleeper - records backoff delays and returns immediately
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.sleeps.lock().unwrap().push(duration);
        Box::pin(std::future::ready(()))
    }
}

/// A sleeper that never wakes up (to cancel during a backoff).
#[derive(Debug, Default)]
pub struct StuckSleeper;

impl Sleeper for StuckSleeper {
    fn sleep(&self, _duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(std::future::pending())
    }
}

// ---------------------------------------------------------------------------
// SequenceResponder - answers with a fixed status sequence, capturing requests
// ---------------------------------------------------------------------------

/// Responds with `statuses[i]` to the i-th request; the last status repeats.
#[derive(Clone)]
pub struct SequenceResponder {
    statuses: Arc<Vec<u16>>,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl SequenceResponder {
    pub fn new(statuses: &[u16]) -> Self {
        assert!(!statuses.is_empty());
        Self {
            statuses: Arc::new(statuses.to_vec()),
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always(status: u16) -> Self {
        Self::new(&[status])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let status = self.statuses[n.min(self.statuses.len() - 1)];
        ResponseTemplate::new(status).set_body_string(format!("response {}", n + 1))
    }
}

// ---------------------------------------------------------------------------
// MockPublisher
// ---------------------------------------------------------------------------

mock! {
    pub Publisher {}

    #[async_trait]
    impl Publisher for Publisher {
        async fn publish(
            &self,
            topic: &str,
            body: &[u8],
            properties: &HashMap<String, String>,
        ) -> Result<(), QueueError>;
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Relay config with three rules pointing at `base_url`:
/// - `user.created` → POST /users (user_events), JSON body with placeholders
/// - `user.deleted` → DELETE /users (user_events), no body
/// - `order.paid`   → PUT /orders (order_events), nested body
pub fn relay_config(base_url: &str, max_retries: i64) -> RelayConfig {
    let raw = json!({
        "mq": {
            "name_server": "nats://localhost:4222",
            "group_name": "notifier-test",
            "max_retries": max_retries
        },
        "notifications": [
            {
                "event_type": "user.created",
                "queue_name": USER_TOPIC,
                "http_method": "post",
                "http_url": format!("{base_url}/users"),
                "headers": {"Content-Type": "application/json", "X-Api-Key": "secret"},
                "body": {"id": "{$.event.user_id}", "age": "{$.event.age}", "source": "notifier"}
            },
            {
                "event_type": "user.deleted",
                "queue_name": USER_TOPIC,
                "http_method": "DELETE",
                "http_url": format!("{base_url}/users")
            },
            {
                "event_type": "order.paid",
                "queue_name": ORDER_TOPIC,
                "http_method": "PUT",
                "http_url": format!("{base_url}/orders"),
                "body": {"order": {"id": "{$.event.order_id}", "lines": ["{$.event.sku}", "{$.event.missing}"]}}
            }
        ]
    });
    RelayConfig::from_json(&raw.to_string()).unwrap()
}

pub fn executor(sleeper: Arc<dyn Sleeper>) -> DeliveryExecutor {
    let client = DeliveryExecutor::build_client(Duration::from_secs(5)).unwrap();
    DeliveryExecutor::new(client).with_sleeper(sleeper)
}

pub fn handler(
    config: &RelayConfig,
    publisher: Arc<dyn Publisher>,
    sleeper: Arc<dyn Sleeper>,
) -> NotificationHandler {
    NotificationHandler::new(
        Arc::new(config.routing_table()),
        config.max_retries(),
        executor(sleeper),
        DeadLetterEscalator::new(publisher),
    )
}

pub fn routes(config: &RelayConfig) -> RoutingTable {
    config.routing_table()
}

/// Event JSON body.
pub fn event_body(event_type: &str, data: Value) -> Vec<u8> {
    json!({
        "id": format!("evt-{event_type}"),
        "type": event_type,
        "timestamp": "2024-05-01T12:00:00Z",
        "data": data
    })
    .to_string()
    .into_bytes()
}

pub fn message(topic: &str, body: Vec<u8>, redelivery_count: u32) -> QueueMessage {
    QueueMessage::new(topic, format!("msg-{redelivery_count}"), body)
        .with_redelivery_count(redelivery_count)
        .with_property("trace_id", "trace-1")
}

pub fn user_created(redelivery_count: u32) -> QueueMessage {
    message(
        USER_TOPIC,
        event_body("user.created", json!({"user_id": "42", "age": 30})),
        redelivery_count,
    )
}
