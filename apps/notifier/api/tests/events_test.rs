//! Ingestion API tests against the in-memory queue.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use domain_notifications::{Event, RelayConfig};
use http_body_util::BodyExt;
use messaging::memory::InMemoryQueue;
use notifier_api::{AppState, router};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

const CONFIG: &str = r#"{
    "mq": {"name_server": "nats://localhost:4222", "group_name": "notifier"},
    "notifications": [
        {"event_type": "user.created", "queue_name": "user_events",
         "http_method": "POST", "http_url": "https://hooks.example.com/users"},
        {"event_type": "order.paid", "queue_name": "order_events",
         "http_method": "PUT", "http_url": "https://hooks.example.com/orders"}
    ]
}"#;

fn app() -> (Router, Arc<InMemoryQueue>) {
    let config = RelayConfig::from_json(CONFIG).unwrap();
    let queue = Arc::new(InMemoryQueue::new());
    let state = AppState::new(Arc::new(config.routing_table()), queue.clone());
    (router(state), queue)
}

async fn send(app: Router, method: Method, uri: &str, body: impl Into<Body>) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn post_event(app: Router, body: impl Into<Body>) -> (StatusCode, String) {
    send(app, Method::POST, "/events", body).await
}

#[tokio::test]
async fn test_event_is_published_to_rule_queue() {
    let (app, queue) = app();
    let body = json!({
        "id": "evt-1",
        "type": "order.paid",
        "timestamp": "2024-05-01T12:00:00Z",
        "data": {"order_id": 7}
    });

    let (status, text) = post_event(app, body.to_string()).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(text, "Event accepted");
    assert!(queue.published("user_events").is_empty());

    let published = queue.published("order_events");
    assert_eq!(published.len(), 1);
    let event = Event::decode(&published[0].body).unwrap();
    assert_eq!(event.id, "evt-1");
    assert_eq!(event.event_type, "order.paid");
    assert_eq!(event.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    assert_eq!(event.data["order_id"], 7);
}

#[tokio::test]
async fn test_missing_id_and_timestamp_are_filled() {
    let (app, queue) = app();
    let body = json!({"type": "user.created", "data": {"user_id": "42"}});

    let (status, _) = post_event(app, body.to_string()).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let event = Event::decode(&queue.published("user_events")[0].body).unwrap();
    assert!(!event.id.is_empty());
    assert!(event.has_timestamp());
    assert_eq!(event.data["user_id"], "42");
}

#[tokio::test]
async fn test_invalid_body_is_rejected() {
    for body in ["not json", "42", r#"{"type": 42}"#, ""] {
        let (app, queue) = app();
        let (status, text) = post_event(app, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body:?}");
        assert_eq!(text, "Invalid request body");
        assert!(queue.published("user_events").is_empty());
    }
}

#[tokio::test]
async fn test_missing_type_is_rejected() {
    for body in [json!({"data": {}}), json!({"type": ""}), json!({"type": null})] {
        let (app, _) = app();
        let (status, text) = post_event(app, body.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(text, "Event type is required");
    }
}

#[tokio::test]
async fn test_unknown_type_is_rejected() {
    let (app, queue) = app();
    let (status, text) = post_event(app, json!({"type": "user.archived"}).to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(text, "Unknown event type: user.archived");
    assert!(queue.published("user_events").is_empty());
}

#[tokio::test]
async fn test_publish_failure_is_internal_error() {
    let (app, queue) = app();
    queue.fail_publishes(true);

    let (status, text) = post_event(app, json!({"type": "user.created"}).to_string()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text, "Internal server error");
}

#[tokio::test]
async fn test_other_methods_are_not_allowed() {
    let (app, _) = app();
    let (status, _) = send(app, Method::GET, "/events", Body::empty()).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let (status, _) = send(app, Method::GET, "/health", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
}
