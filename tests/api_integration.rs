//! HTTP API integration tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot` against the
//! memory message store.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use pairwire::config::Settings;
use pairwire::fanout::{ConversationKey, ParticipantId};
use pairwire::persistence::MemoryMessageStore;
use pairwire::server::{create_app, AppState};

const IDENTITY_HEADER: &str = "x-participant-id";

fn test_state(store: MemoryMessageStore) -> AppState {
    AppState::new(Settings::default(), Arc::new(store))
}

fn send_request(from: Option<&str>, payload: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/messages")
        .header("content-type", "application/json");
    if let Some(from) = from {
        builder = builder.header(IDENTITY_HEADER, from);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// =============================================================================
// Health & Stats
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = create_app(test_state(MemoryMessageStore::with_auto_register()));
    let (status, body) = call(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_stats_reports_rooms() {
    let state = test_state(MemoryMessageStore::with_auto_register());
    let key = ConversationKey::from_ids("alice", "bob").unwrap();
    let (_room, _sub) = state
        .registry
        .subscribe(&key, ParticipantId::new("alice").unwrap())
        .unwrap();

    let (status, body) = call(create_app(state), get("/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rooms"], 1);
    assert_eq!(body["subscribers"], 1);
    assert_eq!(body["store_backend"], "memory");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_app(test_state(MemoryMessageStore::with_auto_register()));
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Send Message
// =============================================================================

#[tokio::test]
async fn test_send_requires_identity() {
    let app = create_app(test_state(MemoryMessageStore::with_auto_register()));
    let (status, body) = call(
        app,
        send_request(None, json!({"receiver_id": "bob", "body": "hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_send_to_self_rejected() {
    let app = create_app(test_state(MemoryMessageStore::with_auto_register()));
    let (status, body) = call(
        app,
        send_request(Some("alice"), json!({"receiver_id": "alice", "body": "hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_send_empty_body_rejected() {
    let app = create_app(test_state(MemoryMessageStore::with_auto_register()));
    let (status, _) = call(
        app,
        send_request(Some("alice"), json!({"receiver_id": "bob", "body": "  "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_send_unknown_participant() {
    let store = MemoryMessageStore::new();
    store.register_user(ParticipantId::new("alice").unwrap(), "Alice");
    let app = create_app(test_state(store));

    let (status, body) = call(
        app,
        send_request(Some("alice"), json!({"receiver_id": "ghost", "body": "hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_send_without_listeners_is_stored_not_live() {
    let state = test_state(MemoryMessageStore::with_auto_register());
    let registry = state.registry.clone();
    let app = create_app(state);

    let (status, body) = call(
        app,
        send_request(Some("alice"), json!({"receiver_id": "bob", "body": "hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["live"], false);
    assert_eq!(body["delivered_to"], 0);
    // Publishing never creates a room
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_send_delivers_to_live_subscriber() {
    let store = MemoryMessageStore::new();
    store.register_user(ParticipantId::new("alice").unwrap(), "Alice");
    store.register_user(ParticipantId::new("bob").unwrap(), "Bob");
    let state = test_state(store);

    let key = ConversationKey::from_ids("bob", "alice").unwrap();
    let (_room, mut sub) = state
        .registry
        .subscribe(&key, ParticipantId::new("bob").unwrap())
        .unwrap();

    let (status, body) = call(
        create_app(state),
        send_request(Some("alice"), json!({"receiver_id": "bob", "body": "hello bob"})),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["live"], true);
    assert_eq!(body["delivered_to"], 1);

    let frame = sub.receiver.try_recv().expect("frame should be queued");
    let delivered: Value = serde_json::from_str(frame.as_str()).unwrap();
    assert_eq!(delivered["from_id"], "alice");
    assert_eq!(delivered["to_id"], "bob");
    assert_eq!(delivered["body"], "hello bob");
    assert_eq!(delivered["sender"], "Alice");
    assert_eq!(delivered["receiver"], "Bob");
}

// =============================================================================
// WebSocket Endpoint
// =============================================================================

fn ws_request(from: Option<&str>, peer: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(format!("/ws/{}", peer))
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==");
    if let Some(from) = from {
        builder = builder.header(IDENTITY_HEADER, from);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_ws_to_self_rejected() {
    let app = create_app(test_state(MemoryMessageStore::with_auto_register()));
    let (status, body) = call(app, ws_request(Some("alice"), "alice")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_ws_requires_identity() {
    let app = create_app(test_state(MemoryMessageStore::with_auto_register()));
    let (status, _) = call(app, ws_request(None, "bob")).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
