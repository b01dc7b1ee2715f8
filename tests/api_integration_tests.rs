//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::DateTime;
use chunk_cache::{
    api::create_router,
    cache::{CacheStore, ManualClock},
    config::CacheOptions,
    store::MemoryDocumentStore,
    AppState,
};
use serde_json::{json, Value};
use tower::ServiceExt;

// == Helper Functions ==

fn create_test_app() -> Router {
    create_app_with(CacheOptions::default()).0
}

fn create_app_with(options: CacheOptions) -> (Router, Arc<MemoryDocumentStore>, Arc<ManualClock>) {
    let store = Arc::new(MemoryDocumentStore::new());
    let clock = Arc::new(ManualClock::new(
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    ));
    let cache = CacheStore::with_store(options, store.clone()).with_clock(clock.clone());
    (create_router(AppState::new(cache)), store, clock)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

// == SET / ADD Endpoint Tests ==

#[tokio::test]
async fn test_set_endpoint_success() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        "PUT",
        "/set",
        Some(json!({"key": "test_key", "value": "test_value"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().unwrap().contains("test_key"));
}

#[tokio::test]
async fn test_add_endpoint_success() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        "PUT",
        "/add",
        Some(json!({"key": "add_key", "value": [1, 2, 3], "ttl": 60})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().unwrap().contains("added"));

    let (status, json) = send(&app, "GET", "/get/add_key", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], json!([1, 2, 3]));
}

// == GET Endpoint Tests ==

#[tokio::test]
async fn test_get_endpoint_success() {
    let app = create_test_app();
    let value = json!({"name": "aspirin", "doses": [100, 300, 500], "otc": true});

    let (status, _) = send(
        &app,
        "PUT",
        "/set",
        Some(json!({"key": "get_key", "value": value})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, "GET", "/get/get_key", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["key"].as_str().unwrap(), "get_key");
    assert_eq!(json["value"], value);
}

#[tokio::test]
async fn test_get_endpoint_not_found() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/get/nonexistent_key", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_get_chunked_value() {
    let options = CacheOptions {
        max_size: 64,
        compression: false,
        ..CacheOptions::default()
    };
    let (app, store, _clock) = create_app_with(options);
    let text: String = (0..2000).map(|i| char::from(b'a' + (i * 7 % 26) as u8)).collect();

    let (status, _) = send(
        &app,
        "PUT",
        "/set",
        Some(json!({"key": "big", "value": text})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.ids().unwrap().len() > 1, "value should be chunked");

    let (status, json) = send(&app, "GET", "/get/big", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"].as_str().unwrap(), text);

    let (status, _) = send(&app, "DELETE", "/del/big", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.ids().unwrap().is_empty(), "chunks should be removed with the entry");
}

#[tokio::test]
async fn test_get_versioned_key() {
    let app = create_test_app();

    send(
        &app,
        "PUT",
        "/set",
        Some(json!({"key": "v", "value": "two", "version": 2})),
    )
    .await;

    let (status, _) = send(&app, "GET", "/get/v", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(&app, "GET", "/get/v?version=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], json!("two"));
}

#[tokio::test]
async fn test_get_many_endpoint() {
    let app = create_test_app();
    for (key, value) in [("a", json!(1)), ("b", json!({"x": "y"}))] {
        send(&app, "PUT", "/set", Some(json!({"key": key, "value": value}))).await;
    }

    let (status, json) = send(
        &app,
        "POST",
        "/get_many",
        Some(json!({"keys": ["a", "b", "missing"]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let values = json["values"].as_object().unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values["a"], json!(1));
    assert_eq!(values["b"], json!({"x": "y"}));
}

// == DELETE Endpoint Tests ==

#[tokio::test]
async fn test_delete_endpoint_success() {
    let app = create_test_app();
    send(
        &app,
        "PUT",
        "/set",
        Some(json!({"key": "delete_key", "value": "x"})),
    )
    .await;

    let (status, json) = send(&app, "DELETE", "/del/delete_key", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().unwrap().contains("deleted"));

    let (status, _) = send(&app, "GET", "/get/delete_key", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_endpoint_not_found() {
    let app = create_test_app();

    let (status, _) = send(&app, "DELETE", "/del/nonexistent", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clear_endpoint() {
    let (app, store, _clock) = create_app_with(CacheOptions::default());
    for key in ["a", "b", "c"] {
        send(&app, "PUT", "/set", Some(json!({"key": key, "value": key}))).await;
    }

    let (status, _) = send(&app, "DELETE", "/clear", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(store.ids().unwrap().is_empty());
}

// == HAS KEY Endpoint Tests ==

#[tokio::test]
async fn test_has_key_endpoint() {
    let app = create_test_app();
    send(&app, "PUT", "/set", Some(json!({"key": "here", "value": 1}))).await;

    let (status, json) = send(&app, "GET", "/has/here", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["exists"], json!(true));

    let (status, json) = send(&app, "GET", "/has/gone", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["exists"], json!(false));
}

// == STATS Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint() {
    let app = create_test_app();
    send(&app, "PUT", "/set", Some(json!({"key": "s", "value": 1}))).await;
    send(&app, "GET", "/get/s", None).await;
    send(&app, "GET", "/get/s", None).await;
    send(&app, "GET", "/get/missing", None).await;

    let (status, json) = send(&app, "GET", "/stats", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["hits"], json!(2));
    assert_eq!(json["misses"], json!(1));
    assert_eq!(json["total_entries"], json!(1));
    let hit_rate = json["hit_rate"].as_f64().unwrap();
    assert!((hit_rate - 2.0 / 3.0).abs() < 0.001);
}

// == HEALTH Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app();

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"].as_str().unwrap(), "healthy");
    assert!(json.get("timestamp").is_some());
}

// == Error Response Tests ==

#[tokio::test]
async fn test_invalid_json_request() {
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/set")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"invalid json"#))
                .unwrap(),
        )
        .await
        .unwrap();

    // Axum returns 422 for JSON parsing errors by default
    assert!(
        response.status() == StatusCode::BAD_REQUEST
            || response.status() == StatusCode::UNPROCESSABLE_ENTITY
    );
}

#[tokio::test]
async fn test_empty_key_request() {
    let app = create_test_app();

    let (status, json) = send(&app, "PUT", "/set", Some(json!({"key": "", "value": "test"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn test_store_unavailable() {
    let (app, store, _clock) = create_app_with(CacheOptions::default());
    store.set_available(false);

    let (status, json) = send(&app, "PUT", "/set", Some(json!({"key": "k", "value": 1}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json.get("error").is_some());
}

// == TTL Expiration via API Tests ==

#[tokio::test]
async fn test_ttl_expiration_via_api() {
    let (app, store, clock) = create_app_with(CacheOptions::default());

    let (status, _) = send(
        &app,
        "PUT",
        "/set",
        Some(json!({"key": "ttl_test", "value": "expires_soon", "ttl": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", "/get/ttl_test", None).await;
    assert_eq!(status, StatusCode::OK);

    clock.advance(Duration::from_secs(2));

    let (status, _) = send(&app, "GET", "/get/ttl_test", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(store.ids().unwrap().is_empty(), "expired entry is removed on read");

    let (_, json) = send(&app, "GET", "/stats", None).await;
    assert_eq!(json["lazy_expirations"], json!(1));
}
