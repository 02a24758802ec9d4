//! HTTP integration tests for the operator API
//!
//! Run entirely on memory backends and use the Axum `oneshot` approach for
//! full handler dispatch.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use faultline_core::{
    channel_stream, ChannelConsumer, MemorySummaryCache, StreamConsumer, SummaryCache,
    SummaryRecord,
};
use faultline_server::http::{build_router, health_inner, HttpState};
use faultline_server::subsystems::hub::BroadcastHub;
use serde_json::json;
use tower::ServiceExt;

fn make_state() -> (Arc<HttpState>, Arc<MemorySummaryCache>, ChannelConsumer) {
    let cache = Arc::new(MemorySummaryCache::new());
    let (publisher, consumer) = channel_stream("exception-topic", 16);
    let state = Arc::new(HttpState {
        pool: None,
        cache: cache.clone(),
        publisher: Arc::new(publisher),
        hub: Arc::new(BroadcastHub::new("s3cret")),
    });
    (state, cache, consumer)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ===========================================================================
// TEST 1: health reports memory backends and client count
// ===========================================================================
#[tokio::test]
async fn test_health_without_database() {
    let (state, _cache, _consumer) = make_state();
    let _session = state.hub.register();

    let (status, body) = health_inner(&state).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["topic"], "exception-topic");
    assert_eq!(body["clients"], 1);
    assert!(body["postgresql"].is_null());
}

// ===========================================================================
// TEST 2: GET /version via oneshot
// ===========================================================================
#[tokio::test]
async fn test_version_endpoint() {
    let (state, _cache, _consumer) = make_state();
    let app = build_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/version")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["protocol"], "faultline/1");
}

// ===========================================================================
// TEST 3: POST /publish lands on the stream
// ===========================================================================
#[tokio::test]
async fn test_publish_endpoint_appends_to_stream() {
    let (state, _cache, mut consumer) = make_state();
    let app = build_router(state);

    let req = Request::builder()
        .method("POST")
        .uri("/publish")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"raw": "2024-01-01T00:00:00|NullPointerException|App.java|doWork|42"})
                .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["published"], true);
    assert_eq!(body["well_formed"], true);

    let message = consumer.next_message().await.unwrap().unwrap();
    assert_eq!(
        message.payload,
        b"2024-01-01T00:00:00|NullPointerException|App.java|doWork|42"
    );
}

// ===========================================================================
// TEST 4: POST /publish without raw is a 400
// ===========================================================================
#[tokio::test]
async fn test_publish_endpoint_rejects_empty_body() {
    let (state, _cache, _consumer) = make_state();
    let app = build_router(state);

    let req = Request::builder()
        .method("POST")
        .uri("/publish")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ===========================================================================
// TEST 5: GET /summaries/:kind is 404 before caching, latest record after
// ===========================================================================
#[tokio::test]
async fn test_summary_endpoint_returns_latest_record() {
    let (state, cache, _consumer) = make_state();
    let app = build_router(state);

    let missing = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/summaries/OrderNotFound")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    for (line, text) in [("1", "first"), ("2", "second")] {
        cache
            .append(&SummaryRecord {
                kind: "OrderNotFound".to_string(),
                created_at: "t".to_string(),
                source_file: "Order.java".to_string(),
                source_method: "load".to_string(),
                source_line: line.to_string(),
                summary_text: text.to_string(),
            })
            .await
            .unwrap();
    }

    let found = app
        .oneshot(
            Request::builder()
                .uri("/summaries/OrderNotFound")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(found.status(), StatusCode::OK);
    let body = body_json(found).await;
    assert_eq!(body["summary_text"], "second");
    assert_eq!(body["source_line"], "2");
}
