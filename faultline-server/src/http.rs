//! Faultline operator HTTP API
//!
//! Axum-based HTTP server for producers and operators. Runs alongside the
//! client channel on its own port (configurable).
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function, so the inner functions are directly testable.
//!
//! Endpoints:
//! - GET  /health            store reachability and connected client count
//! - GET  /version           server version info
//! - POST /publish           append a raw exception record to the stream topic
//! - GET  /summaries/:kind   latest cached summary for an exception kind

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use faultline_core::{decode, FaultlineConfig, StreamPublisher, SummaryCache};
use serde::Deserialize;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::subsystems::hub::BroadcastHub;

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub pool: Option<PgPool>,
    pub cache: Arc<dyn SummaryCache>,
    pub publisher: Arc<dyn StreamPublisher>,
    pub hub: Arc<BroadcastHub>,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/publish", post(publish_handler))
        .route("/summaries/:kind", get(summary_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    config: &FaultlineConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Faultline HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub raw: Option<String>,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check: pings the database when one is configured.
pub async fn health_inner(state: &HttpState) -> (StatusCode, serde_json::Value) {
    let postgresql = match &state.pool {
        Some(pool) => match faultline_core::db::health_check(pool).await {
            Ok(v) => Some(v),
            Err(e) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    serde_json::json!({
                        "status": "unhealthy",
                        "error": e.to_string(),
                    }),
                );
            }
        },
        None => None,
    };

    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "store": state.cache.name(),
            "topic": state.publisher.topic(),
            "postgresql": postgresql,
            "clients": state.hub.len(),
        }),
    )
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "faultline/1",
    })
}

/// Inner publish: appends the raw record to the topic as-is.
///
/// Malformed records are still published (the relay skips them); the response
/// reports whether the record would decode.
pub async fn publish_inner(
    publisher: &dyn StreamPublisher,
    req: PublishRequest,
) -> (StatusCode, serde_json::Value) {
    let raw = match req.raw {
        Some(r) if !r.is_empty() => r,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "raw field is required",
                    "status": "error",
                }),
            );
        }
    };

    let well_formed = decode(&raw).is_ok();

    match publisher.publish(raw.as_bytes()).await {
        Ok(offset) => (
            StatusCode::OK,
            serde_json::json!({
                "published": true,
                "topic": publisher.topic(),
                "offset": offset,
                "well_formed": well_formed,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Publish failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "error": e.to_string(),
                    "status": "error",
                }),
            )
        }
    }
}

/// Inner summary lookup: newest cached record for `kind`.
pub async fn summary_inner(
    cache: &dyn SummaryCache,
    kind: &str,
) -> (StatusCode, serde_json::Value) {
    match cache.lookup_latest(kind).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            serde_json::to_value(&record).unwrap_or_default(),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({
                "error": format!("no summary cached for {}", kind),
                "status": "error",
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "error": e.to_string(),
                "status": "error",
            }),
        ),
    }
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn publish_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<PublishRequest>,
) -> impl IntoResponse {
    let (status, body) = publish_inner(state.publisher.as_ref(), req).await;
    (status, Json(body))
}

pub async fn summary_handler(
    State(state): State<Arc<HttpState>>,
    Path(kind): Path<String>,
) -> impl IntoResponse {
    let (status, body) = summary_inner(state.cache.as_ref(), &kind).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_core::{channel_stream, MemorySummaryCache, StreamConsumer, SummaryRecord};

    #[test]
    fn test_version_inner_has_protocol() {
        let v = version_inner();
        assert_eq!(v["protocol"], "faultline/1");
        assert!(v["version"].is_string());
    }

    #[tokio::test]
    async fn test_publish_inner_requires_raw() {
        let (publisher, _consumer) = channel_stream("exception-topic", 4);

        let (status, body) = publish_inner(&publisher, PublishRequest { raw: None }).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");

        let (status, _) =
            publish_inner(&publisher, PublishRequest { raw: Some(String::new()) }).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_publish_inner_forwards_raw_bytes() {
        let (publisher, mut consumer) = channel_stream("exception-topic", 4);

        let (status, body) = publish_inner(
            &publisher,
            PublishRequest {
                raw: Some("t|CartEmpty|Cart.java|checkout|1".to_string()),
            },
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["well_formed"], true);
        assert_eq!(body["topic"], "exception-topic");

        let message = consumer.next_message().await.unwrap().unwrap();
        assert_eq!(message.payload, b"t|CartEmpty|Cart.java|checkout|1");
    }

    #[tokio::test]
    async fn test_publish_inner_flags_malformed_but_publishes() {
        let (publisher, mut consumer) = channel_stream("exception-topic", 4);

        let (status, body) = publish_inner(
            &publisher,
            PublishRequest {
                raw: Some("not|enough".to_string()),
            },
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["well_formed"], false);
        assert!(consumer.next_message().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_summary_inner_404_then_200() {
        let cache = MemorySummaryCache::new();

        let (status, _) = summary_inner(&cache, "CartEmpty").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        cache
            .append(&SummaryRecord {
                kind: "CartEmpty".to_string(),
                created_at: "t".to_string(),
                source_file: "Cart.java".to_string(),
                source_method: "checkout".to_string(),
                source_line: "1".to_string(),
                summary_text: "The cart had no items".to_string(),
            })
            .await
            .unwrap();

        let (status, body) = summary_inner(&cache, "CartEmpty").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary_text"], "The cart had no items");
    }
}
