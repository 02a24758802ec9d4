//! End-to-end relay tests: in-process stream → ingestion loop → hub session.
//!
//! The enrichment service is a wiremock server, so every call made by the
//! resolver is a real HTTP request that can be counted.

use std::sync::Arc;

use faultline_core::config::EnrichmentConfig;
use faultline_core::{
    channel_stream, HttpEnrichmentClient, MemorySummaryCache, StreamPublisher, SummaryCache,
    SummaryResolver,
};
use faultline_server::subsystems::hub::{BroadcastHub, ClientSession};
use faultline_server::subsystems::ingest::{run_ingestion_loop, IngestStats, StopReason};
use serde_json::json;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn enrichment_for(server: &MockServer) -> Arc<HttpEnrichmentClient> {
    let config = EnrichmentConfig {
        url: format!("{}/exception-llm-summary", server.uri()),
        query_param: "name".to_string(),
        timeout_seconds: Some(5),
    };
    Arc::new(HttpEnrichmentClient::new(&config).expect("Failed to create client"))
}

async fn next_json(session: &mut ClientSession) -> serde_json::Value {
    let text = session.outbound.recv().await.expect("session closed early");
    serde_json::from_str(&text).expect("broadcast payload must be JSON")
}

/// Publish `lines`, close the stream, and run ingestion to completion.
async fn relay(
    lines: &[&str],
    cache: Arc<MemorySummaryCache>,
    enrichment: Arc<HttpEnrichmentClient>,
    hub: Arc<BroadcastHub>,
) -> IngestStats {
    let (publisher, consumer) = channel_stream("exception-topic", 64);
    for line in lines {
        publisher.publish(line.as_bytes()).await.unwrap();
    }
    drop(publisher);

    let (_tx, rx) = broadcast::channel(1);
    let resolver = SummaryResolver::new(cache, enrichment);
    let (reason, stats) = run_ingestion_loop(Box::new(consumer), resolver, hub, rx).await;
    assert_eq!(reason, StopReason::StreamClosed);
    stats
}

// ===========================================================================
// Cache miss, then cache hit for the same kind, with a malformed record between
// ===========================================================================
#[tokio::test]
async fn test_null_pointer_scenarios() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/exception-llm-summary"))
        .and(query_param("name", "NullPointerException"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "inference_output": "Null reference accessed"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let cache = Arc::new(MemorySummaryCache::new());
    let hub = Arc::new(BroadcastHub::new("s3cret"));
    let mut session = hub.register();

    let stats = relay(
        &[
            "2024-01-01T00:00:00|NullPointerException|App.java|doWork|42",
            "2024-01-01T00:00:05|NullPointerException|App.java|doWork",
            "2024-01-02T09:30:00|NullPointerException|Worker.java|run|7",
        ],
        cache.clone(),
        enrichment_for(&mock_server).await,
        hub.clone(),
    )
    .await;

    assert_eq!(
        stats,
        IngestStats {
            received: 3,
            broadcast: 2,
            skipped: 1
        }
    );

    assert_eq!(
        next_json(&mut session).await,
        json!({
            "ExceptionName": "NullPointerException",
            "ExceptionDate": "2024-01-01T00:00:00",
            "ExceptionFile": "App.java",
            "ExceptionMethod": "doWork",
            "ExceptionLine": "42",
            "ExceptionSummary": "Null reference accessed"
        })
    );
    assert_eq!(
        next_json(&mut session).await,
        json!({
            "ExceptionName": "NullPointerException",
            "ExceptionDate": "2024-01-02T09:30:00",
            "ExceptionFile": "Worker.java",
            "ExceptionMethod": "run",
            "ExceptionLine": "7",
            "ExceptionSummary": "Null reference accessed"
        })
    );
    assert!(session.outbound.try_recv().is_err(), "malformed record must not broadcast");

    assert_eq!(cache.count("NullPointerException"), 1);
    let stored = cache.lookup_latest("NullPointerException").await.unwrap().unwrap();
    assert_eq!(stored.created_at, "2024-01-01T00:00:00");
    assert_eq!(stored.source_line, "42");
    // wiremock verifies `.expect(1)` when the server drops
}

// ===========================================================================
// Enrichment outage drops only the affected event
// ===========================================================================
#[tokio::test]
async fn test_enrichment_failure_skips_event_and_continues() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("name", "PaymentFailed"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("name", "CartEmpty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "inference_output": "The cart had no items"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let cache = Arc::new(MemorySummaryCache::new());
    let hub = Arc::new(BroadcastHub::new("s3cret"));
    let mut session = hub.register();

    let stats = relay(
        &[
            "t1|PaymentFailed|Pay.java|charge|10",
            "t2|CartEmpty|Cart.java|checkout|20",
            "t3|PaymentFailed|Pay.java|charge|11",
        ],
        cache.clone(),
        enrichment_for(&mock_server).await,
        hub,
    )
    .await;

    assert_eq!(stats.broadcast, 1);
    assert_eq!(stats.skipped, 2);
    assert_eq!(next_json(&mut session).await["ExceptionName"], "CartEmpty");
    assert_eq!(cache.count("PaymentFailed"), 0, "failed enrichment must not be cached");
}

// ===========================================================================
// Ordering across many events and several clients
// ===========================================================================
#[tokio::test]
async fn test_every_client_sees_events_in_stream_order() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "inference_output": "summary"
        })))
        .mount(&mock_server)
        .await;

    let hub = Arc::new(BroadcastHub::new("s3cret"));
    let mut a = hub.register();
    let mut b = hub.register();
    let gone = hub.register();
    drop(gone.outbound);

    let lines: Vec<String> = (0..20)
        .map(|i| format!("t{}|Kind{}|F.java|m|{}", i, i % 3, i))
        .collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();

    let stats = relay(
        &refs,
        Arc::new(MemorySummaryCache::new()),
        enrichment_for(&mock_server).await,
        hub.clone(),
    )
    .await;
    assert_eq!(stats.broadcast, 20);
    assert_eq!(hub.len(), 2, "closed connection must be dropped");

    for session in [&mut a, &mut b] {
        for i in 0..20 {
            let event = next_json(session).await;
            assert_eq!(event["ExceptionLine"], i.to_string());
        }
    }
}
