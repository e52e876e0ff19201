//! Integration tests for the ingest API surface.
//!
//! Each test binds the router on an OS-assigned port and talks to it
//! over HTTP, the same way a webhook sender would.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use inlet_buffer::{Buffer, MemoryBuffer, MemoryBufferConfig};
use inlet_domain::{EntityId, EventRecord, Version};
use inlet_eventlog::{EventLog, MemoryEventLog};
use inlet_gate::{DecisionCache, Gate};
use inletd::api::{
    create_router, ApiState, DeadLettersResponse, HealthResponse, RecordResponse,
    VersionsResponse, ACCEPTED_BODY,
};
use reqwest::StatusCode;
use serde_json::json;
use tokio::net::TcpListener;

struct TestApi {
    addr: SocketAddr,
    buffer: Arc<MemoryBuffer>,
    log: Arc<MemoryEventLog>,
    client: reqwest::Client,
}

impl TestApi {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn serve(gate: Gate, buffer_config: MemoryBufferConfig) -> TestApi {
    let buffer = Arc::new(MemoryBuffer::with_config(buffer_config));
    let log = Arc::new(MemoryEventLog::new());

    let state = Arc::new(ApiState {
        gate,
        decision_cache: DecisionCache::new(Duration::from_secs(60)),
        buffer: buffer.clone(),
        log: log.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApi {
        addr,
        buffer,
        log,
        client: reqwest::Client::new(),
    }
}

async fn serve_default() -> TestApi {
    serve(Gate::with_token("s3cret"), MemoryBufferConfig::default()).await
}

#[tokio::test]
async fn test_health_endpoint() {
    let api = serve_default().await;

    let response = api.client.get(api.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(health.status, "healthy");
}

#[tokio::test]
async fn test_ingest_accepts_authorized_webhook() {
    let api = serve_default().await;

    let response = api
        .client
        .post(api.url("/"))
        .header("Authorization", "Bearer s3cret")
        .body(json!({ "entity_id": "order-42", "version": 1 }).to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.text().await.unwrap(), ACCEPTED_BODY);

    // The payload is buffered, not yet processed.
    assert_eq!(api.buffer.depth().await.unwrap(), 1);
    assert_eq!(api.log.record_count(), 0);
}

#[tokio::test]
async fn test_ingest_rejects_missing_and_wrong_credentials() {
    let api = serve_default().await;

    let response = api
        .client
        .post(api.url("/"))
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = api
        .client
        .post(api.url("/"))
        .header("Authorization", "Bearer wrong")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Nothing reached the buffer.
    assert_eq!(api.buffer.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_ingest_sheds_to_503_at_capacity() {
    let api = serve(
        Gate::permissive(),
        MemoryBufferConfig {
            max_depth: 1,
            max_receive_count: 3,
        },
    )
    .await;

    let post = |body: &'static str| {
        api.client
            .post(api.url("/"))
            .header("Authorization", "anything")
            .body(body)
            .send()
    };

    assert_eq!(post("{}").await.unwrap().status(), StatusCode::ACCEPTED);
    assert_eq!(
        post("{}").await.unwrap().status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_dead_letters_endpoint_lists_isolated_payloads() {
    let api = serve_default().await;
    api.buffer
        .dead_letter(b"garbled".to_vec(), "Malformed event payload")
        .await
        .unwrap();

    let response = api
        .client
        .get(api.url("/dead-letters"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let dead: DeadLettersResponse = response.json().await.unwrap();
    assert_eq!(dead.count, 1);
    assert_eq!(dead.dead_letters[0].payload, "garbled");
    assert_eq!(dead.dead_letters[0].reason, "Malformed event payload");
}

#[tokio::test]
async fn test_entity_read_endpoints() {
    let api = serve_default().await;

    for version in 1..=2u64 {
        api.log
            .append_if_absent(EventRecord::new(
                EntityId::new("order-42").unwrap(),
                Version::new(version).unwrap(),
                json!({ "amount": 1999 }),
            ))
            .await
            .unwrap();
    }

    let response = api
        .client
        .get(api.url("/entities/order-42/versions"))
        .send()
        .await
        .unwrap();
    let versions: VersionsResponse = response.json().await.unwrap();
    assert_eq!(versions.entity_id, "order-42");
    assert_eq!(versions.versions, vec![1, 2]);

    let response = api
        .client
        .get(api.url("/entities/order-42/records/2"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record: RecordResponse = response.json().await.unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.payload, json!({ "amount": 1999 }));
}

#[tokio::test]
async fn test_missing_record_is_404_and_bad_version_is_400() {
    let api = serve_default().await;

    let response = api
        .client
        .get(api.url("/entities/order-42/records/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = api
        .client
        .get(api.url("/entities/order-42/records/0"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
