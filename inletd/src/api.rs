//! HTTP API for the Inlet daemon.
//!
//! Provides REST endpoints for:
//! - Webhook ingest (the front door of the pipeline)
//! - Health check
//! - Dead-letter inspection
//! - Event log reads (versions and records per entity)

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use inlet_buffer::{Buffer, BufferError};
use inlet_domain::{EntityId, Version};
use inlet_eventlog::{EventLog, EventLogError};
use inlet_gate::{DecisionCache, Gate};

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState {
    /// Authorization gate
    pub gate: Gate,
    /// Gateway-side decision cache
    pub decision_cache: DecisionCache,
    /// Ingestion buffer
    pub buffer: Arc<dyn Buffer>,
    /// Event log (read side)
    pub log: Arc<dyn EventLog>,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests
    pub status: String,
    /// Daemon version
    pub version: String,
}

/// Fixed acknowledgment body returned for every accepted webhook.
///
/// The sender only ever learns accepted / rejected / server error;
/// nothing about downstream processing leaks through this response.
pub const ACCEPTED_BODY: &str = "[accepted]";

/// Snapshot of the dead-letter buffer.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeadLettersResponse {
    /// Number of isolated messages
    pub count: usize,
    /// The isolated messages, oldest first
    pub dead_letters: Vec<DeadLetterSummary>,
}

/// One isolated message.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeadLetterSummary {
    /// Original message id
    pub message_id: Uuid,
    /// Why the message was isolated
    pub reason: String,
    /// Deliveries attempted before isolation
    pub receive_count: u32,
    /// When the message was isolated
    pub dead_lettered_at: DateTime<Utc>,
    /// The payload, lossily decoded for inspection
    pub payload: String,
}

/// Committed versions for one entity.
#[derive(Debug, Serialize, Deserialize)]
pub struct VersionsResponse {
    /// The entity queried
    pub entity_id: String,
    /// Committed versions, ascending
    pub versions: Vec<u64>,
}

/// One committed event log record.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponse {
    /// Partition key
    pub entity_id: String,
    /// Sort key
    pub version: u64,
    /// The event payload body
    pub payload: serde_json::Value,
    /// When the conditional write committed
    pub written_at: DateTime<Utc>,
    /// Optional retention expiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error description
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", post(ingest_handler))
        .route("/health", get(health_handler))
        .route("/dead-letters", get(dead_letters_handler))
        .route("/entities/:entity_id/versions", get(versions_handler))
        .route(
            "/entities/:entity_id/records/:version",
            get(record_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Ingest a webhook payload.
///
/// The credential is authorized (through the decision cache), the raw
/// body is buffered untouched, and `202 Accepted` acknowledges the
/// hand-off. Processing is entirely asynchronous from the sender's
/// point of view.
async fn ingest_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), ApiError> {
    let credential = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !authorize_cached(&state, credential).is_authorized {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Unauthorized".to_string(),
            }),
        ));
    }

    let message_id = state
        .buffer
        .enqueue(body.to_vec())
        .await
        .map_err(buffer_error_response)?;

    debug!(%message_id, bytes = body.len(), "Webhook accepted");

    Ok((StatusCode::ACCEPTED, ACCEPTED_BODY))
}

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List isolated messages.
async fn dead_letters_handler(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<DeadLettersResponse>, ApiError> {
    let dead = state
        .buffer
        .dead_letters()
        .await
        .map_err(buffer_error_response)?;

    let summaries: Vec<DeadLetterSummary> = dead
        .into_iter()
        .map(|entry| DeadLetterSummary {
            message_id: entry.message_id.as_uuid(),
            reason: entry.reason,
            receive_count: entry.receive_count,
            dead_lettered_at: entry.dead_lettered_at,
            payload: String::from_utf8_lossy(&entry.payload).into_owned(),
        })
        .collect();

    Ok(Json(DeadLettersResponse {
        count: summaries.len(),
        dead_letters: summaries,
    }))
}

/// List committed versions for an entity.
async fn versions_handler(
    State(state): State<Arc<ApiState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<VersionsResponse>, ApiError> {
    let entity_id = parse_entity_id(&entity_id)?;
    let versions = state
        .log
        .list_versions(&entity_id)
        .await
        .map_err(log_error_response)?;

    Ok(Json(VersionsResponse {
        entity_id: entity_id.as_str().to_string(),
        versions: versions.into_iter().map(|v| v.get()).collect(),
    }))
}

/// Read one committed record.
async fn record_handler(
    State(state): State<Arc<ApiState>>,
    Path((entity_id, version)): Path<(String, u64)>,
) -> Result<Json<RecordResponse>, ApiError> {
    let entity_id = parse_entity_id(&entity_id)?;
    let version = Version::new(version).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    let record = state
        .log
        .read(&entity_id, version)
        .await
        .map_err(log_error_response)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("No record at ({}, {})", entity_id, version),
                }),
            )
        })?;

    Ok(Json(RecordResponse {
        entity_id: record.entity_id.as_str().to_string(),
        version: record.version.get(),
        payload: record.payload,
        written_at: record.written_at,
        expires_at: record.expires_at,
    }))
}

// =============================================================================
// Helpers
// =============================================================================

/// Authorize a credential through the decision cache.
///
/// A present credential's decision is memoized for the configured TTL;
/// an absent credential is evaluated directly (it always denies and
/// there is nothing to key the cache on).
fn authorize_cached(state: &ApiState, credential: Option<&str>) -> inlet_gate::AuthDecision {
    let Some(credential) = credential else {
        return state.gate.authorize(None);
    };

    if let Some(cached) = state.decision_cache.get(credential) {
        return cached;
    }

    let decision = state.gate.authorize(Some(credential));
    state.decision_cache.insert(credential, decision);
    decision
}

fn parse_entity_id(raw: &str) -> Result<EntityId, ApiError> {
    EntityId::new(raw).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })
}

fn buffer_error_response(error: BufferError) -> ApiError {
    let status = match &error {
        // Backpressure: the sender retries later.
        BufferError::Capacity { .. } | BufferError::Unavailable(_) => {
            warn!(error = %error, "Ingest shed to backpressure");
            StatusCode::SERVICE_UNAVAILABLE
        }
        BufferError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn log_error_response(error: EventLogError) -> ApiError {
    let status = if error.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// =============================================================================
// Tests
// =============================================================================
