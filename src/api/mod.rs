//! HTTP surface: events endpoints and status
//!
//! Serves the pull direction (`GET /api/events`), the receive direction
//! (`POST /api/events`), and a liveness/status endpoint. Authentication is
//! simple key gating: bearer token for reads, `X-Sync-Key` for writes.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::parse_type_list;
use crate::storage::events::{list_events, store_event, StoreOutcome};
use crate::storage::log::{log_operation, Operation, OperationStatus};
use crate::sync::{EventSyncer, SYNC_KEY_HEADER};
use crate::types::{EventQuery, RawEvent, SortOrder, SyncedEvent, WireEvent};
use crate::VERSION;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub syncer: Arc<EventSyncer>,
}

/// Build the application router
pub fn router(syncer: Arc<EventSyncer>) -> Router {
    Router::new()
        .route("/api/events", get(get_events).post(receive_events))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ApiState { syncer })
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub since: Option<String>,
    pub event_type: Option<String>,
    pub limit: Option<i64>,
}

/// Per-event outcome reported to a pushing peer
#[derive(Debug, Serialize)]
pub struct ReceiveOutcome {
    pub event_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveRequest {
    #[serde(default)]
    pub events: Vec<RawEvent>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
}

/// GET /api/events - serve stored events to a pulling peer
pub async fn get_events(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<EventsQuery>,
) -> (StatusCode, Json<serde_json::Value>) {
    if !bearer_authorized(&headers, state.syncer.config().api_key.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        );
    }

    let query = EventQuery {
        event_types: params.event_type.as_deref().map(parse_type_list),
        since: params.since.as_deref().and_then(|s| {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .ok()
        }),
        replayed: None,
        limit: params.limit.unwrap_or(10),
        order: SortOrder::Desc,
    };

    let events = match state
        .syncer
        .storage()
        .with_connection(|conn| list_events(conn, &query))
    {
        Ok(events) => events,
        Err(e) => {
            tracing::error!(error = %e, "error listing events for peer");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    let wire: Vec<WireEvent> = events.iter().map(SyncedEvent::to_wire).collect();
    let config = state.syncer.config();

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "count": wire.len(),
            "events": wire,
            "source_url": config.app_url,
            "source_name": config.app_name,
        })),
    )
}

/// POST /api/events - accept a batch pushed by a peer.
///
/// Responds with a per-event outcome; duplicates and filtered types are
/// reported as skipped rather than errors so idempotent re-delivery stays
/// clean. One `store_event` log entry covers the batch.
pub async fn receive_events(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<ReceiveRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let presented = headers
        .get(SYNC_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if !key_authorized(presented, state.syncer.config().api_key.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        );
    }

    if request.events.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "No events provided" })),
        );
    }

    let source_url = request.source_url.as_deref();
    let source_name = request.source_name.as_deref();
    let syncer = &state.syncer;

    let mut results: Vec<ReceiveOutcome> = Vec::with_capacity(request.events.len());
    let mut processed: i64 = 0;

    for raw in &request.events {
        let event_id = raw.id.clone().unwrap_or_else(|| "unknown".to_string());

        let record = match syncer.processor().process(raw, source_url, source_name) {
            Ok(record) => record,
            Err(crate::processor::ProcessError::Filtered(t)) => {
                results.push(ReceiveOutcome {
                    event_id,
                    status: "skipped",
                    message: Some(format!("event type {} is excluded by configuration", t)),
                });
                continue;
            }
            Err(e) => {
                results.push(ReceiveOutcome {
                    event_id,
                    status: "error",
                    message: Some(e.to_string()),
                });
                continue;
            }
        };

        let stored = syncer
            .storage()
            .with_connection(|conn| store_event(conn, &record));

        match stored {
            Ok(StoreOutcome::Inserted(_)) => {
                processed += 1;
                results.push(ReceiveOutcome {
                    event_id: record.event_id,
                    status: "processed",
                    message: None,
                });
            }
            Ok(StoreOutcome::AlreadySynced) => {
                results.push(ReceiveOutcome {
                    event_id: record.event_id,
                    status: "skipped",
                    message: Some("already synced".to_string()),
                });
            }
            Err(e) => {
                results.push(ReceiveOutcome {
                    event_id: record.event_id,
                    status: "error",
                    message: Some(e.to_string()),
                });
            }
        }
    }

    let log_result = syncer.storage().with_connection(|conn| {
        log_operation(
            conn,
            Operation::StoreEvent,
            OperationStatus::Success,
            processed,
            Some(&json!({
                "received": request.events.len(),
                "processed": processed,
                "source_url": source_url,
            })),
        )
    });
    if let Err(e) = log_result {
        tracing::error!(error = %e, "failed to log received batch");
    }

    (
        StatusCode::OK,
        Json(json!({ "success": true, "results": results })),
    )
}

/// GET /status - liveness and identity
pub async fn status(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let config = state.syncer.config();
    Json(json!({
        "status": "online",
        "version": VERSION,
        "app_name": config.app_name,
        "sync_type": config.sync_type,
    }))
}

/// Bearer token check for the read endpoint.
///
/// An unset api_key locks the endpoint rather than opening it.
fn bearer_authorized(headers: &HeaderMap, api_key: Option<&str>) -> bool {
    let Some(expected) = api_key else {
        return false;
    };
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", expected))
        .unwrap_or(false)
}

fn key_authorized(presented: Option<&str>, api_key: Option<&str>) -> bool {
    match (presented, api_key) {
        (Some(p), Some(k)) => p == k,
        _ => false,
    }
}
