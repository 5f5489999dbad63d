//! Core types for event synchronization

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An event as it arrives from a remote peer or the local origin.
///
/// Transient wire representation - never stored directly. The processor
/// validates it and turns it into a [`NewSyncEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Top-level payload shape returned by a source's events endpoint.
///
/// Peers have been observed to use either an `events` or a `data` key for
/// the event array; both are accepted as equivalent envelopes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub events: Option<Vec<RawEvent>>,
    #[serde(default)]
    pub data: Option<Vec<RawEvent>>,
}

impl EventEnvelope {
    /// Extract the event array, whichever key carried it
    pub fn into_events(self) -> Vec<RawEvent> {
        self.events.or(self.data).unwrap_or_default()
    }
}

/// Provenance metadata attached to every synced event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub synced: bool,
    pub source_url: Option<String>,
    pub source_name: Option<String>,
    pub original_id: String,
    pub original_created_at: DateTime<Utc>,
    pub pulled_at: DateTime<Utc>,
}

/// A processed event ready for insertion into the record store
#[derive(Debug, Clone)]
pub struct NewSyncEvent {
    pub event_id: String,
    pub source_url: Option<String>,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub sync_metadata: SyncMetadata,
    pub synced_at: DateTime<Utc>,
}

/// A stored synced event, hydrated from the record store.
///
/// Identity is the (event_id, source_url) pair; `replayed_at` is the only
/// field ever mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncedEvent {
    pub id: i64,
    pub event_id: String,
    pub source_url: Option<String>,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub sync_metadata: Option<SyncMetadata>,
    pub synced_at: DateTime<Utc>,
    pub replayed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncedEvent {
    /// Wire shape used when forwarding events to a destination peer
    pub fn to_wire(&self) -> WireEvent {
        WireEvent {
            id: self.event_id.clone(),
            event_type: self.event_type.clone(),
            data: self.event_data.clone(),
            created_at: self.created_at,
        }
    }
}

/// The `{id, type, data, created_at}` shape events travel in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Filters for a pull operation
#[derive(Debug, Clone)]
pub struct PullFilters {
    pub since: Option<DateTime<Utc>>,
    pub event_types: Option<Vec<String>>,
    pub limit: i64,
    pub dry_run: bool,
}

impl Default for PullFilters {
    fn default() -> Self {
        Self {
            since: None,
            event_types: None,
            limit: 100,
            dry_run: false,
        }
    }
}

/// Aggregated outcome of a pull operation
#[derive(Debug, Clone, Serialize)]
pub struct PullResult {
    pub success: bool,
    pub message: String,
    pub events_count: usize,
    /// Per-event counts; absent when the fetch itself failed or dry-run
    pub details: Option<BatchOutcome>,
    /// Candidate events, populated in dry-run mode only
    pub events: Option<Vec<RawEvent>>,
}

impl PullResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            events_count: 0,
            details: None,
            events: None,
        }
    }
}

/// Per-batch counters for pull and receive workflows
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub processed: usize,
    pub skipped: usize,
    pub errors: Vec<EventError>,
    /// Per-type breakdown of processed events
    pub by_type: HashMap<String, usize>,
}

/// A per-event failure recorded during batch processing
#[derive(Debug, Clone, Serialize)]
pub struct EventError {
    pub event_id: String,
    pub error: String,
}

/// Filters for a send operation
#[derive(Debug, Clone)]
pub struct SendFilters {
    pub event_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl Default for SendFilters {
    fn default() -> Self {
        Self {
            event_type: None,
            since: None,
            limit: 10,
        }
    }
}

/// Aggregated outcome of a send operation
#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    pub success: bool,
    pub message: String,
    pub events_count: usize,
    /// Destination response body, when one was received
    pub response: Option<serde_json::Value>,
}

impl SendResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            events_count: 0,
            response: None,
        }
    }
}

/// Filters for a replay batch
#[derive(Debug, Clone)]
pub struct ReplayFilters {
    pub since: Option<DateTime<Utc>>,
    pub event_types: Option<Vec<String>>,
    pub limit: i64,
    pub dry_run: bool,
}

impl Default for ReplayFilters {
    fn default() -> Self {
        Self {
            since: None,
            event_types: None,
            limit: 10,
            dry_run: false,
        }
    }
}

/// Outcome of one replay batch (or a continued run of batches)
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    pub success: bool,
    pub message: String,
    pub processed: usize,
    pub skipped: usize,
    pub errors: Vec<ReplayError>,
    /// Candidate records, populated in dry-run mode only
    pub candidates: Option<Vec<ReplayCandidate>>,
}

/// A record that a dry-run replay would process
#[derive(Debug, Clone, Serialize)]
pub struct ReplayCandidate {
    pub event_id: String,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
}

/// A per-record failure during replay
#[derive(Debug, Clone, Serialize)]
pub struct ReplayError {
    pub event_id: String,
    pub event_type: String,
    pub error: String,
}

/// Sort order for record store queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Selection criteria for querying the record store
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub event_types: Option<Vec<String>>,
    pub since: Option<DateTime<Utc>>,
    /// Some(true) = only replayed, Some(false) = only pending, None = all
    pub replayed: Option<bool>,
    pub limit: i64,
    pub order: SortOrder,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            event_types: None,
            since: None,
            replayed: None,
            limit: 100,
            order: SortOrder::Asc,
        }
    }
}

/// Summary of sync state for operators
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusReport {
    pub last_pull: Option<LastPull>,
    pub total_synced: i64,
    pub total_replayed: i64,
    pub pending_replay: i64,
}

/// Timestamp and size of the most recent successful pull
#[derive(Debug, Clone, Serialize)]
pub struct LastPull {
    pub timestamp: DateTime<Utc>,
    pub events_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_accepts_events_key() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "events": [{"id": "1", "type": "user.created", "data": {}}]
        }))
        .unwrap();
        let events = envelope.into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("user.created"));
    }

    #[test]
    fn test_envelope_accepts_data_key() {
        let envelope: EventEnvelope = serde_json::from_value(json!({
            "data": [{"id": "1", "type": "user.created", "data": {"k": 1}}]
        }))
        .unwrap();
        assert_eq!(envelope.into_events().len(), 1);
    }

    #[test]
    fn test_envelope_empty_body() {
        let envelope: EventEnvelope = serde_json::from_value(json!({})).unwrap();
        assert!(envelope.into_events().is_empty());
    }

    #[test]
    fn test_raw_event_tolerates_missing_fields() {
        let raw: RawEvent = serde_json::from_value(json!({"data": {"x": 1}})).unwrap();
        assert!(raw.id.is_none());
        assert!(raw.event_type.is_none());
        assert!(raw.created_at.is_none());
    }
}
