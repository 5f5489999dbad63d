//! Validation and normalization of inbound raw events
//!
//! Turns a [`RawEvent`] into a storable [`NewSyncEvent`]: validates the
//! type, applies the include/exclude filter, assigns a stable identifier,
//! and builds provenance metadata. Persistence is the record store's job,
//! not the processor's.

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::error::SyncError;
use crate::filter::EventFilter;
use crate::types::{NewSyncEvent, RawEvent, SyncMetadata};

/// Per-event processing outcome signals
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The raw event carried no type - a hard per-event error
    #[error("event type is required")]
    MissingType,

    /// The configured filter rejected the type - a skip, not a failure
    #[error("event type {0} is excluded by configuration")]
    Filtered(String),
}

impl From<ProcessError> for SyncError {
    fn from(e: ProcessError) -> Self {
        SyncError::InvalidInput(e.to_string())
    }
}

/// Validates raw events and builds storable records
#[derive(Debug, Clone, Default)]
pub struct EventProcessor {
    filter: EventFilter,
}

impl EventProcessor {
    pub fn new(filter: EventFilter) -> Self {
        Self { filter }
    }

    /// Process one raw event into a storable record.
    ///
    /// `Filtered` is a control signal the caller counts as skipped;
    /// `MissingType` counts as an error. Neither aborts a batch.
    pub fn process(
        &self,
        raw: &RawEvent,
        source_url: Option<&str>,
        source_name: Option<&str>,
    ) -> Result<NewSyncEvent, ProcessError> {
        let event_type = match raw.event_type.as_deref() {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => return Err(ProcessError::MissingType),
        };

        if !self.filter.should_include(&event_type) {
            tracing::debug!(event_type = %event_type, "skipping event excluded by configuration");
            return Err(ProcessError::Filtered(event_type));
        }

        let now = Utc::now();
        let event_id = raw
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let sync_metadata = SyncMetadata {
            synced: true,
            source_url: source_url.map(String::from),
            source_name: source_name.map(String::from),
            original_id: event_id.clone(),
            original_created_at: raw.created_at.unwrap_or(now),
            pulled_at: now,
        };

        Ok(NewSyncEvent {
            event_id,
            source_url: source_url.map(String::from),
            event_type,
            event_data: raw.data.clone(),
            sync_metadata,
            synced_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(id: Option<&str>, event_type: Option<&str>) -> RawEvent {
        RawEvent {
            id: id.map(String::from),
            event_type: event_type.map(String::from),
            data: json!({"name": "Test User"}),
            created_at: None,
        }
    }

    #[test]
    fn test_process_success() {
        let processor = EventProcessor::default();
        let record = processor
            .process(&raw(Some("123-abc"), Some("user.created")), Some("https://peer"), None)
            .unwrap();

        assert_eq!(record.event_id, "123-abc");
        assert_eq!(record.event_type, "user.created");
        assert_eq!(record.source_url.as_deref(), Some("https://peer"));
        assert!(record.sync_metadata.synced);
        assert_eq!(record.sync_metadata.original_id, "123-abc");
    }

    #[test]
    fn test_missing_type_is_error() {
        let processor = EventProcessor::default();
        let err = processor.process(&raw(Some("1"), None), None, None).unwrap_err();
        assert!(matches!(err, ProcessError::MissingType));

        let err = processor.process(&raw(Some("1"), Some("")), None, None).unwrap_err();
        assert!(matches!(err, ProcessError::MissingType));
    }

    #[test]
    fn test_filtered_type_is_skip_signal() {
        let filter = EventFilter::new(vec!["user.created".to_string()], vec![]);
        let processor = EventProcessor::new(filter);
        let err = processor
            .process(&raw(Some("1"), Some("post.created")), None, None)
            .unwrap_err();
        assert!(matches!(err, ProcessError::Filtered(t) if t == "post.created"));
    }

    #[test]
    fn test_generates_id_when_absent() {
        let processor = EventProcessor::default();
        let record = processor
            .process(&raw(None, Some("user.created")), None, None)
            .unwrap();
        assert!(!record.event_id.is_empty());
        // Generated ids are valid UUIDs
        assert!(uuid::Uuid::parse_str(&record.event_id).is_ok());
    }

    #[test]
    fn test_original_created_at_defaults_to_now() {
        let processor = EventProcessor::default();
        let before = Utc::now();
        let record = processor
            .process(&raw(Some("1"), Some("user.created")), None, None)
            .unwrap();
        assert!(record.sync_metadata.original_created_at >= before);
    }
}
