//! Pull workflow: fetch events from the source and store them locally

use rusqlite::Connection;
use serde_json::json;

use super::EventSyncer;
use crate::config::Endpoint;
use crate::error::{Result, SyncError};
use crate::processor::ProcessError;
use crate::storage::events::{event_exists, store_event, StoreOutcome};
use crate::storage::log::{Operation, OperationStatus};
use crate::types::{BatchOutcome, EventEnvelope, PullFilters, PullResult, RawEvent};

impl EventSyncer {
    /// Pull events from the configured source.
    ///
    /// Never returns a raw error: transport and remote failures are logged
    /// and folded into a non-success [`PullResult`]. With `dry_run` set the
    /// candidate events are returned and nothing is written - no records,
    /// no log entry.
    pub async fn pull(&self, filters: &PullFilters) -> PullResult {
        let Some(source) = self.config().source.clone() else {
            return PullResult::failure("Source URL not configured");
        };

        let events = match self.fetch_events(&source, filters).await {
            Ok(events) => events,
            Err(SyncError::Remote { status, body }) => {
                self.record(
                    Operation::Pull,
                    OperationStatus::Failed,
                    0,
                    Some(json!({ "error": body, "status": status })),
                );
                return PullResult::failure(format!("Failed to pull events: {}", status));
            }
            Err(e) => {
                self.record(
                    Operation::Pull,
                    OperationStatus::Error,
                    0,
                    Some(json!({ "exception": e.to_string() })),
                );
                return PullResult::failure(format!("Error pulling events: {}", e));
            }
        };

        if events.is_empty() {
            return PullResult {
                success: true,
                message: "No new events to pull".to_string(),
                events_count: 0,
                details: None,
                events: None,
            };
        }

        if filters.dry_run {
            return PullResult {
                success: true,
                message: format!("Dry run: {} events would be synced", events.len()),
                events_count: events.len(),
                details: None,
                events: Some(events),
            };
        }

        self.apply_pull(&events, Some(&source.url))
    }

    /// Issue the authenticated GET against the source's events endpoint
    async fn fetch_events(&self, source: &Endpoint, filters: &PullFilters) -> Result<Vec<RawEvent>> {
        let url = format!("{}/api/events", source.url.trim_end_matches('/'));

        let mut request = self.client().get(&url);
        if let Some(ref token) = source.credential {
            request = request.bearer_auth(token);
        }

        let mut query: Vec<(&str, String)> = vec![("limit", filters.limit.to_string())];
        if let Some(since) = filters.since {
            query.push(("since", since.to_rfc3339()));
        }
        if let Some(ref types) = filters.event_types {
            if !types.is_empty() {
                query.push(("event_type", types.join(",")));
            }
        }

        tracing::info!(url = %url, "pulling events from source");
        let response = request.query(&query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: EventEnvelope = response.json().await?;
        Ok(envelope.into_events())
    }

    /// Store a fetched batch and write its operation log entry.
    ///
    /// Split from the network fetch so the storage semantics are testable
    /// without a live peer.
    pub fn apply_pull(&self, events: &[RawEvent], source_url: Option<&str>) -> PullResult {
        let outcome = match self.storage().with_connection(|conn| {
            Ok(self.process_incoming(conn, events, source_url, None))
        }) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record(
                    Operation::Pull,
                    OperationStatus::Error,
                    0,
                    Some(json!({ "exception": e.to_string() })),
                );
                return PullResult::failure(format!("Error storing events: {}", e));
            }
        };

        // A batch that stored nothing and only errored made no progress
        let success = outcome.processed > 0 || outcome.errors.is_empty();
        let status = if success {
            OperationStatus::Success
        } else {
            OperationStatus::Failed
        };

        self.record(
            Operation::Pull,
            status,
            events.len() as i64,
            Some(json!({
                "processed": outcome.processed,
                "skipped": outcome.skipped,
                "errors": outcome.errors,
                "by_type": outcome.by_type,
            })),
        );

        let message = if success {
            format!(
                "Successfully pulled and processed {} events",
                events.len()
            )
        } else {
            format!("Pulled {} events but none could be stored", events.len())
        };

        PullResult {
            success,
            message,
            events_count: events.len(),
            details: Some(outcome),
            events: None,
        }
    }

    /// Process a batch of raw events in order.
    ///
    /// Filtered types and already-synced dedup keys count as skipped;
    /// malformed events and storage faults count as errors. One bad event
    /// never aborts the batch.
    pub(crate) fn process_incoming(
        &self,
        conn: &Connection,
        events: &[RawEvent],
        source_url: Option<&str>,
        source_name: Option<&str>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for raw in events {
            let record = match self.processor().process(raw, source_url, source_name) {
                Ok(record) => record,
                Err(ProcessError::Filtered(_)) => {
                    outcome.skipped += 1;
                    continue;
                }
                Err(e) => {
                    outcome.errors.push(crate::types::EventError {
                        event_id: raw.id.clone().unwrap_or_else(|| "unknown".to_string()),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            // Pre-check is advisory; the unique index settles insert races
            if event_exists(conn, &record.event_id, record.source_url.as_deref())
                .unwrap_or(false)
            {
                outcome.skipped += 1;
                continue;
            }

            match store_event(conn, &record) {
                Ok(StoreOutcome::Inserted(_)) => {
                    outcome.processed += 1;
                    *outcome.by_type.entry(record.event_type).or_insert(0) += 1;
                }
                Ok(StoreOutcome::AlreadySynced) => {
                    outcome.skipped += 1;
                }
                Err(e) => {
                    tracing::error!(
                        event_id = %record.event_id,
                        error = %e,
                        "error storing synced event"
                    );
                    outcome.errors.push(crate::types::EventError {
                        event_id: record.event_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        outcome
    }
}
