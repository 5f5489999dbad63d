//! Replay engine: re-invoking handlers for stored events
//!
//! Reads stored-but-not-yet-replayed records, dispatches each through the
//! handler registry, commits the runtime's unit of work, and only then
//! marks records replayed. Per-record state machine: `replayed_at = NULL`
//! to `replayed_at = ts`, terminal.

pub mod registry;

pub use registry::{ApplyFn, HandlerRegistry};

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::error::Result;
use crate::storage::events::{list_events, mark_replayed};
use crate::storage::log::{log_operation, Operation, OperationStatus};
use crate::storage::Storage;
use crate::types::{
    EventQuery, ReplayCandidate, ReplayError, ReplayFilters, ReplayReport, SortOrder,
};

/// Unit-of-work boundary of the external event-sourcing runtime.
///
/// Handlers apply effects as they run; `commit` flushes the accumulated
/// batch. Injected explicitly - the engine never reaches into ambient
/// application state.
pub trait ReplayRuntime {
    fn commit(&mut self) -> Result<()>;
}

/// Runtime for handlers whose effects are durable as they execute
#[derive(Debug, Default)]
pub struct NoopRuntime;

impl ReplayRuntime for NoopRuntime {
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Batched replay of stored events against a local runtime
pub struct ReplayEngine<R: ReplayRuntime> {
    storage: Storage,
    registry: HandlerRegistry,
    runtime: R,
}

impl<R: ReplayRuntime> ReplayEngine<R> {
    pub fn new(storage: Storage, registry: HandlerRegistry, runtime: R) -> Self {
        Self {
            storage,
            registry,
            runtime,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Replay one batch of pending records.
    ///
    /// Unknown event types are skipped with a warning; a failing handler
    /// counts as an error and the batch continues. Records are marked
    /// replayed only after the runtime commit succeeds, so a failed commit
    /// leaves the whole batch selectable for retry.
    pub fn replay_batch(&mut self, filters: &ReplayFilters) -> ReplayReport {
        self.run_batch(filters).0
    }

    /// Replay batches until no pending records remain.
    ///
    /// Advances the `since` cursor past each batch; a dry run never loops.
    /// Stops early if a batch fails outright (commit or storage fault).
    pub fn replay_until_exhausted(&mut self, filters: &ReplayFilters) -> ReplayReport {
        let mut cursor = filters.clone();
        let mut total = ReplayReport {
            success: true,
            ..Default::default()
        };

        loop {
            let (report, last_created) = self.run_batch(&cursor);
            let batch_was_empty = report.processed == 0
                && report.skipped == 0
                && report.errors.is_empty()
                && report.candidates.is_none();

            total.processed += report.processed;
            total.skipped += report.skipped;
            total.errors.extend(report.errors);
            if report.candidates.is_some() {
                total.candidates = report.candidates;
            }

            if !report.success {
                total.success = false;
                total.message = report.message;
                return total;
            }

            if filters.dry_run || batch_was_empty {
                break;
            }

            match last_created {
                Some(ts) => cursor.since = Some(ts),
                None => break,
            }
        }

        total.message = format!(
            "Replay completed: {} processed, {} skipped, {} errors",
            total.processed,
            total.skipped,
            total.errors.len()
        );
        total
    }

    /// Run one batch; also returns the last candidate's creation time so
    /// the continue loop can advance its cursor.
    fn run_batch(&mut self, filters: &ReplayFilters) -> (ReplayReport, Option<DateTime<Utc>>) {
        let query = EventQuery {
            event_types: filters.event_types.clone(),
            since: filters.since,
            replayed: Some(false),
            limit: filters.limit,
            order: SortOrder::Asc,
        };

        let records = match self.storage.with_connection(|conn| list_events(conn, &query)) {
            Ok(records) => records,
            Err(e) => {
                return (
                    ReplayReport {
                        success: false,
                        message: format!("Error loading events to replay: {}", e),
                        ..Default::default()
                    },
                    None,
                );
            }
        };

        if records.is_empty() {
            return (
                ReplayReport {
                    success: true,
                    message: "No events found to replay".to_string(),
                    ..Default::default()
                },
                None,
            );
        }

        let last_created = records.last().map(|r| r.created_at);

        if filters.dry_run {
            let candidates: Vec<ReplayCandidate> = records
                .iter()
                .map(|r| ReplayCandidate {
                    event_id: r.event_id.clone(),
                    event_type: r.event_type.clone(),
                    created_at: r.created_at,
                })
                .collect();
            return (
                ReplayReport {
                    success: true,
                    message: format!("Dry run: {} events would be replayed", candidates.len()),
                    candidates: Some(candidates),
                    ..Default::default()
                },
                last_created,
            );
        }

        let mut skipped = 0;
        let mut errors: Vec<ReplayError> = Vec::new();
        let mut invoked: Vec<i64> = Vec::new();

        for record in &records {
            let Some(apply) = self.registry.resolve(&record.event_type) else {
                tracing::warn!(
                    event_id = %record.event_id,
                    event_type = %record.event_type,
                    "no handler registered for event type, skipping"
                );
                skipped += 1;
                continue;
            };

            match apply(&record.event_data) {
                Ok(()) => invoked.push(record.id),
                Err(e) => {
                    tracing::error!(
                        event_id = %record.event_id,
                        event_type = %record.event_type,
                        error = %e,
                        "error replaying event"
                    );
                    errors.push(ReplayError {
                        event_id: record.event_id.clone(),
                        event_type: record.event_type.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // Flush the runtime's unit of work before touching replay state
        if let Err(e) = self.runtime.commit() {
            self.log_batch(OperationStatus::Error, 0, &json!({"exception": e.to_string()}));
            return (
                ReplayReport {
                    success: false,
                    message: format!("Error committing replayed events: {}", e),
                    skipped,
                    errors,
                    ..Default::default()
                },
                last_created,
            );
        }

        let processed = match self
            .storage
            .with_transaction(|conn| mark_replayed(conn, &invoked, Utc::now()))
        {
            Ok(n) => n,
            Err(e) => {
                self.log_batch(OperationStatus::Error, 0, &json!({"exception": e.to_string()}));
                return (
                    ReplayReport {
                        success: false,
                        message: format!("Error marking events replayed: {}", e),
                        skipped,
                        errors,
                        ..Default::default()
                    },
                    last_created,
                );
            }
        };

        self.log_batch(
            OperationStatus::Success,
            processed as i64,
            &json!({
                "processed": processed,
                "skipped": skipped,
                "errors": errors.len(),
            }),
        );

        (
            ReplayReport {
                success: true,
                message: format!(
                    "Replayed {} events ({} skipped, {} errors)",
                    processed,
                    skipped,
                    errors.len()
                ),
                processed,
                skipped,
                errors,
                candidates: None,
            },
            last_created,
        )
    }

    fn log_batch(&self, status: OperationStatus, count: i64, details: &serde_json::Value) {
        let result = self.storage.with_connection(|conn| {
            log_operation(conn, Operation::Replay, status, count, Some(details))
        });
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to write replay log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::events::{find_event, store_event};
    use crate::storage::log::{query_log, LogFilter};
    use crate::types::{NewSyncEvent, SyncMetadata};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Deserialize)]
    struct UserCreated {
        #[allow(dead_code)]
        name: String,
    }

    struct MockRuntime {
        commits: usize,
        fail: bool,
    }

    impl ReplayRuntime for MockRuntime {
        fn commit(&mut self) -> Result<()> {
            if self.fail {
                return Err(crate::error::SyncError::Replay("commit refused".into()));
            }
            self.commits += 1;
            Ok(())
        }
    }

    fn seed(storage: &Storage, event_id: &str, event_type: &str, data: serde_json::Value) {
        let now = Utc::now();
        let record = NewSyncEvent {
            event_id: event_id.to_string(),
            source_url: None,
            event_type: event_type.to_string(),
            event_data: data,
            sync_metadata: SyncMetadata {
                synced: true,
                source_url: None,
                source_name: None,
                original_id: event_id.to_string(),
                original_created_at: now,
                pulled_at: now,
            },
            synced_at: now,
        };
        storage
            .with_connection(|conn| store_event(conn, &record))
            .unwrap();
    }

    fn engine_with(
        storage: &Storage,
        fail_commit: bool,
    ) -> (ReplayEngine<MockRuntime>, Arc<AtomicUsize>) {
        let applied = Arc::new(AtomicUsize::new(0));
        let counter = applied.clone();

        let mut registry = HandlerRegistry::new();
        registry.register("user.created", move |_: UserCreated| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let runtime = MockRuntime {
            commits: 0,
            fail: fail_commit,
        };
        (
            ReplayEngine::new(storage.clone(), registry, runtime),
            applied,
        )
    }

    #[test]
    fn test_replay_marks_records() {
        let storage = Storage::open_in_memory().unwrap();
        seed(&storage, "1", "user.created", json!({"name": "A"}));
        seed(&storage, "2", "user.created", json!({"name": "B"}));

        let (mut engine, applied) = engine_with(&storage, false);
        let report = engine.replay_batch(&ReplayFilters::default());

        assert!(report.success);
        assert_eq!(report.processed, 2);
        assert_eq!(applied.load(Ordering::SeqCst), 2);

        let event = storage
            .with_connection(|conn| find_event(conn, "1", None))
            .unwrap()
            .unwrap();
        assert!(event.replayed_at.is_some());
    }

    #[test]
    fn test_replayed_records_not_selected_again() {
        let storage = Storage::open_in_memory().unwrap();
        seed(&storage, "1", "user.created", json!({"name": "A"}));

        let (mut engine, applied) = engine_with(&storage, false);
        let first = engine.replay_batch(&ReplayFilters::default());
        assert_eq!(first.processed, 1);

        let second = engine.replay_batch(&ReplayFilters::default());
        assert_eq!(second.processed, 0);
        assert_eq!(applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_type_skipped_not_fatal() {
        let storage = Storage::open_in_memory().unwrap();
        seed(&storage, "1", "ghost.event", json!({}));
        seed(&storage, "2", "user.created", json!({"name": "A"}));

        let (mut engine, _) = engine_with(&storage, false);
        let report = engine.replay_batch(&ReplayFilters::default());

        assert!(report.success);
        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.errors.is_empty());

        // Unknown-type record stays pending
        let event = storage
            .with_connection(|conn| find_event(conn, "1", None))
            .unwrap()
            .unwrap();
        assert!(event.replayed_at.is_none());
    }

    #[test]
    fn test_handler_failure_isolated() {
        let storage = Storage::open_in_memory().unwrap();
        seed(&storage, "1", "flaky.event", json!({}));
        seed(&storage, "2", "user.created", json!({"name": "A"}));

        let (mut engine, _) = engine_with(&storage, false);
        engine
            .registry
            .register_raw("flaky.event", Box::new(|_| {
                Err(crate::error::SyncError::Replay("boom".into()))
            }));

        let report = engine.replay_batch(&ReplayFilters::default());
        assert!(report.success);
        assert_eq!(report.processed, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].event_id, "1");

        // Failed record stays pending for a later retry
        let event = storage
            .with_connection(|conn| find_event(conn, "1", None))
            .unwrap()
            .unwrap();
        assert!(event.replayed_at.is_none());
    }

    #[test]
    fn test_commit_failure_marks_nothing() {
        let storage = Storage::open_in_memory().unwrap();
        seed(&storage, "1", "user.created", json!({"name": "A"}));

        let (mut engine, applied) = engine_with(&storage, true);
        let report = engine.replay_batch(&ReplayFilters::default());

        assert!(!report.success);
        assert_eq!(report.processed, 0);
        // Handler ran, but nothing was marked - the batch is retryable
        assert_eq!(applied.load(Ordering::SeqCst), 1);

        let event = storage
            .with_connection(|conn| find_event(conn, "1", None))
            .unwrap()
            .unwrap();
        assert!(event.replayed_at.is_none());
    }

    #[test]
    fn test_dry_run_reports_without_marking() {
        let storage = Storage::open_in_memory().unwrap();
        seed(&storage, "1", "user.created", json!({"name": "A"}));

        let (mut engine, applied) = engine_with(&storage, false);
        let report = engine.replay_batch(&ReplayFilters {
            dry_run: true,
            ..Default::default()
        });

        assert!(report.success);
        assert_eq!(report.processed, 0);
        assert_eq!(report.candidates.as_ref().unwrap().len(), 1);
        assert_eq!(applied.load(Ordering::SeqCst), 0);

        let event = storage
            .with_connection(|conn| find_event(conn, "1", None))
            .unwrap()
            .unwrap();
        assert!(event.replayed_at.is_none());
    }

    #[test]
    fn test_continue_until_exhausted() {
        let storage = Storage::open_in_memory().unwrap();
        for i in 0..5 {
            seed(&storage, &i.to_string(), "user.created", json!({"name": "A"}));
        }

        let (mut engine, applied) = engine_with(&storage, false);
        let report = engine.replay_until_exhausted(&ReplayFilters {
            limit: 2,
            ..Default::default()
        });

        assert!(report.success);
        assert_eq!(report.processed, 5);
        assert_eq!(applied.load(Ordering::SeqCst), 5);

        // One replay log entry per non-empty batch
        let entries = storage
            .with_connection(|conn| {
                query_log(
                    conn,
                    &LogFilter {
                        operation: Some(Operation::Replay),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        assert!(entries.len() >= 3);
    }
}
