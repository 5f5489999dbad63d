//! Sync orchestration against remote peers
//!
//! [`EventSyncer`] drives the pull (fetch, filter, dedupe, store, log) and
//! send (select, format, transmit, log) workflows. It is the error
//! boundary: callers get structured results with success flags, never raw
//! errors; every operational failure is also written to the operation log.

mod pull;
mod send;

use std::time::Duration;

use crate::config::SyncConfig;
use crate::error::Result;
use crate::filter::EventFilter;
use crate::processor::EventProcessor;
use crate::storage::log::{self, Operation, OperationStatus};
use crate::storage::{events, Storage};
use crate::types::SyncStatusReport;

/// Header carrying the peer key on send/receive requests
pub const SYNC_KEY_HEADER: &str = "X-Sync-Key";

/// Fixed timeout for pull and send network calls
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives pull and send workflows against remote peers
pub struct EventSyncer {
    storage: Storage,
    config: SyncConfig,
    processor: EventProcessor,
    client: reqwest::Client,
}

impl EventSyncer {
    /// Create a syncer with explicit storage and configuration
    pub fn new(storage: Storage, config: SyncConfig) -> Result<Self> {
        let filter = EventFilter::new(
            config.include_events.clone(),
            config.exclude_events.clone(),
        );
        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            storage,
            config,
            processor: EventProcessor::new(filter),
            client,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn processor(&self) -> &EventProcessor {
        &self.processor
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Summary of sync state: last pull, totals, pending replay
    pub fn status(&self) -> Result<SyncStatusReport> {
        self.storage.with_connection(|conn| {
            let last_pull = log::last_successful(conn, Operation::Pull)?.map(|entry| {
                crate::types::LastPull {
                    timestamp: entry.created_at,
                    events_count: entry.events_count,
                }
            });

            Ok(SyncStatusReport {
                last_pull,
                total_synced: events::count_events(conn)?,
                total_replayed: events::count_replayed(conn)?,
                pending_replay: events::count_pending_replay(conn)?,
            })
        })
    }

    /// Write an operation log entry, swallowing (but tracing) log failures.
    ///
    /// The log is diagnostics; a log write failure must not turn a finished
    /// operation into an error.
    pub(crate) fn record(
        &self,
        operation: Operation,
        status: OperationStatus,
        events_count: i64,
        details: Option<serde_json::Value>,
    ) {
        let result = self.storage.with_connection(|conn| {
            log::log_operation(conn, operation, status, events_count, details.as_ref())
        });
        if let Err(e) = result {
            tracing::error!(
                operation = operation.as_str(),
                error = %e,
                "failed to write operation log entry"
            );
        }
    }
}
