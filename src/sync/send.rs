//! Send workflow: forward stored events to the configured destination

use serde_json::json;

use super::{EventSyncer, SYNC_KEY_HEADER};
use crate::storage::events::list_events;
use crate::storage::log::{Operation, OperationStatus};
use crate::types::{EventQuery, SendFilters, SendResult, SortOrder, SyncedEvent, WireEvent};

impl EventSyncer {
    /// Send stored events to the configured destination.
    ///
    /// Like pull, this never surfaces a raw error - the caller gets a
    /// structured result and the operation log gets the failure detail.
    pub async fn send(&self, filters: &SendFilters) -> SendResult {
        let Some(destination) = self.config().destination.clone() else {
            return SendResult::failure("Destination URL not configured");
        };
        let Some(key) = destination.credential.clone() else {
            return SendResult::failure("Destination key not configured");
        };

        let events = match self.select_outgoing(filters) {
            Ok(events) => events,
            Err(e) => {
                self.record(
                    Operation::Send,
                    OperationStatus::Error,
                    0,
                    Some(json!({ "exception": e.to_string() })),
                );
                return SendResult::failure(format!("Error selecting events: {}", e));
            }
        };

        if events.is_empty() {
            return SendResult {
                success: true,
                message: "No events to send".to_string(),
                events_count: 0,
                response: None,
            };
        }

        let wire: Vec<WireEvent> = events.iter().map(SyncedEvent::to_wire).collect();
        let payload = json!({
            "events": wire,
            "source_url": self.config().app_url,
            "source_name": self.config().app_name,
        });

        let url = format!("{}/api/events", destination.url.trim_end_matches('/'));
        tracing::info!(url = %url, count = wire.len(), "sending events to destination");

        let response = self
            .client()
            .post(&url)
            .header(SYNC_KEY_HEADER, &key)
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.record(
                    Operation::Send,
                    OperationStatus::Error,
                    0,
                    Some(json!({ "exception": e.to_string() })),
                );
                return SendResult::failure(format!("Error sending events: {}", e));
            }
        };

        let status = response.status();
        let body: Option<serde_json::Value> = response.json().await.ok();

        if !status.is_success() {
            self.record(
                Operation::Send,
                OperationStatus::Failed,
                0,
                Some(json!({ "error": body, "status": status.as_u16() })),
            );
            return SendResult::failure(format!("Failed to send events: {}", status.as_u16()));
        }

        self.record(
            Operation::Send,
            OperationStatus::Success,
            wire.len() as i64,
            Some(json!({ "response": body })),
        );

        SendResult {
            success: true,
            message: format!("Successfully sent {} events", wire.len()),
            events_count: wire.len(),
            response: body,
        }
    }

    /// Select up to `limit` stored events matching the filters, oldest first
    pub fn select_outgoing(&self, filters: &SendFilters) -> crate::error::Result<Vec<SyncedEvent>> {
        let query = EventQuery {
            event_types: filters.event_type.clone().map(|t| vec![t]),
            since: filters.since,
            replayed: None,
            limit: filters.limit,
            order: SortOrder::Asc,
        };
        self.storage().with_connection(|conn| list_events(conn, &query))
    }
}
