//! Append-only operation log
//!
//! One entry per orchestrated operation (pull, send, store batch, replay
//! batch) - never one per event. Used for observability and after-the-fact
//! diagnosis; entries are never updated or deleted.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kinds of logged operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Pull,
    Send,
    StoreEvent,
    Replay,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Pull => "pull",
            Operation::Send => "send",
            Operation::StoreEvent => "store_event",
            Operation::Replay => "replay",
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pull" => Ok(Operation::Pull),
            "send" => Ok(Operation::Send),
            "store_event" => Ok(Operation::StoreEvent),
            "replay" => Ok(Operation::Replay),
            _ => Err(format!("Unknown operation: {}", s)),
        }
    }
}

/// Outcome recorded for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// The operation completed (per-event errors may still be in details)
    Success,
    /// The remote rejected the operation (non-2xx response)
    Failed,
    /// A transport or storage fault interrupted the operation
    Error,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Success => "success",
            OperationStatus::Failed => "failed",
            OperationStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(OperationStatus::Success),
            "failed" => Ok(OperationStatus::Failed),
            "error" => Ok(OperationStatus::Error),
            _ => Err(format!("Unknown operation status: {}", s)),
        }
    }
}

/// One row of the operation log
#[derive(Debug, Clone, Serialize)]
pub struct OperationLogEntry {
    pub id: i64,
    pub operation: Operation,
    pub status: OperationStatus,
    pub details: Option<serde_json::Value>,
    pub events_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Record one operation log entry
pub fn log_operation(
    conn: &Connection,
    operation: Operation,
    status: OperationStatus,
    events_count: i64,
    details: Option<&serde_json::Value>,
) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    let details_str = details.map(|d| d.to_string());

    conn.execute(
        "INSERT INTO sync_logs (operation, status, details, events_count, created_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
            operation.as_str(),
            status.as_str(),
            details_str,
            events_count,
            now,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Filter for querying the operation log
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub operation: Option<Operation>,
    pub status: Option<OperationStatus>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Query operation log entries, newest first
pub fn query_log(conn: &Connection, filter: &LogFilter) -> Result<Vec<OperationLogEntry>> {
    let mut sql = String::from(
        "SELECT id, operation, status, details, events_count, created_at
         FROM sync_logs WHERE 1=1",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(op) = filter.operation {
        sql.push_str(" AND operation = ?");
        params_vec.push(Box::new(op.as_str().to_string()));
    }

    if let Some(status) = filter.status {
        sql.push_str(" AND status = ?");
        params_vec.push(Box::new(status.as_str().to_string()));
    }

    if let Some(ref since) = filter.since {
        sql.push_str(" AND created_at >= ?");
        params_vec.push(Box::new(since.to_rfc3339()));
    }

    sql.push_str(" ORDER BY created_at DESC, id DESC");

    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let params_ref: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;

    let entries: Vec<OperationLogEntry> = stmt
        .query_map(params_ref.as_slice(), |row| {
            let operation_str: String = row.get("operation")?;
            let status_str: String = row.get("status")?;
            let details_str: Option<String> = row.get("details")?;
            let created_at: String = row.get("created_at")?;

            Ok(OperationLogEntry {
                id: row.get("id")?,
                operation: operation_str.parse().unwrap_or(Operation::Pull),
                status: status_str.parse().unwrap_or(OperationStatus::Error),
                details: details_str.and_then(|s| serde_json::from_str(&s).ok()),
                events_count: row.get("events_count")?,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(entries)
}

/// Most recent successful entry for an operation, if any
pub fn last_successful(conn: &Connection, operation: Operation) -> Result<Option<OperationLogEntry>> {
    let filter = LogFilter {
        operation: Some(operation),
        status: Some(OperationStatus::Success),
        limit: Some(1),
        ..Default::default()
    };
    Ok(query_log(conn, &filter)?.into_iter().next())
}
