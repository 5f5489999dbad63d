//! Record store queries for synced events
//!
//! Each remote event is stored at most once, keyed by (event_id,
//! source_url). The unique index - not application logic - is the final
//! safety net against concurrent duplicate stores.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, Row};

use crate::error::Result;
use crate::types::{EventQuery, NewSyncEvent, SortOrder, SyncedEvent};

/// Result of attempting to store an event record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// A new record was created
    Inserted(i64),
    /// The (event_id, source_url) pair already exists - a no-op, not an error
    AlreadySynced,
}

/// Parse a synced event from a database row
pub fn event_from_row(row: &Row) -> rusqlite::Result<SyncedEvent> {
    let event_data_str: String = row.get("event_data")?;
    let metadata_str: Option<String> = row.get("sync_metadata")?;
    let synced_at: String = row.get("synced_at")?;
    let replayed_at: Option<String> = row.get("replayed_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(SyncedEvent {
        id: row.get("id")?,
        event_id: row.get("event_id")?,
        source_url: row.get("source_url")?,
        event_type: row.get("event_type")?,
        event_data: serde_json::from_str(&event_data_str).unwrap_or_default(),
        sync_metadata: metadata_str.and_then(|s| serde_json::from_str(&s).ok()),
        synced_at: parse_timestamp(&synced_at),
        replayed_at: replayed_at.as_deref().map(parse_timestamp),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Check whether an event with this dedup key is already stored
pub fn event_exists(conn: &Connection, event_id: &str, source_url: Option<&str>) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sync_events
         WHERE event_id = ? AND COALESCE(source_url, '') = COALESCE(?, '')",
        params![event_id, source_url],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Store a processed event record.
///
/// A unique-index violation means another invocation won the race on the
/// same dedup key; that is reported as [`StoreOutcome::AlreadySynced`].
pub fn store_event(conn: &Connection, record: &NewSyncEvent) -> Result<StoreOutcome> {
    let now = Utc::now().to_rfc3339();
    let metadata = serde_json::to_string(&record.sync_metadata)?;
    let data = serde_json::to_string(&record.event_data)?;

    let result = conn.execute(
        "INSERT INTO sync_events
            (event_id, source_url, event_type, event_data, sync_metadata,
             synced_at, replayed_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?)",
        params![
            record.event_id,
            record.source_url,
            record.event_type,
            data,
            metadata,
            record.synced_at.to_rfc3339(),
            now,
            now,
        ],
    );

    match result {
        Ok(_) => {
            let id = conn.last_insert_rowid();
            tracing::info!(
                event_id = %record.event_id,
                event_type = %record.event_type,
                "stored synced event"
            );
            Ok(StoreOutcome::Inserted(id))
        }
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation =>
        {
            Ok(StoreOutcome::AlreadySynced)
        }
        Err(e) => Err(e.into()),
    }
}

/// Find a stored event by its remote identifier
pub fn find_event(
    conn: &Connection,
    event_id: &str,
    source_url: Option<&str>,
) -> Result<Option<SyncedEvent>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, event_id, source_url, event_type, event_data, sync_metadata,
                synced_at, replayed_at, created_at, updated_at
         FROM sync_events
         WHERE event_id = ? AND COALESCE(source_url, '') = COALESCE(?, '')",
    )?;

    let mut rows = stmt.query_map(params![event_id, source_url], event_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Query stored events with optional filtering
pub fn list_events(conn: &Connection, query: &EventQuery) -> Result<Vec<SyncedEvent>> {
    let mut sql = String::from(
        "SELECT id, event_id, source_url, event_type, event_data, sync_metadata,
                synced_at, replayed_at, created_at, updated_at
         FROM sync_events WHERE 1=1",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref types) = query.event_types {
        if !types.is_empty() {
            let placeholders = vec!["?"; types.len()].join(", ");
            sql.push_str(&format!(" AND event_type IN ({})", placeholders));
            for t in types {
                params_vec.push(Box::new(t.clone()));
            }
        }
    }

    if let Some(ref since) = query.since {
        sql.push_str(" AND created_at > ?");
        params_vec.push(Box::new(since.to_rfc3339()));
    }

    match query.replayed {
        Some(true) => sql.push_str(" AND replayed_at IS NOT NULL"),
        Some(false) => sql.push_str(" AND replayed_at IS NULL"),
        None => {}
    }

    match query.order {
        SortOrder::Asc => sql.push_str(" ORDER BY created_at ASC, id ASC"),
        SortOrder::Desc => sql.push_str(" ORDER BY created_at DESC, id DESC"),
    }

    sql.push_str(&format!(" LIMIT {}", query.limit));

    let params_ref: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;

    let events: Vec<SyncedEvent> = stmt
        .query_map(params_ref.as_slice(), event_from_row)?
        .filter_map(|r| r.ok())
        .collect();

    Ok(events)
}

/// Mark a set of records as replayed, all in the caller's transaction
pub fn mark_replayed(conn: &Connection, ids: &[i64], at: DateTime<Utc>) -> Result<usize> {
    let ts = at.to_rfc3339();
    let mut updated = 0;
    let mut stmt = conn.prepare_cached(
        "UPDATE sync_events SET replayed_at = ?, updated_at = ? WHERE id = ? AND replayed_at IS NULL",
    )?;
    for id in ids {
        updated += stmt.execute(params![ts, ts, id])?;
    }
    Ok(updated)
}

/// Total number of synced event records
pub fn count_events(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM sync_events", [], |row| row.get(0))?)
}

/// Number of records already replayed
pub fn count_replayed(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM sync_events WHERE replayed_at IS NOT NULL",
        [],
        |row| row.get(0),
    )?)
}

/// Number of records still awaiting replay
pub fn count_pending_replay(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM sync_events WHERE replayed_at IS NULL",
        [],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::migrations::run_migrations;
    use crate::types::SyncMetadata;
    use serde_json::json;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn record(event_id: &str, source_url: Option<&str>, event_type: &str) -> NewSyncEvent {
        let now = Utc::now();
        NewSyncEvent {
            event_id: event_id.to_string(),
            source_url: source_url.map(String::from),
            event_type: event_type.to_string(),
            event_data: json!({"name": "Test User"}),
            sync_metadata: SyncMetadata {
                synced: true,
                source_url: source_url.map(String::from),
                source_name: None,
                original_id: event_id.to_string(),
                original_created_at: now,
                pulled_at: now,
            },
            synced_at: now,
        }
    }

    #[test]
    fn test_store_and_find() {
        let conn = setup();
        let outcome = store_event(&conn, &record("123-abc", Some("https://peer"), "user.created"))
            .unwrap();
        assert!(matches!(outcome, StoreOutcome::Inserted(_)));

        let found = find_event(&conn, "123-abc", Some("https://peer"))
            .unwrap()
            .unwrap();
        assert_eq!(found.event_type, "user.created");
        assert_eq!(found.event_data, json!({"name": "Test User"}));
        assert!(found.replayed_at.is_none());
    }

    #[test]
    fn test_event_exists_respects_dedup_key() {
        let conn = setup();
        assert!(!event_exists(&conn, "123-abc", None).unwrap());

        store_event(&conn, &record("123-abc", None, "user.created")).unwrap();
        assert!(event_exists(&conn, "123-abc", None).unwrap());
        // A different source is a different identity
        assert!(!event_exists(&conn, "123-abc", Some("https://peer")).unwrap());
    }

    #[test]
    fn test_duplicate_store_is_noop() {
        let conn = setup();
        let r = record("123-abc", Some("https://peer"), "user.created");
        assert!(matches!(
            store_event(&conn, &r).unwrap(),
            StoreOutcome::Inserted(_)
        ));
        assert_eq!(store_event(&conn, &r).unwrap(), StoreOutcome::AlreadySynced);
        assert_eq!(count_events(&conn).unwrap(), 1);
    }

    #[test]
    fn test_null_source_participates_in_dedup_key() {
        let conn = setup();
        let r = record("123-abc", None, "user.created");
        assert!(matches!(
            store_event(&conn, &r).unwrap(),
            StoreOutcome::Inserted(_)
        ));
        // Second store with NULL source still collides
        assert_eq!(store_event(&conn, &r).unwrap(), StoreOutcome::AlreadySynced);
    }

    #[test]
    fn test_same_id_different_source_is_distinct() {
        let conn = setup();
        store_event(&conn, &record("123-abc", Some("https://a"), "user.created")).unwrap();
        let outcome =
            store_event(&conn, &record("123-abc", Some("https://b"), "user.created")).unwrap();
        assert!(matches!(outcome, StoreOutcome::Inserted(_)));
        assert_eq!(count_events(&conn).unwrap(), 2);
    }

    #[test]
    fn test_list_events_filters() {
        let conn = setup();
        store_event(&conn, &record("1", None, "user.created")).unwrap();
        store_event(&conn, &record("2", None, "post.created")).unwrap();
        store_event(&conn, &record("3", None, "user.created")).unwrap();

        let query = EventQuery {
            event_types: Some(vec!["user.created".to_string()]),
            ..Default::default()
        };
        let events = list_events(&conn, &query).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type == "user.created"));

        let all = list_events(&conn, &EventQuery::default()).unwrap();
        assert_eq!(all.len(), 3);
        // Ascending creation order
        assert_eq!(all[0].event_id, "1");
        assert_eq!(all[2].event_id, "3");
    }

    #[test]
    fn test_mark_replayed_and_pending_filter() {
        let conn = setup();
        store_event(&conn, &record("1", None, "user.created")).unwrap();
        store_event(&conn, &record("2", None, "user.created")).unwrap();

        let pending = list_events(
            &conn,
            &EventQuery {
                replayed: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(pending.len(), 2);

        let updated = mark_replayed(&conn, &[pending[0].id], Utc::now()).unwrap();
        assert_eq!(updated, 1);

        // A replayed record is never selected again by the pending query
        let pending = list_events(
            &conn,
            &EventQuery {
                replayed: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id, "2");

        assert_eq!(count_replayed(&conn).unwrap(), 1);
        assert_eq!(count_pending_replay(&conn).unwrap(), 1);
    }

    #[test]
    fn test_mark_replayed_is_idempotent() {
        let conn = setup();
        store_event(&conn, &record("1", None, "user.created")).unwrap();
        let event = find_event(&conn, "1", None).unwrap().unwrap();

        assert_eq!(mark_replayed(&conn, &[event.id], Utc::now()).unwrap(), 1);
        // Terminal state: a second mark changes nothing
        assert_eq!(mark_replayed(&conn, &[event.id], Utc::now()).unwrap(), 0);
    }
}
