//! Database migrations for eventsync

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < SCHEMA_VERSION {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Initial schema (v1)
///
/// `replayed_at` is part of the schema from day one; replay state is never
/// patched onto the table at call time.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Synced event records, one row per remote event
        CREATE TABLE IF NOT EXISTS sync_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT NOT NULL,
            source_url TEXT,
            event_type TEXT NOT NULL,
            event_data TEXT NOT NULL DEFAULT '{}',
            sync_metadata TEXT,
            synced_at TEXT NOT NULL,
            replayed_at TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- Dedup key. COALESCE folds NULL sources into the key; a plain
        -- UNIQUE constraint would treat NULLs as distinct rows.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_events_identity
            ON sync_events(event_id, COALESCE(source_url, ''));

        CREATE INDEX IF NOT EXISTS idx_sync_events_type_synced
            ON sync_events(event_type, synced_at);
        CREATE INDEX IF NOT EXISTS idx_sync_events_created
            ON sync_events(created_at);
        CREATE INDEX IF NOT EXISTS idx_sync_events_replayed
            ON sync_events(replayed_at);

        -- Append-only operation log, one row per orchestrated operation
        CREATE TABLE IF NOT EXISTS sync_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            operation TEXT NOT NULL,
            status TEXT NOT NULL,
            details TEXT,
            events_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_sync_logs_operation ON sync_logs(operation);
        CREATE INDEX IF NOT EXISTS idx_sync_logs_created ON sync_logs(created_at DESC);

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_replayed_at_exists_from_v1() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let has_column: bool = conn
            .prepare("SELECT replayed_at FROM sync_events LIMIT 1")
            .is_ok();
        assert!(has_column);
    }
}
