//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use notiwatch_core::error::NotiwatchError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), NotiwatchError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| NotiwatchError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| NotiwatchError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: notifications and tracking tables.
fn apply_v1(conn: &Connection) -> Result<(), NotiwatchError> {
    conn.execute_batch(
        "
        BEGIN;

        CREATE TABLE IF NOT EXISTS notifications (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            source_key      TEXT NOT NULL,
            source_id       TEXT NOT NULL,
            display_name    TEXT NOT NULL,
            title           TEXT,
            text            TEXT,
            sub_text        TEXT,
            big_text        TEXT,
            posted_at       INTEGER NOT NULL,
            category        TEXT,
            priority        INTEGER NOT NULL DEFAULT 0,
            ongoing         INTEGER NOT NULL DEFAULT 0,
            group_key       TEXT,
            is_deleted      INTEGER NOT NULL DEFAULT 0,
            deleted_at      INTEGER,
            CHECK ((is_deleted = 0 AND deleted_at IS NULL)
                OR (is_deleted = 1 AND deleted_at IS NOT NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_posted_at
            ON notifications (posted_at DESC);

        CREATE INDEX IF NOT EXISTS idx_notifications_source_id
            ON notifications (source_id, posted_at DESC);

        CREATE INDEX IF NOT EXISTS idx_notifications_source_key
            ON notifications (source_key);

        CREATE INDEX IF NOT EXISTS idx_notifications_deleted
            ON notifications (deleted_at DESC)
            WHERE is_deleted = 1;

        CREATE TABLE IF NOT EXISTS notification_tracking (
            source_key          TEXT PRIMARY KEY NOT NULL,
            source_id           TEXT NOT NULL,
            original_posted_at  INTEGER NOT NULL,
            last_seen_at        INTEGER NOT NULL,
            active              INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_tracking_active_source
            ON notification_tracking (source_id)
            WHERE active = 1;

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');

        COMMIT;
        ",
    )
    .map_err(|e| NotiwatchError::Storage(format!("Migration v1 failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_twice() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_deletion_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO notifications (source_key, source_id, display_name, posted_at, is_deleted)
             VALUES ('k', 'com.x', 'X', 1, 1)",
            [],
        );
        assert!(result.is_err(), "deleted row without deleted_at must be rejected");
    }
}
