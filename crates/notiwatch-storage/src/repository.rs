//! The repository seam and its SQLite implementation.
//!
//! The ingestion pipeline and the stats aggregator only see
//! [`NotificationRepository`]; the SQLite store below is the production
//! implementation, [`crate::MemoryRepository`] the test double.

use std::sync::Arc;

use rusqlite::OptionalExtension;

use notiwatch_core::error::NotiwatchError;
use notiwatch_core::types::{EpochMillis, Notification, TrackingEntry};

use crate::db::Database;

/// Durable store of notifications and their tracking entries.
///
/// Every operation is fallible. Query results are ordered newest first.
pub trait NotificationRepository: Send + Sync {
    /// Persist a new notification and return its assigned id.
    fn insert(&self, notification: &Notification) -> Result<i64, NotiwatchError>;

    /// Overwrite the stored fields of a notification identified by its id.
    ///
    /// A deletion already recorded on the stored row is never cleared.
    fn update(&self, notification: &Notification) -> Result<(), NotiwatchError>;

    /// Mark every not-yet-deleted notification with this key as deleted.
    ///
    /// Returns the number of rows that changed; zero when nothing matches or
    /// the rows were already deleted.
    fn mark_deleted(&self, source_key: &str, deleted_at: EpochMillis)
        -> Result<usize, NotiwatchError>;

    fn query_all(&self) -> Result<Vec<Notification>, NotiwatchError>;

    fn query_by_source(&self, source_id: &str) -> Result<Vec<Notification>, NotiwatchError>;

    /// Deleted notifications, most recent deletion first.
    fn query_deleted(&self) -> Result<Vec<Notification>, NotiwatchError>;

    /// Notifications posted within `[start, end]`, both inclusive.
    fn query_by_time_range(
        &self,
        start: EpochMillis,
        end: EpochMillis,
    ) -> Result<Vec<Notification>, NotiwatchError>;

    /// Remove notifications posted strictly before `cutoff`.
    fn delete_older_than(&self, cutoff: EpochMillis) -> Result<usize, NotiwatchError>;

    /// Insert or replace the tracking entry for `entry.source_key`.
    fn upsert_tracking(&self, entry: &TrackingEntry) -> Result<(), NotiwatchError>;

    fn get_tracking(&self, source_key: &str) -> Result<Option<TrackingEntry>, NotiwatchError>;

    fn deactivate_tracking(&self, source_key: &str) -> Result<(), NotiwatchError>;

    fn get_active_tracking_for_source(
        &self,
        source_id: &str,
    ) -> Result<Vec<TrackingEntry>, NotiwatchError>;
}

const NOTIFICATION_COLUMNS: &str = "id, source_key, source_id, display_name, title, text, \
     sub_text, big_text, posted_at, category, priority, ongoing, group_key, deleted_at";

/// SQLite-backed repository.
pub struct SqliteRepository {
    db: Arc<Database>,
}

impl SqliteRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn query_notifications(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Notification>, NotiwatchError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| NotiwatchError::Storage(format!("Query prepare: {}", e)))?;
            let rows = stmt
                .query_map(params, row_to_notification)
                .map_err(|e| NotiwatchError::Storage(format!("Query: {}", e)))?;

            let mut notifications = Vec::new();
            for row in rows {
                notifications.push(row.map_err(|e| NotiwatchError::Storage(e.to_string()))?);
            }
            Ok(notifications)
        })
    }
}

impl NotificationRepository for SqliteRepository {
    fn insert(&self, n: &Notification) -> Result<i64, NotiwatchError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (source_key, source_id, display_name, title, text,
                     sub_text, big_text, posted_at, category, priority, ongoing, group_key,
                     is_deleted, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                rusqlite::params![
                    n.source_key,
                    n.source_id,
                    n.display_name,
                    n.title,
                    n.text,
                    n.sub_text,
                    n.big_text,
                    n.posted_at,
                    n.category,
                    n.priority,
                    n.ongoing,
                    n.group_key,
                    n.is_deleted(),
                    n.deleted_at,
                ],
            )
            .map_err(|e| NotiwatchError::Storage(format!("Failed to insert notification: {}", e)))?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn update(&self, n: &Notification) -> Result<(), NotiwatchError> {
        let id = n.id.ok_or_else(|| {
            NotiwatchError::InvalidEvent("cannot update a notification without an id".to_string())
        })?;

        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE notifications SET
                     source_key = ?2, source_id = ?3, display_name = ?4, title = ?5, text = ?6,
                     sub_text = ?7, big_text = ?8, posted_at = ?9, category = ?10,
                     priority = ?11, ongoing = ?12, group_key = ?13,
                     deleted_at = CASE WHEN is_deleted = 1 THEN deleted_at ELSE ?14 END,
                     is_deleted = CASE WHEN is_deleted = 1 THEN 1 ELSE ?15 END
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    n.source_key,
                    n.source_id,
                    n.display_name,
                    n.title,
                    n.text,
                    n.sub_text,
                    n.big_text,
                    n.posted_at,
                    n.category,
                    n.priority,
                    n.ongoing,
                    n.group_key,
                    n.deleted_at,
                    n.is_deleted(),
                ],
            )
            .map_err(|e| NotiwatchError::Storage(format!("Failed to update notification: {}", e)))?;
            Ok(())
        })
    }

    fn mark_deleted(
        &self,
        source_key: &str,
        deleted_at: EpochMillis,
    ) -> Result<usize, NotiwatchError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE notifications SET is_deleted = 1, deleted_at = ?2
                 WHERE source_key = ?1 AND is_deleted = 0",
                rusqlite::params![source_key, deleted_at],
            )
            .map_err(|e| NotiwatchError::Storage(format!("Failed to mark deleted: {}", e)))
        })
    }

    fn query_all(&self) -> Result<Vec<Notification>, NotiwatchError> {
        let sql = format!(
            "SELECT {} FROM notifications ORDER BY posted_at DESC, id DESC",
            NOTIFICATION_COLUMNS
        );
        self.query_notifications(&sql, &[])
    }

    fn query_by_source(&self, source_id: &str) -> Result<Vec<Notification>, NotiwatchError> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE source_id = ?1 ORDER BY posted_at DESC, id DESC",
            NOTIFICATION_COLUMNS
        );
        self.query_notifications(&sql, &[&source_id])
    }

    fn query_deleted(&self) -> Result<Vec<Notification>, NotiwatchError> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE is_deleted = 1 ORDER BY deleted_at DESC, id DESC",
            NOTIFICATION_COLUMNS
        );
        self.query_notifications(&sql, &[])
    }

    fn query_by_time_range(
        &self,
        start: EpochMillis,
        end: EpochMillis,
    ) -> Result<Vec<Notification>, NotiwatchError> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE posted_at BETWEEN ?1 AND ?2
             ORDER BY posted_at DESC, id DESC",
            NOTIFICATION_COLUMNS
        );
        self.query_notifications(&sql, &[&start, &end])
    }

    fn delete_older_than(&self, cutoff: EpochMillis) -> Result<usize, NotiwatchError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM notifications WHERE posted_at < ?1",
                rusqlite::params![cutoff],
            )
            .map_err(|e| NotiwatchError::Storage(format!("Failed to purge notifications: {}", e)))
        })
    }

    fn upsert_tracking(&self, entry: &TrackingEntry) -> Result<(), NotiwatchError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO notification_tracking
                     (source_key, source_id, original_posted_at, last_seen_at, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    entry.source_key,
                    entry.source_id,
                    entry.original_posted_at,
                    entry.last_seen_at,
                    entry.active,
                ],
            )
            .map_err(|e| NotiwatchError::Storage(format!("Failed to upsert tracking: {}", e)))?;
            Ok(())
        })
    }

    fn get_tracking(&self, source_key: &str) -> Result<Option<TrackingEntry>, NotiwatchError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT source_key, source_id, original_posted_at, last_seen_at, active
                 FROM notification_tracking WHERE source_key = ?1",
                rusqlite::params![source_key],
                row_to_tracking,
            )
            .optional()
            .map_err(|e| NotiwatchError::Storage(format!("Failed to load tracking: {}", e)))
        })
    }

    fn deactivate_tracking(&self, source_key: &str) -> Result<(), NotiwatchError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE notification_tracking SET active = 0 WHERE source_key = ?1",
                rusqlite::params![source_key],
            )
            .map_err(|e| NotiwatchError::Storage(format!("Failed to deactivate tracking: {}", e)))?;
            Ok(())
        })
    }

    fn get_active_tracking_for_source(
        &self,
        source_id: &str,
    ) -> Result<Vec<TrackingEntry>, NotiwatchError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT source_key, source_id, original_posted_at, last_seen_at, active
                     FROM notification_tracking
                     WHERE active = 1 AND source_id = ?1
                     ORDER BY original_posted_at DESC",
                )
                .map_err(|e| NotiwatchError::Storage(e.to_string()))?;
            let rows = stmt
                .query_map(rusqlite::params![source_id], row_to_tracking)
                .map_err(|e| NotiwatchError::Storage(e.to_string()))?;

            let mut entries = Vec::new();
            for row in rows {
                entries.push(row.map_err(|e| NotiwatchError::Storage(e.to_string()))?);
            }
            Ok(entries)
        })
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: Some(row.get(0)?),
        source_key: row.get(1)?,
        source_id: row.get(2)?,
        display_name: row.get(3)?,
        title: row.get(4)?,
        text: row.get(5)?,
        sub_text: row.get(6)?,
        big_text: row.get(7)?,
        posted_at: row.get(8)?,
        category: row.get(9)?,
        priority: row.get(10)?,
        ongoing: row.get(11)?,
        group_key: row.get(12)?,
        deleted_at: row.get(13)?,
    })
}

fn row_to_tracking(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackingEntry> {
    Ok(TrackingEntry {
        source_key: row.get(0)?,
        source_id: row.get(1)?,
        original_posted_at: row.get(2)?,
        last_seen_at: row.get(3)?,
        active: row.get(4)?,
    })
}
