//! Database connection management.
//!
//! One rusqlite Connection behind a Mutex. The database runs in WAL mode so a
//! second `Database` opened on the same file (the stats reader) does not block
//! the ingestion writer.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;

use notiwatch_core::error::NotiwatchError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, NotiwatchError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| NotiwatchError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| NotiwatchError::Storage(format!("Failed to set pragmas: {}", e)))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| NotiwatchError::Storage(format!("Failed to set busy timeout: {}", e)))?;

        info!("Database opened at {}", path.display());
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn in_memory() -> Result<Self, NotiwatchError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| NotiwatchError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| NotiwatchError::Storage(format!("Failed to set pragmas: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, NotiwatchError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, NotiwatchError>
    where
        F: FnOnce(&Connection) -> Result<T, NotiwatchError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| NotiwatchError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
