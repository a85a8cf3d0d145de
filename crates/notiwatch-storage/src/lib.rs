//! notiwatch storage crate - SQLite persistence, in-memory store, retention.
//!
//! Provides a WAL-mode SQLite database with migrations, the
//! [`NotificationRepository`] seam the ingestion pipeline writes through, a
//! SQLite and an in-memory implementation of it, and the retention purge.

pub mod db;
pub mod memory;
pub mod migrations;
pub mod repository;
pub mod retention;

pub use db::Database;
pub use memory::MemoryRepository;
pub use repository::{NotificationRepository, SqliteRepository};
pub use retention::{PurgeResult, RetentionPolicy};
