//! Age-based retention purge.
//!
//! Notifications posted more than `retention_days` before now are deleted.
//! Tracking entries are not touched.

use tracing::info;

use notiwatch_core::clock::Clock;
use notiwatch_core::config::StorageConfig;
use notiwatch_core::error::NotiwatchError;
use notiwatch_core::types::{EpochMillis, MILLIS_PER_DAY};

use crate::repository::NotificationRepository;

/// Result of a purge operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeResult {
    /// Notifications posted before this instant were removed.
    pub cutoff: EpochMillis,
    /// Number of notifications deleted.
    pub records_deleted: usize,
}

/// How long notifications are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub retention_days: u32,
}

impl RetentionPolicy {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.retention_days)
    }

    /// The oldest `posted_at` that survives a purge run at `now`.
    pub fn cutoff(&self, now: EpochMillis) -> EpochMillis {
        now - self.retention_days as i64 * MILLIS_PER_DAY
    }

    /// Delete every notification older than the retention window.
    pub fn purge(
        &self,
        repo: &dyn NotificationRepository,
        clock: &dyn Clock,
    ) -> Result<PurgeResult, NotiwatchError> {
        let cutoff = self.cutoff(clock.now_millis());
        let records_deleted = repo.delete_older_than(cutoff)?;

        info!(
            retention_days = self.retention_days,
            cutoff = cutoff,
            records_deleted = records_deleted,
            "Purge cycle completed"
        );

        Ok(PurgeResult {
            cutoff,
            records_deleted,
        })
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}
