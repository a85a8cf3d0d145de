//! In-memory [`NotificationRepository`] for tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use notiwatch_core::error::NotiwatchError;
use notiwatch_core::types::{EpochMillis, Notification, TrackingEntry};

use crate::repository::NotificationRepository;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    notifications: Vec<Notification>,
    tracking: HashMap<String, TrackingEntry>,
}

/// Repository backed by plain collections behind a mutex.
///
/// Mirrors the ordering and deletion semantics of [`crate::SqliteRepository`].
/// `fail_writes` makes every mutating call return a storage error, which lets
/// callers exercise their failure paths.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated write failures.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.notifications.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, NotiwatchError> {
        self.inner
            .lock()
            .map_err(|e| NotiwatchError::Storage(format!("Memory store lock poisoned: {}", e)))
    }

    fn lock_for_write(&self) -> Result<MutexGuard<'_, Inner>, NotiwatchError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(NotiwatchError::Storage("simulated write failure".to_string()));
        }
        self.lock()
    }

    fn select<F>(&self, filter: F) -> Result<Vec<Notification>, NotiwatchError>
    where
        F: Fn(&Notification) -> bool,
    {
        let inner = self.lock()?;
        let mut found: Vec<Notification> = inner
            .notifications
            .iter()
            .filter(|&n| filter(n))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.posted_at.cmp(&a.posted_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }
}

impl NotificationRepository for MemoryRepository {
    fn insert(&self, notification: &Notification) -> Result<i64, NotiwatchError> {
        let mut inner = self.lock_for_write()?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.notifications.push(notification.clone().with_id(id));
        Ok(id)
    }

    fn update(&self, notification: &Notification) -> Result<(), NotiwatchError> {
        let id = notification.id.ok_or_else(|| {
            NotiwatchError::InvalidEvent("cannot update a notification without an id".to_string())
        })?;
        let mut inner = self.lock_for_write()?;
        if let Some(stored) = inner.notifications.iter_mut().find(|n| n.id == Some(id)) {
            let deleted_at = stored.deleted_at.or(notification.deleted_at);
            *stored = notification.clone();
            stored.deleted_at = deleted_at;
        }
        Ok(())
    }

    fn mark_deleted(
        &self,
        source_key: &str,
        deleted_at: EpochMillis,
    ) -> Result<usize, NotiwatchError> {
        let mut inner = self.lock_for_write()?;
        let mut changed = 0;
        for n in inner
            .notifications
            .iter_mut()
            .filter(|n| n.source_key == source_key && !n.is_deleted())
        {
            n.deleted_at = Some(deleted_at);
            changed += 1;
        }
        Ok(changed)
    }

    fn query_all(&self) -> Result<Vec<Notification>, NotiwatchError> {
        self.select(|_| true)
    }

    fn query_by_source(&self, source_id: &str) -> Result<Vec<Notification>, NotiwatchError> {
        self.select(|n| n.source_id == source_id)
    }

    fn query_deleted(&self) -> Result<Vec<Notification>, NotiwatchError> {
        let mut deleted = self.select(Notification::is_deleted)?;
        deleted.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at).then(b.id.cmp(&a.id)));
        Ok(deleted)
    }

    fn query_by_time_range(
        &self,
        start: EpochMillis,
        end: EpochMillis,
    ) -> Result<Vec<Notification>, NotiwatchError> {
        self.select(|n| n.posted_at >= start && n.posted_at <= end)
    }

    fn delete_older_than(&self, cutoff: EpochMillis) -> Result<usize, NotiwatchError> {
        let mut inner = self.lock_for_write()?;
        let before = inner.notifications.len();
        inner.notifications.retain(|n| n.posted_at >= cutoff);
        Ok(before - inner.notifications.len())
    }

    fn upsert_tracking(&self, entry: &TrackingEntry) -> Result<(), NotiwatchError> {
        let mut inner = self.lock_for_write()?;
        inner
            .tracking
            .insert(entry.source_key.clone(), entry.clone());
        Ok(())
    }

    fn get_tracking(&self, source_key: &str) -> Result<Option<TrackingEntry>, NotiwatchError> {
        Ok(self.lock()?.tracking.get(source_key).cloned())
    }

    fn deactivate_tracking(&self, source_key: &str) -> Result<(), NotiwatchError> {
        let mut inner = self.lock_for_write()?;
        if let Some(entry) = inner.tracking.get_mut(source_key) {
            entry.active = false;
        }
        Ok(())
    }

    fn get_active_tracking_for_source(
        &self,
        source_id: &str,
    ) -> Result<Vec<TrackingEntry>, NotiwatchError> {
        let inner = self.lock()?;
        let mut entries: Vec<TrackingEntry> = inner
            .tracking
            .values()
            .filter(|e| e.active && e.source_id == source_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.original_posted_at.cmp(&a.original_posted_at));
        Ok(entries)
    }
}
