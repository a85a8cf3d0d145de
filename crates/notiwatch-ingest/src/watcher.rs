//! The watcher facade.
//!
//! A `Watcher` is constructed once by the hosting process and passed to
//! whatever needs it. It owns the listener registry, starts and stops the
//! ingest worker, and exposes the read side: queries, stats and purges.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use notiwatch_core::clock::{Clock, SystemClock};
use notiwatch_core::config::NotiwatchConfig;
use notiwatch_core::events::RawEvent;
use notiwatch_core::types::{EpochMillis, Notification};
use notiwatch_stats::{start_of_day, StatsAggregator, StatsSnapshot};
use notiwatch_storage::{NotificationRepository, PurgeResult, RetentionPolicy};

use crate::error::IngestError;
use crate::listener::{ListenerId, ListenerRegistry, NotificationListener};
use crate::pipeline::IngestPipeline;
use crate::resolver::{DisplayNameResolver, StaticNameResolver};
use crate::retention::RetentionTask;
use crate::worker::{IngestHandle, IngestWorker, WorkerStats};

const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Selection used by [`Watcher::select`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    pub source_id: Option<String>,
    pub deleted_only: bool,
    /// Inclusive lower bound on `posted_at`.
    pub since: Option<EpochMillis>,
}

impl NotificationFilter {
    fn matches(&self, n: &Notification) -> bool {
        self.source_id.as_deref().map_or(true, |id| n.source_id == id)
            && (!self.deleted_only || n.is_deleted())
            && self.since.map_or(true, |since| n.posted_at >= since)
    }
}

pub struct Watcher {
    repo: Arc<dyn NotificationRepository>,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn DisplayNameResolver>,
    listeners: Arc<ListenerRegistry>,
    config: NotiwatchConfig,
    ingest: Option<(IngestWorker, IngestHandle)>,
    retention: Option<RetentionTask>,
}

impl Watcher {
    /// Build a watcher over `repo` using the system clock and the
    /// `[display_names]` table as resolver.
    pub fn new(repo: Arc<dyn NotificationRepository>, config: NotiwatchConfig) -> Self {
        Self {
            repo,
            clock: Arc::new(SystemClock),
            resolver: Arc::new(StaticNameResolver::from_config(&config)),
            listeners: Arc::new(ListenerRegistry::new()),
            config,
            ingest: None,
            retention: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DisplayNameResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &NotiwatchConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn NotificationRepository> {
        &self.repo
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    pub fn subscribe(&self, listener: Arc<dyn NotificationListener>) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    // ------------------------------------------------------------------
    // Ingest lifecycle
    // ------------------------------------------------------------------

    /// Start the ingest worker if it is not running and return its handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> IngestHandle {
        if let Some((_, handle)) = &self.ingest {
            return handle.clone();
        }

        let pipeline = IngestPipeline::new(
            Arc::clone(&self.repo),
            Arc::clone(&self.resolver),
            Arc::clone(&self.listeners),
            Arc::clone(&self.clock),
            &self.config.ingest,
        );
        let (worker, handle) = IngestWorker::spawn(pipeline, self.config.ingest.queue_capacity);
        info!(
            queue_capacity = self.config.ingest.queue_capacity,
            listeners = self.listeners.len(),
            "Watcher started"
        );
        self.ingest = Some((worker, handle.clone()));
        handle
    }

    /// Start periodic retention purges at the configured interval.
    pub fn start_retention(&mut self) {
        if self.retention.is_some() {
            return;
        }
        let hours = u64::from(self.config.storage.purge_interval_hours.max(1));
        self.retention = Some(RetentionTask::spawn(
            Arc::clone(&self.repo),
            Arc::clone(&self.clock),
            RetentionPolicy::from_config(&self.config.storage),
            Duration::from_secs(hours * 3600),
        ));
    }

    pub fn is_running(&self) -> bool {
        self.ingest
            .as_ref()
            .map_or(false, |(_, handle)| !handle.is_closed())
    }

    /// Queue a raw event for the worker.
    pub async fn submit(&self, event: RawEvent) -> Result<(), IngestError> {
        match &self.ingest {
            Some((_, handle)) => handle.submit(event).await,
            None => Err(IngestError::QueueClosed),
        }
    }

    /// Stop the worker after it drains, and stop retention.
    ///
    /// Returns `None` when the worker was never started.
    pub async fn shutdown(&mut self) -> Result<Option<WorkerStats>, IngestError> {
        if let Some(retention) = self.retention.take() {
            retention.stop().await;
        }
        match self.ingest.take() {
            Some((worker, handle)) => {
                handle.shutdown();
                let stats = worker.join().await?;
                info!(processed = stats.processed, "Watcher stopped");
                Ok(Some(stats))
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn all_notifications(&self) -> Result<Vec<Notification>, IngestError> {
        Ok(self.repo.query_all()?)
    }

    pub fn notifications_by_source(&self, source_id: &str) -> Result<Vec<Notification>, IngestError> {
        Ok(self.repo.query_by_source(source_id)?)
    }

    pub fn deleted_notifications(&self) -> Result<Vec<Notification>, IngestError> {
        Ok(self.repo.query_deleted()?)
    }

    pub fn notifications_between(
        &self,
        start: EpochMillis,
        end: EpochMillis,
    ) -> Result<Vec<Notification>, IngestError> {
        Ok(self.repo.query_by_time_range(start, end)?)
    }

    /// Notifications posted in the last `hours` hours.
    pub fn notifications_from_last_hours(&self, hours: u32) -> Result<Vec<Notification>, IngestError> {
        let now = self.clock.now_millis();
        self.notifications_between(now - i64::from(hours) * MILLIS_PER_HOUR, now)
    }

    /// Notifications posted since local midnight.
    pub fn today_notifications(&self) -> Result<Vec<Notification>, IngestError> {
        let now = self.clock.now_millis();
        self.notifications_between(start_of_day(now, &chrono::Local), now)
    }

    /// Notifications matching every condition in `filter`, newest first.
    pub fn select(&self, filter: &NotificationFilter) -> Result<Vec<Notification>, IngestError> {
        let base = match (&filter.source_id, filter.deleted_only) {
            (Some(source_id), _) => self.repo.query_by_source(source_id)?,
            (None, true) => self.repo.query_deleted()?,
            (None, false) => self.repo.query_all()?,
        };
        Ok(base.into_iter().filter(|n| filter.matches(n)).collect())
    }

    // ------------------------------------------------------------------
    // Stats and maintenance
    // ------------------------------------------------------------------

    pub fn stats(&self) -> Result<StatsSnapshot, IngestError> {
        Ok(self.aggregator().compute()?)
    }

    pub fn aggregator(&self) -> StatsAggregator {
        StatsAggregator::new(
            Arc::clone(&self.repo),
            Arc::clone(&self.clock),
            &self.config.stats,
        )
    }

    /// Delete notifications older than `days` days; `None` uses the
    /// configured retention.
    pub fn clean_old_notifications(&self, days: Option<u32>) -> Result<PurgeResult, IngestError> {
        let policy = days
            .map(RetentionPolicy::new)
            .unwrap_or_else(|| RetentionPolicy::from_config(&self.config.storage));
        Ok(policy.purge(self.repo.as_ref(), self.clock.as_ref())?)
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("running", &self.is_running())
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}
