//! notiwatch ingestion pipeline.
//!
//! The IngestPipeline turns raw feed events into repository writes and
//! listener callbacks:
//! - posted: resolve name, dedup, persist, start tracking, fan out
//! - removed: classify, mark deleted, fan out, stop tracking
//!
//! It takes `&mut self` and is owned by a single [`crate::IngestWorker`], so
//! events are handled one at a time in arrival order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use notiwatch_core::clock::Clock;
use notiwatch_core::config::IngestConfig;
use notiwatch_core::events::{PostedNotification, RawEvent, RemovedNotification, WatchEvent};
use notiwatch_core::types::{EpochMillis, Notification, TrackingEntry};
use notiwatch_storage::NotificationRepository;

use crate::correlator::TrackingCorrelator;
use crate::dedup::DedupBuffer;
use crate::error::IngestError;
use crate::listener::ListenerRegistry;
use crate::resolver::DisplayNameResolver;

/// Result of handling a posted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostedOutcome {
    /// Persisted under the given id and delivered to listeners.
    Stored { id: i64 },
    /// Suppressed by the dedup buffer. Nothing was written.
    Duplicate,
}

/// Result of handling a removed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovedOutcome {
    PossibleDeletion { deleted_at: EpochMillis },
    Dismissed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestOutcome {
    Posted(PostedOutcome),
    Removed(RemovedOutcome),
}

pub struct IngestPipeline {
    repo: Arc<dyn NotificationRepository>,
    resolver: Arc<dyn DisplayNameResolver>,
    listeners: Arc<ListenerRegistry>,
    clock: Arc<dyn Clock>,
    dedup: DedupBuffer,
    correlator: TrackingCorrelator,
}

impl IngestPipeline {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        resolver: Arc<dyn DisplayNameResolver>,
        listeners: Arc<ListenerRegistry>,
        clock: Arc<dyn Clock>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            repo,
            resolver,
            listeners,
            clock,
            dedup: DedupBuffer::from_config(config),
            correlator: TrackingCorrelator::from_config(config),
        }
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Forget recently seen notifications. Stored data is untouched.
    pub fn reset_session(&mut self) {
        self.dedup.reset();
        info!("Dedup buffer reset");
    }

    /// Handle one raw event.
    ///
    /// A repository failure aborts the remaining steps for this event only.
    pub async fn handle(&mut self, event: RawEvent) -> Result<IngestOutcome, IngestError> {
        event
            .validate()
            .map_err(|e| IngestError::InvalidEvent(e.to_string()))?;

        match event {
            RawEvent::Posted(posted) => self.on_posted(posted).await.map(IngestOutcome::Posted),
            RawEvent::Removed(removed) => {
                self.on_removed(removed).await.map(IngestOutcome::Removed)
            }
        }
    }

    pub async fn on_posted(
        &mut self,
        posted: PostedNotification,
    ) -> Result<PostedOutcome, IngestError> {
        let display_name = self
            .resolver
            .resolve(&posted.source_id)
            .unwrap_or_else(|| posted.source_id.clone());
        let notification = Notification::from_posted(posted, display_name);

        if !self.dedup.should_accept(&notification) {
            debug!(
                source_id = %notification.source_id,
                source_key = %notification.source_key,
                "Suppressed duplicate notification"
            );
            return Ok(PostedOutcome::Duplicate);
        }

        let id = self.repo.insert(&notification)?;
        self.repo
            .upsert_tracking(&TrackingEntry::for_posted(&notification))?;

        let stored = notification.with_id(id);
        debug!(
            id = id,
            source_id = %stored.source_id,
            source_key = %stored.source_key,
            "Stored notification"
        );

        self.listeners
            .dispatch(&WatchEvent::Received {
                notification: stored,
            })
            .await;

        Ok(PostedOutcome::Stored { id })
    }

    pub async fn on_removed(
        &mut self,
        removed: RemovedNotification,
    ) -> Result<RemovedOutcome, IngestError> {
        let now = self.clock.now_millis();
        let outcome = if self.correlator.is_possible_deletion(
            &removed.source_id,
            removed.posted_at,
            now,
        ) {
            let marked = self.repo.mark_deleted(&removed.source_key, now)?;
            info!(
                source_id = %removed.source_id,
                source_key = %removed.source_key,
                elapsed_ms = now.saturating_sub(removed.posted_at),
                rows_marked = marked,
                "Possible deleted message"
            );

            self.listeners
                .dispatch(&WatchEvent::PossibleDeletion {
                    source_id: removed.source_id.clone(),
                    source_key: removed.source_key.clone(),
                    deleted_at: now,
                })
                .await;

            RemovedOutcome::PossibleDeletion { deleted_at: now }
        } else {
            debug!(
                source_id = %removed.source_id,
                source_key = %removed.source_key,
                "Notification dismissed"
            );
            RemovedOutcome::Dismissed
        };

        self.repo.deactivate_tracking(&removed.source_key)?;
        Ok(outcome)
    }
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("dedup", &self.dedup)
            .field("correlator", &self.correlator)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notiwatch_core::clock::ManualClock;
    use notiwatch_storage::MemoryRepository;

    use crate::resolver::StaticNameResolver;

    const T0: EpochMillis = 1_700_000_000_000;

    struct Fixture {
        repo: Arc<MemoryRepository>,
        clock: Arc<ManualClock>,
        pipeline: IngestPipeline,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemoryRepository::new());
        let clock = Arc::new(ManualClock::new(T0));
        let mut resolver = StaticNameResolver::default();
        resolver.insert("com.whatsapp", "WhatsApp");
        let pipeline = IngestPipeline::new(
            repo.clone(),
            Arc::new(resolver),
            Arc::new(ListenerRegistry::new()),
            clock.clone(),
            &IngestConfig::default(),
        );
        Fixture {
            repo,
            clock,
            pipeline,
        }
    }

    fn posted(source: &str, key: &str, text: &str, posted_at: EpochMillis) -> PostedNotification {
        PostedNotification {
            source_id: source.to_string(),
            source_key: key.to_string(),
            title: Some("Bob".to_string()),
            text: Some(text.to_string()),
            sub_text: None,
            big_text: None,
            posted_at,
            category: Some("msg".to_string()),
            priority: 0,
            ongoing: false,
            group_key: None,
        }
    }

    fn removed(source: &str, key: &str, posted_at: EpochMillis) -> RemovedNotification {
        RemovedNotification {
            source_id: source.to_string(),
            source_key: key.to_string(),
            posted_at,
        }
    }

    #[tokio::test]
    async fn test_posted_is_stored_with_resolved_name() {
        let mut f = fixture();
        let outcome = f
            .pipeline
            .on_posted(posted("com.whatsapp", "k1", "hi", T0))
            .await
            .unwrap();
        assert_eq!(outcome, PostedOutcome::Stored { id: 1 });

        let stored = f.repo.query_all().unwrap();
        assert_eq!(stored[0].display_name, "WhatsApp");
        let tracking = f.repo.get_tracking("k1").unwrap().unwrap();
        assert!(tracking.active);
        assert_eq!(tracking.original_posted_at, T0);
        assert_eq!(tracking.last_seen_at, T0);
    }

    #[tokio::test]
    async fn test_unknown_source_falls_back_to_id() {
        let mut f = fixture();
        f.pipeline
            .on_posted(posted("com.example.chat", "k1", "hi", T0))
            .await
            .unwrap();
        assert_eq!(f.repo.query_all().unwrap()[0].display_name, "com.example.chat");
    }

    #[tokio::test]
    async fn test_duplicate_writes_nothing() {
        let mut f = fixture();
        f.pipeline
            .on_posted(posted("com.whatsapp", "k1", "hi", T0))
            .await
            .unwrap();
        let outcome = f
            .pipeline
            .on_posted(posted("com.whatsapp", "k2", "hi", T0 + 500))
            .await
            .unwrap();

        assert_eq!(outcome, PostedOutcome::Duplicate);
        assert_eq!(f.repo.len(), 1);
        assert!(f.repo.get_tracking("k2").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_session_forgets_dedup_state() {
        let mut f = fixture();
        f.pipeline
            .on_posted(posted("com.whatsapp", "k1", "hi", T0))
            .await
            .unwrap();
        f.pipeline.reset_session();
        let outcome = f
            .pipeline
            .on_posted(posted("com.whatsapp", "k1", "hi", T0 + 100))
            .await
            .unwrap();
        assert!(matches!(outcome, PostedOutcome::Stored { .. }));
    }

    #[tokio::test]
    async fn test_fast_removal_is_possible_deletion() {
        let mut f = fixture();
        f.pipeline
            .on_posted(posted("com.whatsapp", "k1", "hi", T0))
            .await
            .unwrap();
        f.clock.set(T0 + 9_000);

        let outcome = f
            .pipeline
            .on_removed(removed("com.whatsapp", "k1", T0))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RemovedOutcome::PossibleDeletion {
                deleted_at: T0 + 9_000
            }
        );
        assert_eq!(f.repo.query_deleted().unwrap()[0].deleted_at, Some(T0 + 9_000));
        assert!(!f.repo.get_tracking("k1").unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_slow_removal_is_dismissal() {
        let mut f = fixture();
        f.pipeline
            .on_posted(posted("com.whatsapp", "k1", "hi", T0))
            .await
            .unwrap();
        f.clock.set(T0 + 15_000);

        let outcome = f
            .pipeline
            .on_removed(removed("com.whatsapp", "k1", T0))
            .await
            .unwrap();

        assert_eq!(outcome, RemovedOutcome::Dismissed);
        assert!(f.repo.query_deleted().unwrap().is_empty());
        assert!(!f.repo.get_tracking("k1").unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_removal_of_unknown_key_is_safe() {
        let mut f = fixture();
        let outcome = f
            .pipeline
            .on_removed(removed("com.whatsapp", "never-seen", T0 - 100))
            .await
            .unwrap();
        assert!(matches!(outcome, RemovedOutcome::PossibleDeletion { .. }));
        assert!(f.repo.is_empty());
    }

    #[tokio::test]
    async fn test_handle_rejects_invalid_event() {
        let mut f = fixture();
        let err = f
            .pipeline
            .handle(RawEvent::Posted(posted("com.whatsapp", "", "hi", T0)))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_event() {
        let mut f = fixture();
        f.repo.set_fail_writes(true);
        let err = f
            .pipeline
            .on_posted(posted("com.whatsapp", "k1", "hi", T0))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));
        assert!(f.repo.get_tracking("k1").unwrap().is_none());
    }
}
