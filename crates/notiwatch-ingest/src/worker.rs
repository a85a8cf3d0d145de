//! Single background worker that drains the ingest queue in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use notiwatch_core::events::RawEvent;

use crate::error::IngestError;
use crate::pipeline::{IngestOutcome, IngestPipeline, PostedOutcome, RemovedOutcome};

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub stored: u64,
    pub duplicates: u64,
    pub possible_deletions: u64,
    pub dismissed: u64,
    pub failed: u64,
}

impl WorkerStats {
    fn record(&mut self, result: &Result<IngestOutcome, IngestError>) {
        self.processed += 1;
        match result {
            Ok(IngestOutcome::Posted(PostedOutcome::Stored { .. })) => self.stored += 1,
            Ok(IngestOutcome::Posted(PostedOutcome::Duplicate)) => self.duplicates += 1,
            Ok(IngestOutcome::Removed(RemovedOutcome::PossibleDeletion { .. })) => {
                self.possible_deletions += 1
            }
            Ok(IngestOutcome::Removed(RemovedOutcome::Dismissed)) => self.dismissed += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Enqueue side of the worker. Cheap to clone.
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<RawEvent>,
    shutdown: Arc<Notify>,
    closing: Arc<AtomicBool>,
}

impl IngestHandle {
    /// Queue an event, waiting for room if the queue is full.
    pub async fn submit(&self, event: RawEvent) -> Result<(), IngestError> {
        if self.is_closed() {
            return Err(IngestError::QueueClosed);
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| IngestError::QueueClosed)
    }

    /// Stop accepting events. Already queued events are still processed.
    pub fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::SeqCst) || self.tx.is_closed()
    }
}

impl std::fmt::Debug for IngestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The running worker task.
#[derive(Debug)]
pub struct IngestWorker {
    task: JoinHandle<WorkerStats>,
}

impl IngestWorker {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(pipeline: IngestPipeline, capacity: usize) -> (IngestWorker, IngestHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let shutdown = Arc::new(Notify::new());
        let closing = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run(
            pipeline,
            rx,
            Arc::clone(&shutdown),
            Arc::clone(&closing),
        ));

        (
            IngestWorker { task },
            IngestHandle {
                tx,
                shutdown,
                closing,
            },
        )
    }

    /// Wait for the worker to finish draining.
    pub async fn join(self) -> Result<WorkerStats, IngestError> {
        self.task
            .await
            .map_err(|e| IngestError::WorkerFailed(e.to_string()))
    }
}

async fn run(
    mut pipeline: IngestPipeline,
    mut rx: mpsc::Receiver<RawEvent>,
    shutdown: Arc<Notify>,
    closing: Arc<AtomicBool>,
) -> WorkerStats {
    info!("Ingest worker started");
    let mut stats = WorkerStats::default();

    loop {
        if closing.load(Ordering::SeqCst) {
            break;
        }

        tokio::select! {
            biased;
            received = rx.recv() => match received {
                Some(event) => process(&mut pipeline, event, &mut stats).await,
                None => break,
            },
            _ = shutdown.notified() => break,
        }
    }

    // Graceful drain: no new events, but everything already queued is handled.
    rx.close();
    while let Some(event) = rx.recv().await {
        process(&mut pipeline, event, &mut stats).await;
    }

    info!(
        processed = stats.processed,
        stored = stats.stored,
        duplicates = stats.duplicates,
        possible_deletions = stats.possible_deletions,
        failed = stats.failed,
        "Ingest worker stopped"
    );
    stats
}

async fn process(pipeline: &mut IngestPipeline, event: RawEvent, stats: &mut WorkerStats) {
    let kind = event.kind();
    let source_key = event.source_key().to_string();
    let result = pipeline.handle(event).await;

    match &result {
        Ok(_) => {}
        Err(IngestError::InvalidEvent(reason)) => {
            warn!(kind = kind, reason = %reason, "Rejected invalid event");
        }
        Err(e) => {
            error!(kind = kind, source_key = %source_key, error = %e, "Failed to process event");
        }
    }
    stats.record(&result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use notiwatch_core::clock::ManualClock;
    use notiwatch_core::config::IngestConfig;
    use notiwatch_core::events::PostedNotification;
    use notiwatch_storage::MemoryRepository;

    use crate::listener::ListenerRegistry;
    use crate::resolver::StaticNameResolver;

    fn make_pipeline(repo: Arc<MemoryRepository>) -> IngestPipeline {
        IngestPipeline::new(
            repo,
            Arc::new(StaticNameResolver::default()),
            Arc::new(ListenerRegistry::new()),
            Arc::new(ManualClock::new(1_000_000)),
            &IngestConfig::default(),
        )
    }

    fn posted(key: &str, text: &str) -> RawEvent {
        RawEvent::Posted(PostedNotification {
            source_id: "com.whatsapp".to_string(),
            source_key: key.to_string(),
            title: None,
            text: Some(text.to_string()),
            sub_text: None,
            big_text: None,
            posted_at: 1_000_000,
            category: None,
            priority: 0,
            ongoing: false,
            group_key: None,
        })
    }

    #[tokio::test]
    async fn test_worker_processes_and_drains_on_shutdown() {
        let repo = Arc::new(MemoryRepository::new());
        let (worker, handle) = IngestWorker::spawn(make_pipeline(repo.clone()), 16);

        for i in 0..5 {
            handle.submit(posted(&format!("k{}", i), &i.to_string())).await.unwrap();
        }
        handle.shutdown();

        let stats = tokio::time::timeout(Duration::from_secs(2), worker.join())
            .await
            .expect("Worker should stop within timeout")
            .unwrap();

        assert_eq!(stats.processed, 5);
        assert_eq!(stats.stored, 5);
        assert_eq!(repo.len(), 5);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let repo = Arc::new(MemoryRepository::new());
        let (worker, handle) = IngestWorker::spawn(make_pipeline(repo), 4);
        handle.shutdown();

        let err = handle.submit(posted("k", "x")).await.unwrap_err();
        assert!(matches!(err, IngestError::QueueClosed));
        worker.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_worker() {
        let repo = Arc::new(MemoryRepository::new());
        let (worker, handle) = IngestWorker::spawn(make_pipeline(repo.clone()), 16);

        repo.set_fail_writes(true);
        handle.submit(posted("bad", "a")).await.unwrap();
        handle.submit(posted("", "invalid")).await.unwrap();
        handle.shutdown();
        let stats = worker.join().await.unwrap();

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failed, 2);
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_timestamp_is_rejected_and_worker_continues() {
        let repo = Arc::new(MemoryRepository::new());
        let (worker, handle) = IngestWorker::spawn(make_pipeline(repo.clone()), 16);

        let mut extreme = posted("extreme", "same text");
        if let RawEvent::Posted(p) = &mut extreme {
            p.posted_at = i64::MIN;
        }
        handle.submit(posted("first", "same text")).await.unwrap();
        handle.submit(extreme).await.unwrap();
        handle.submit(posted("third", "other text")).await.unwrap();
        handle.shutdown();

        let stats = tokio::time::timeout(Duration::from_secs(2), worker.join())
            .await
            .expect("Worker should stop within timeout")
            .unwrap();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.stored, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_stats_record() {
        let mut stats = WorkerStats::default();
        stats.record(&Ok(IngestOutcome::Posted(PostedOutcome::Stored { id: 1 })));
        stats.record(&Ok(IngestOutcome::Posted(PostedOutcome::Duplicate)));
        stats.record(&Ok(IngestOutcome::Removed(RemovedOutcome::Dismissed)));
        stats.record(&Err(IngestError::QueueClosed));
        assert_eq!(
            stats,
            WorkerStats {
                processed: 4,
                stored: 1,
                duplicates: 1,
                possible_deletions: 0,
                dismissed: 1,
                failed: 1,
            }
        );
    }
}
