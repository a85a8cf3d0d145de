//! Listener trait, registry and fan-out.
//!
//! Listeners are called one after another. Each call runs in its own task so
//! that an `Err` or a panic from one listener is logged and the rest still
//! receive the event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use notiwatch_core::events::WatchEvent;
use notiwatch_core::types::{EpochMillis, Notification};

use crate::error::ListenerError;

/// Consumer of pipeline events.
#[async_trait]
pub trait NotificationListener: Send + Sync {
    /// A notification passed dedup and was persisted (id populated).
    async fn on_received(&self, notification: &Notification) -> Result<(), ListenerError>;

    /// A watched source removed a notification within the deletion window.
    async fn on_possible_deletion(
        &self,
        source_id: &str,
        source_key: &str,
        deleted_at: EpochMillis,
    ) -> Result<(), ListenerError>;

    /// Name used in log lines.
    fn name(&self) -> &str {
        "listener"
    }
}

/// Handle returned by [`ListenerRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Outcome of delivering one event to every listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

type Entry = (ListenerId, Arc<dyn NotificationListener>);

/// Thread-safe set of listeners.
///
/// Dispatch iterates a snapshot, so subscribing or unsubscribing during a
/// fan-out takes effect from the next event.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<Entry>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn NotificationListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(listener = listener.name(), "Listener subscribed");
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, listener));
        id
    }

    /// Returns whether the listener was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        before != listeners.len()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Entry> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Deliver `event` to every registered listener in subscription order.
    pub async fn dispatch(&self, event: &WatchEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (_, listener) in self.snapshot() {
            let name = listener.name().to_string();
            let event = event.clone();
            let call = tokio::spawn(async move { deliver(listener.as_ref(), &event).await });

            match call.await {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(listener = %name, error = %e, "Listener returned an error");
                }
                Err(join_err) => {
                    report.failed += 1;
                    if join_err.is_panic() {
                        error!(listener = %name, "Listener panicked");
                    } else {
                        error!(listener = %name, error = %join_err, "Listener task was cancelled");
                    }
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

async fn deliver(
    listener: &dyn NotificationListener,
    event: &WatchEvent,
) -> Result<(), ListenerError> {
    match event {
        WatchEvent::Received { notification } => listener.on_received(notification).await,
        WatchEvent::PossibleDeletion {
            source_id,
            source_key,
            deleted_at,
        } => {
            listener
                .on_possible_deletion(source_id, source_key, *deleted_at)
                .await
        }
    }
}

// ============================================================================
// Broadcast adapter
// ============================================================================

/// Republishes every callback as a [`WatchEvent`] on a broadcast channel.
pub struct BroadcastListener {
    tx: broadcast::Sender<WatchEvent>,
}

impl BroadcastListener {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: WatchEvent) {
        // No receivers is not a failure.
        if self.tx.send(event).is_err() {
            debug!("Broadcast listener has no receivers");
        }
    }
}

#[async_trait]
impl NotificationListener for BroadcastListener {
    async fn on_received(&self, notification: &Notification) -> Result<(), ListenerError> {
        self.publish(WatchEvent::Received {
            notification: notification.clone(),
        });
        Ok(())
    }

    async fn on_possible_deletion(
        &self,
        source_id: &str,
        source_key: &str,
        deleted_at: EpochMillis,
    ) -> Result<(), ListenerError> {
        self.publish(WatchEvent::PossibleDeletion {
            source_id: source_id.to_string(),
            source_key: source_key.to_string(),
            deleted_at,
        });
        Ok(())
    }

    fn name(&self) -> &str {
        "broadcast"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationListener for Recorder {
        async fn on_received(&self, n: &Notification) -> Result<(), ListenerError> {
            self.events.lock().unwrap().push(format!("received:{}", n.source_key));
            Ok(())
        }

        async fn on_possible_deletion(
            &self,
            _source_id: &str,
            source_key: &str,
            _deleted_at: EpochMillis,
        ) -> Result<(), ListenerError> {
            self.events.lock().unwrap().push(format!("deleted:{}", source_key));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl NotificationListener for Failing {
        async fn on_received(&self, _n: &Notification) -> Result<(), ListenerError> {
            Err(ListenerError::Failed("boom".to_string()))
        }

        async fn on_possible_deletion(
            &self,
            _source_id: &str,
            _source_key: &str,
            _deleted_at: EpochMillis,
        ) -> Result<(), ListenerError> {
            Err(ListenerError::Failed("boom".to_string()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl NotificationListener for Panicking {
        async fn on_received(&self, _n: &Notification) -> Result<(), ListenerError> {
            panic!("listener bug");
        }

        async fn on_possible_deletion(
            &self,
            _source_id: &str,
            _source_key: &str,
            _deleted_at: EpochMillis,
        ) -> Result<(), ListenerError> {
            panic!("listener bug");
        }
    }

    fn received(key: &str) -> WatchEvent {
        WatchEvent::Received {
            notification: Notification {
                id: Some(1),
                source_key: key.to_string(),
                source_id: "com.whatsapp".to_string(),
                display_name: "WhatsApp".to_string(),
                title: None,
                text: None,
                sub_text: None,
                big_text: None,
                posted_at: 1,
                category: None,
                priority: 0,
                ongoing: false,
                group_key: None,
                deleted_at: None,
            },
        }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_all_listeners() {
        let registry = ListenerRegistry::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        registry.subscribe(a.clone());
        registry.subscribe(b.clone());

        let report = registry.dispatch(&received("k1")).await;

        assert_eq!(report, DispatchReport { delivered: 2, failed: 0 });
        assert_eq!(*a.events.lock().unwrap(), vec!["received:k1"]);
        assert_eq!(*b.events.lock().unwrap(), vec!["received:k1"]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.subscribe(Arc::new(Failing));
        registry.subscribe(Arc::new(Panicking));
        registry.subscribe(recorder.clone());

        let report = registry.dispatch(&received("k1")).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(*recorder.events.lock().unwrap(), vec!["received:k1"]);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let registry = ListenerRegistry::new();
        let recorder = Arc::new(Recorder::default());
        let id = registry.subscribe(recorder.clone());
        assert_eq!(registry.len(), 1);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert!(registry.is_empty());

        registry.dispatch(&received("k1")).await;
        assert!(recorder.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_listener_republishes() {
        let broadcast = Arc::new(BroadcastListener::new(16));
        let mut rx = broadcast.subscribe();
        let registry = ListenerRegistry::new();
        registry.subscribe(broadcast.clone());

        registry.dispatch(&received("k1")).await;
        registry
            .dispatch(&WatchEvent::PossibleDeletion {
                source_id: "com.whatsapp".to_string(),
                source_key: "k1".to_string(),
                deleted_at: 99,
            })
            .await;

        assert_eq!(rx.recv().await.unwrap().event_name(), "received");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event_name(), "possible_deletion");
        assert_eq!(second.timestamp(), 99);
    }

    #[tokio::test]
    async fn test_broadcast_without_receivers_is_ok() {
        let listener = BroadcastListener::new(4);
        let WatchEvent::Received { notification } = received("k") else {
            unreachable!()
        };
        assert!(listener.on_received(&notification).await.is_ok());
    }
}
