//! Ingestion engine for notiwatch.
//!
//! Takes the raw posted/removed feed, suppresses redelivered duplicates,
//! persists notifications, correlates fast removals on messaging sources into
//! possible deletions, and fans results out to registered listeners.

pub mod correlator;
pub mod dedup;
pub mod error;
pub mod listener;
pub mod pipeline;
pub mod resolver;
pub mod retention;
pub mod watcher;
pub mod worker;

pub use correlator::{is_watched, TrackingCorrelator, WATCHED_SOURCES};
pub use dedup::DedupBuffer;
pub use error::{IngestError, ListenerError};
pub use listener::{
    BroadcastListener, DispatchReport, ListenerId, ListenerRegistry, NotificationListener,
};
pub use pipeline::{IngestOutcome, IngestPipeline, PostedOutcome, RemovedOutcome};
pub use resolver::{DisplayNameResolver, StaticNameResolver};
pub use retention::RetentionTask;
pub use watcher::{NotificationFilter, Watcher};
pub use worker::{IngestHandle, IngestWorker, WorkerStats};
