//! Error types for the ingestion engine.

use notiwatch_core::error::NotiwatchError;
use notiwatch_stats::StatsError;

/// Errors from the ingestion pipeline, its worker and the watcher facade.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Storage(#[from] NotiwatchError),
    #[error("Ingest queue is closed")]
    QueueClosed,
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    #[error("Ingest worker failed: {0}")]
    WorkerFailed(String),
    #[error("Stats error: {0}")]
    Stats(#[from] StatsError),
}

/// Error a listener callback may return.
///
/// The pipeline logs it and moves on to the next listener.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Listener failed: {0}")]
    Failed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_error_display() {
        assert_eq!(IngestError::QueueClosed.to_string(), "Ingest queue is closed");

        let err = IngestError::InvalidEvent("empty source_key".to_string());
        assert_eq!(err.to_string(), "Invalid event: empty source_key");

        let err: IngestError = NotiwatchError::Storage("disk full".to_string()).into();
        assert!(matches!(err, IngestError::Storage(_)));
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_stats_error_display() {
        let err: IngestError = StatsError::from(NotiwatchError::Storage("locked".to_string())).into();
        assert_eq!(err.to_string(), "Stats error: Storage error: locked");
    }

    #[test]
    fn test_listener_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: ListenerError = io_err.into();
        assert!(err.to_string().contains("pipe closed"));
    }
}
