use notiwatch_core::error::NotiwatchError;
use thiserror::Error;

/// Errors that can occur while computing or exporting statistics.
#[derive(Error, Debug)]
pub enum StatsError {
    #[error(transparent)]
    Storage(#[from] NotiwatchError),
    #[error("export error: {0}")]
    Export(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StatsError {
    fn from(e: serde_json::Error) -> Self {
        StatsError::Export(e.to_string())
    }
}
