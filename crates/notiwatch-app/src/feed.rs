//! JSON-lines raw event feed.

use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use notiwatch_core::events::RawEvent;
use notiwatch_ingest::IngestHandle;

/// Counters for one pass over a feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub lines: u64,
    pub submitted: u64,
    pub rejected: u64,
}

/// Open `path`, or stdin when `None`.
pub async fn open(path: Option<&Path>) -> std::io::Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

/// Parse every line of `reader` and queue it on `handle`.
///
/// Blank lines are skipped; malformed lines are logged and counted. Stops
/// early if the queue closes.
pub async fn pump<R>(reader: R, handle: &IngestHandle) -> std::io::Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = FeedSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        summary.lines += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match RawEvent::from_json_line(line) {
            Ok(event) => event,
            Err(e) => {
                summary.rejected += 1;
                warn!(line = summary.lines, error = %e, "Skipping malformed feed line");
                continue;
            }
        };

        if handle.submit(event).await.is_err() {
            debug!(line = summary.lines, "Ingest queue closed, stopping feed");
            break;
        }
        summary.submitted += 1;
    }

    Ok(summary)
}
