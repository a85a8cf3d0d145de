//! Listener that prints watch events as JSON lines.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;

use notiwatch_core::events::WatchEvent;
use notiwatch_core::types::{EpochMillis, Notification};
use notiwatch_ingest::{ListenerError, NotificationListener};

pub struct JsonLinesListener<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesListener<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn emit(&self, event: &WatchEvent) -> Result<(), ListenerError> {
        let line = serde_json::to_string(event)?;
        let mut out = self
            .out
            .lock()
            .map_err(|e| ListenerError::Failed(format!("output lock poisoned: {}", e)))?;
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JsonLinesListener<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

#[async_trait]
impl<W: Write + Send> NotificationListener for JsonLinesListener<W> {
    async fn on_received(&self, notification: &Notification) -> Result<(), ListenerError> {
        self.emit(&WatchEvent::Received {
            notification: notification.clone(),
        })
    }

    async fn on_possible_deletion(
        &self,
        source_id: &str,
        source_key: &str,
        deleted_at: EpochMillis,
    ) -> Result<(), ListenerError> {
        self.emit(&WatchEvent::PossibleDeletion {
            source_id: source_id.to_string(),
            source_key: source_key.to_string(),
            deleted_at,
        })
    }

    fn name(&self) -> &str {
        "json-lines"
    }
}
