//! Short-window duplicate suppression for redelivered "posted" events.
//!
//! The platform may deliver the same logical notification more than once with
//! a refreshed creation time. A candidate is a duplicate when a buffered entry
//! has the same source, title and text and was created within the window.

use std::collections::VecDeque;

use notiwatch_core::config::IngestConfig;
use notiwatch_core::types::{EpochMillis, Notification};

#[derive(Debug, Clone, PartialEq, Eq)]
struct DedupEntry {
    source_id: String,
    title: Option<String>,
    text: Option<String>,
    posted_at: EpochMillis,
}

impl DedupEntry {
    fn from_notification(n: &Notification) -> Self {
        Self {
            source_id: n.source_id.clone(),
            title: n.title.clone(),
            text: n.text.clone(),
            posted_at: n.posted_at,
        }
    }

    fn matches(&self, n: &Notification, window_ms: i64) -> bool {
        self.source_id == n.source_id
            && self.title == n.title
            && self.text == n.text
            && window_ms >= 0
            && self.posted_at.abs_diff(n.posted_at) <= window_ms.unsigned_abs()
    }
}

/// Bounded FIFO of recently accepted notifications.
#[derive(Debug, Clone)]
pub struct DedupBuffer {
    window_ms: i64,
    capacity: usize,
    entries: VecDeque<DedupEntry>,
}

impl DedupBuffer {
    pub fn new(window_ms: i64, capacity: usize) -> Self {
        Self {
            window_ms,
            capacity,
            entries: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.dedup_window_ms, config.dedup_capacity)
    }

    /// Returns `false` for a duplicate. Accepted candidates are buffered,
    /// evicting the oldest entry once the buffer exceeds its capacity.
    pub fn should_accept(&mut self, candidate: &Notification) -> bool {
        if self
            .entries
            .iter()
            .any(|e| e.matches(candidate, self.window_ms))
        {
            return false;
        }

        self.entries.push_back(DedupEntry::from_notification(candidate));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        true
    }

    /// Drop all buffered entries.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DedupBuffer {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}
