//! Classification of removals as possible deleted messages.
//!
//! There is no "message deleted" signal upstream. A removal that follows its
//! post within the deletion window, on a messaging application, is taken as
//! one. Slow removals and non-messaging sources are always plain dismissals.

use notiwatch_core::config::IngestConfig;
use notiwatch_core::types::EpochMillis;

/// Messaging sources whose fast removals count as possible deletions.
pub const WATCHED_SOURCES: [&str; 8] = [
    "com.whatsapp",
    "org.telegram.messenger",
    "com.facebook.orca",
    "com.viber.voip",
    "com.instagram.android",
    "com.snapchat.android",
    "com.discord",
    "com.google.android.apps.messaging",
];

pub fn is_watched(source_id: &str) -> bool {
    WATCHED_SOURCES.contains(&source_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingCorrelator {
    deletion_window_ms: i64,
}

impl TrackingCorrelator {
    pub fn new(deletion_window_ms: i64) -> Self {
        Self { deletion_window_ms }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.deletion_window_ms)
    }

    /// True when a removal at `now` of a notification posted at `posted_at`
    /// by `source_id` should be reported as a possible deletion.
    pub fn is_possible_deletion(
        &self,
        source_id: &str,
        posted_at: EpochMillis,
        now: EpochMillis,
    ) -> bool {
        now.saturating_sub(posted_at) < self.deletion_window_ms && is_watched(source_id)
    }
}

impl Default for TrackingCorrelator {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}
