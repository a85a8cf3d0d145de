use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NotiwatchError, Result};
use crate::types::{EpochMillis, Notification};

// =============================================================================
// Raw feed events
// =============================================================================

/// A notification posted by some source, as delivered by the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedNotification {
    pub source_id: String,
    pub source_key: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sub_text: Option<String>,
    #[serde(default)]
    pub big_text: Option<String>,
    pub posted_at: EpochMillis,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub ongoing: bool,
    #[serde(default)]
    pub group_key: Option<String>,
}

/// A notification removed from the shade, by the user or its source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedNotification {
    pub source_key: String,
    pub source_id: String,
    /// Creation time of the notification being removed.
    pub posted_at: EpochMillis,
}

/// One item of the raw event feed.
///
/// Serialized with a `kind` tag so a feed can be read as JSON lines:
/// `{"kind":"posted", ...}` or `{"kind":"removed", ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawEvent {
    Posted(PostedNotification),
    Removed(RemovedNotification),
}

impl RawEvent {
    pub fn source_key(&self) -> &str {
        match self {
            RawEvent::Posted(p) => &p.source_key,
            RawEvent::Removed(r) => &r.source_key,
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            RawEvent::Posted(p) => &p.source_id,
            RawEvent::Removed(r) => &r.source_id,
        }
    }

    /// Creation time of the notification the event refers to.
    pub fn posted_at(&self) -> EpochMillis {
        match self {
            RawEvent::Posted(p) => p.posted_at,
            RawEvent::Removed(r) => r.posted_at,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RawEvent::Posted(_) => "posted",
            RawEvent::Removed(_) => "removed",
        }
    }

    /// Reject events that cannot be correlated.
    pub fn validate(&self) -> Result<()> {
        if self.source_key().trim().is_empty() {
            return Err(NotiwatchError::InvalidEvent("empty source_key".to_string()));
        }
        if self.source_id().trim().is_empty() {
            return Err(NotiwatchError::InvalidEvent("empty source_id".to_string()));
        }
        if Utc.timestamp_millis_opt(self.posted_at()).single().is_none() {
            return Err(NotiwatchError::InvalidEvent(format!(
                "posted_at out of range: {}",
                self.posted_at()
            )));
        }
        Ok(())
    }

    /// Parse one JSON line of the raw feed.
    pub fn from_json_line(line: &str) -> Result<Self> {
        let event: RawEvent = serde_json::from_str(line)?;
        event.validate()?;
        Ok(event)
    }
}

// =============================================================================
// Listener-facing events
// =============================================================================

/// Events fanned out to listeners after the pipeline has acted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WatchEvent {
    /// A notification passed dedup and was persisted.
    Received { notification: Notification },
    /// A watched source removed a notification shortly after posting it.
    PossibleDeletion {
        source_id: String,
        source_key: String,
        deleted_at: EpochMillis,
    },
}

impl WatchEvent {
    pub fn timestamp(&self) -> EpochMillis {
        match self {
            WatchEvent::Received { notification } => notification.posted_at,
            WatchEvent::PossibleDeletion { deleted_at, .. } => *deleted_at,
        }
    }

    /// Human-readable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            WatchEvent::Received { .. } => "received",
            WatchEvent::PossibleDeletion { .. } => "possible_deletion",
        }
    }
}
