use serde::{Deserialize, Serialize};

use crate::events::PostedNotification;

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// One day in milliseconds.
pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

// =============================================================================
// Notification record
// =============================================================================

/// An observed notification as persisted by the repository.
///
/// `id` is `None` until the repository assigns one on insert. The deletion
/// state is a single `deleted_at`: a record is deleted exactly when it carries
/// a deletion time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Option<i64>,
    /// Externally assigned key, stable for one notification instance.
    pub source_key: String,
    /// Package-like identifier of the originating application.
    pub source_id: String,
    pub display_name: String,
    pub title: Option<String>,
    pub text: Option<String>,
    pub sub_text: Option<String>,
    pub big_text: Option<String>,
    /// Creation time reported by the notification subsystem.
    pub posted_at: EpochMillis,
    pub category: Option<String>,
    pub priority: i32,
    pub ongoing: bool,
    pub group_key: Option<String>,
    pub deleted_at: Option<EpochMillis>,
}

impl Notification {
    /// Build an unsaved, non-deleted record from a raw posted event.
    pub fn from_posted(posted: PostedNotification, display_name: String) -> Self {
        Self {
            id: None,
            source_key: posted.source_key,
            source_id: posted.source_id,
            display_name,
            title: posted.title,
            text: posted.text,
            sub_text: posted.sub_text,
            big_text: posted.big_text,
            posted_at: posted.posted_at,
            category: posted.category,
            priority: posted.priority,
            ongoing: posted.ongoing,
            group_key: posted.group_key,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Copy of this record carrying the id assigned by the repository.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

// =============================================================================
// Tracking entry
// =============================================================================

/// Correlation state for one source key, linking a post to its removal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub source_key: String,
    pub source_id: String,
    pub original_posted_at: EpochMillis,
    pub last_seen_at: EpochMillis,
    pub active: bool,
}

impl TrackingEntry {
    /// A fresh, active entry for a just-posted notification.
    pub fn for_posted(notification: &Notification) -> Self {
        Self {
            source_key: notification.source_key.clone(),
            source_id: notification.source_id.clone(),
            original_posted_at: notification.posted_at,
            last_seen_at: notification.posted_at,
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_posted() -> PostedNotification {
        PostedNotification {
            source_id: "com.whatsapp".to_string(),
            source_key: "0|com.whatsapp|1|null|10123".to_string(),
            title: Some("Alice".to_string()),
            text: Some("hi there".to_string()),
            sub_text: None,
            big_text: Some("hi there, long version".to_string()),
            posted_at: 1_700_000_000_000,
            category: Some("msg".to_string()),
            priority: 1,
            ongoing: false,
            group_key: Some("group".to_string()),
        }
    }

    #[test]
    fn test_from_posted_is_unsaved_and_not_deleted() {
        let n = Notification::from_posted(make_posted(), "WhatsApp".to_string());
        assert_eq!(n.id, None);
        assert!(!n.is_deleted());
        assert_eq!(n.display_name, "WhatsApp");
        assert_eq!(n.source_id, "com.whatsapp");
        assert_eq!(n.posted_at, 1_700_000_000_000);
        assert_eq!(n.big_text.as_deref(), Some("hi there, long version"));
    }

    #[test]
    fn test_with_id() {
        let n = Notification::from_posted(make_posted(), "WhatsApp".to_string()).with_id(7);
        assert_eq!(n.id, Some(7));
    }

    #[test]
    fn test_tracking_for_posted_uses_creation_time() {
        let n = Notification::from_posted(make_posted(), "WhatsApp".to_string());
        let entry = TrackingEntry::for_posted(&n);
        assert_eq!(entry.source_key, n.source_key);
        assert_eq!(entry.original_posted_at, n.posted_at);
        assert_eq!(entry.last_seen_at, n.posted_at);
        assert!(entry.active);
    }

    #[test]
    fn test_notification_serde_roundtrip() {
        let n = Notification::from_posted(make_posted(), "WhatsApp".to_string()).with_id(3);
        let json = serde_json::to_string(&n).unwrap();
        let back: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }
}
