use serde::{Deserialize, Serialize};

use notiwatch_core::types::EpochMillis;

/// Bucket name for notifications that carry no category.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Aggregate view of the notification history at one instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: usize,
    pub deleted: usize,
    /// Posted since local midnight.
    pub today: usize,
    /// Posted since the start of the local week.
    pub this_week: usize,
    pub average_per_day: f64,
    /// Local hour of day (0-23) with the most notifications.
    pub peak_hour: u32,
    pub top_sources: Vec<SourceStat>,
    pub categories: Vec<CategoryStat>,
    pub oldest: Option<EpochMillis>,
    pub newest: Option<EpochMillis>,
    pub computed_at: EpochMillis,
}

/// Per-source ranking entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceStat {
    pub source_id: String,
    /// Display name of the newest notification from this source.
    pub display_name: String,
    pub count: usize,
    pub deleted_count: usize,
    pub percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub category: String,
    pub count: usize,
    pub percentage: f64,
}
