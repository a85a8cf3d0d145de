//! notiwatch stats crate - aggregate statistics and export over the stored history.
//!
//! Everything here reads the repository and never writes to it:
//! - [`compute_stats`]: pure aggregation over a snapshot of notifications
//! - [`StatsAggregator`]: repository + clock + local time zone wrapper
//! - [`export`]: JSON and CSV rendering of notification lists

pub mod aggregator;
pub mod error;
pub mod export;
pub mod types;

pub use aggregator::{compute_stats, start_of_day, StatsAggregator};
pub use error::StatsError;
pub use export::{export_notifications, ExportFormat};
pub use types::{CategoryStat, SourceStat, StatsSnapshot, UNKNOWN_CATEGORY};
