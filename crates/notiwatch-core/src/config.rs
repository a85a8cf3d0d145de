use std::collections::BTreeMap;
use std::path::Path;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{NotiwatchError, Result};

/// Top-level configuration for notiwatch.
///
/// Loaded from `~/.notiwatch/config.toml` by default. Every section is
/// optional and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotiwatchConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    /// Display names keyed by source identifier, used by the static resolver.
    #[serde(default)]
    pub display_names: BTreeMap<String, String>,
}

impl NotiwatchConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NotiwatchConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| NotiwatchError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.notiwatch/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Ingestion pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Two posted events with equal source, title and text are duplicates
    /// when their creation times are at most this far apart.
    pub dedup_window_ms: i64,
    /// Number of recently accepted events kept for duplicate comparison.
    pub dedup_capacity: usize,
    /// A removal on a watched source faster than this counts as a possible
    /// deletion.
    pub deletion_window_ms: i64,
    /// Bound of the worker's event queue.
    pub queue_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: 700,
            dedup_capacity: 20,
            deletion_window_ms: 10_000,
            queue_capacity: 1024,
        }
    }
}

/// Storage and retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Notifications older than this many days are purged.
    pub retention_days: u32,
    /// Hours between purge cycles while ingesting.
    pub purge_interval_hours: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            purge_interval_hours: 6,
        }
    }
}

/// Statistics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// First day of the week for the "this week" count.
    pub week_start: String,
    /// Length of the per-source ranking.
    pub top_sources: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            week_start: "sunday".to_string(),
            top_sources: 10,
        }
    }
}

impl StatsConfig {
    /// Parse `week_start`, falling back to Sunday on an unknown name.
    pub fn week_start(&self) -> Weekday {
        match self.week_start.parse::<Weekday>() {
            Ok(day) => day,
            Err(_) => {
                warn!(week_start = %self.week_start, "Unknown week_start, using sunday");
                Weekday::Sun
            }
        }
    }
}
