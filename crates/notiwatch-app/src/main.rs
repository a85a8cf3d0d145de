//! notiwatch binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Install tracing (stderr; stdout carries command output), then report
//!    a config file that failed to load
//! 3. Open the SQLite database under the data directory
//! 4. Build the Watcher and run the requested command

mod cli;
mod feed;
mod output;

use std::error::Error;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use notiwatch_core::clock::{Clock, SystemClock};
use notiwatch_core::config::NotiwatchConfig;
use notiwatch_core::error::NotiwatchError;
use notiwatch_core::types::EpochMillis;
use notiwatch_ingest::{NotificationFilter, Watcher};
use notiwatch_stats::{export_notifications, start_of_day};
use notiwatch_storage::{Database, NotificationRepository, SqliteRepository};

use crate::cli::{CliArgs, Command};
use crate::output::JsonLinesListener;

const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;

/// Read the config file without logging.
///
/// A missing file means defaults. Any other failure also yields defaults but
/// is returned so it can be reported once tracing is installed.
fn load_config(path: &Path) -> (NotiwatchConfig, Option<NotiwatchError>) {
    if !path.exists() {
        return (NotiwatchConfig::default(), None);
    }
    match NotiwatchConfig::load(path) {
        Ok(config) => (config, None),
        Err(e) => (NotiwatchConfig::default(), Some(e)),
    }
}

/// Build the selection for `list`. With both `hours` and `today`, the later
/// lower bound wins.
fn list_filter(
    source: Option<String>,
    deleted: bool,
    hours: Option<u32>,
    today_since: Option<EpochMillis>,
    now: EpochMillis,
) -> NotificationFilter {
    let hours_since = hours.map(|h| now - i64::from(h) * MILLIS_PER_HOUR);
    let since = match (hours_since, today_since) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    NotificationFilter {
        source_id: source,
        deleted_only: deleted,
        since,
    }
}

async fn run_ingest(watcher: &mut Watcher, file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    watcher.subscribe(Arc::new(JsonLinesListener::stdout()));
    let handle = watcher.start();
    watcher.start_retention();

    let reader = feed::open(file).await?;
    let pumped = tokio::select! {
        result = feed::pump(reader, &handle) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, draining queued events");
            None
        }
    };

    let stats = watcher.shutdown().await?;

    if let Some(result) = pumped {
        let summary = result?;
        info!(
            lines = summary.lines,
            submitted = summary.submitted,
            rejected = summary.rejected,
            "Feed finished"
        );
    }
    if let Some(stats) = stats {
        info!(
            processed = stats.processed,
            stored = stats.stored,
            duplicates = stats.duplicates,
            possible_deletions = stats.possible_deletions,
            dismissed = stats.dismissed,
            failed = stats.failed,
            "Ingest complete"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let (config, config_error) = load_config(&config_file);

    // Tracing. RUST_LOG > --log-level > config.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), config = %config_file.display(), "Starting notiwatch");
    if let Some(e) = config_error {
        warn!(path = %config_file.display(), error = %e, "Failed to load config, using defaults");
    }

    // Storage.
    let data_dir = args.resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db = Database::open(&data_dir.join("notiwatch.db"))?;
    let repo: Arc<dyn NotificationRepository> = Arc::new(SqliteRepository::new(Arc::new(db)));

    let mut watcher = Watcher::new(repo, config);

    match args.command {
        Command::Ingest { file } => run_ingest(&mut watcher, file.as_deref()).await?,
        Command::Stats => {
            let snapshot = watcher.stats()?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::List {
            source,
            deleted,
            hours,
            today,
        } => {
            let now = SystemClock.now_millis();
            let today_since = today.then(|| start_of_day(now, &chrono::Local));
            let filter = list_filter(source, deleted, hours, today_since, now);

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for n in watcher.select(&filter)? {
                writeln!(out, "{}", serde_json::to_string(&n)?)?;
            }
        }
        Command::Purge { days } => {
            let result = watcher.clean_old_notifications(days)?;
            println!(
                "Purged {} notifications posted before {}",
                result.records_deleted, result.cutoff
            );
        }
        Command::Export {
            out,
            source,
            deleted,
            format,
        } => {
            let filter = NotificationFilter {
                source_id: source,
                deleted_only: deleted,
                since: None,
            };
            let notifications = watcher.select(&filter)?;

            if let Some(parent) = out.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let mut writer = std::io::BufWriter::new(std::fs::File::create(&out)?);
            let written =
                export_notifications(&notifications, format.into(), &chrono::Local, &mut writer)?;
            info!(path = %out.display(), count = written, "Export written");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: EpochMillis = 1_700_000_000_000;

    #[test]
    fn test_list_filter_hours_only() {
        let f = list_filter(None, false, Some(2), None, NOW);
        assert_eq!(f.since, Some(NOW - 2 * MILLIS_PER_HOUR));
        assert!(!f.deleted_only);
    }

    #[test]
    fn test_list_filter_later_bound_wins() {
        let midnight = NOW - 5 * MILLIS_PER_HOUR;
        let f = list_filter(Some("com.discord".to_string()), true, Some(24), Some(midnight), NOW);
        assert_eq!(f.since, Some(midnight));
        assert_eq!(f.source_id.as_deref(), Some("com.discord"));
        assert!(f.deleted_only);
    }

    #[test]
    fn test_load_config_missing_file_is_silent_default() {
        let dir = tempfile::tempdir().unwrap();
        let (config, error) = load_config(&dir.path().join("absent.toml"));
        assert!(error.is_none());
        assert_eq!(config.storage.retention_days, 30);
    }

    #[test]
    fn test_load_config_keeps_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage\nretention_days = 7").unwrap();

        let (config, error) = load_config(&path);
        assert!(matches!(error, Some(NotiwatchError::Config(_))));
        assert_eq!(config.storage.retention_days, 30);
    }

    #[test]
    fn test_load_config_reads_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[general]\nlog_level = \"debug\"\n[storage]\nretention_days = 7\n").unwrap();

        let (config, error) = load_config(&path);
        assert!(error.is_none());
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.storage.retention_days, 7);
    }

    #[test]
    fn test_list_filter_unbounded() {
        assert_eq!(list_filter(None, false, None, None, NOW).since, None);
    }
}
