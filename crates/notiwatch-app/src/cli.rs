//! CLI argument definitions for the notiwatch binary.
//!
//! Uses `clap` with derive macros for argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use notiwatch_stats::ExportFormat;

/// notiwatch - records notifications and flags messages deleted right after posting.
#[derive(Parser, Debug)]
#[command(name = "notiwatch", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the SQLite database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Stream JSON-lines events through the watcher and print what it reports.
    Ingest {
        /// Feed file; stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Print aggregate statistics as JSON.
    Stats,
    /// Print stored notifications as JSON lines, newest first.
    List {
        /// Only this source identifier.
        #[arg(long)]
        source: Option<String>,
        /// Only possible deletions.
        #[arg(long)]
        deleted: bool,
        /// Only the last N hours.
        #[arg(long)]
        hours: Option<u32>,
        /// Only since local midnight.
        #[arg(long)]
        today: bool,
    },
    /// Delete notifications older than the retention window.
    Purge {
        /// Override `retention_days`.
        #[arg(long)]
        days: Option<u32>,
    },
    /// Write stored notifications to a file.
    Export {
        out: PathBuf,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        deleted: bool,
        #[arg(long, value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > NOTIWATCH_CONFIG env var > ~/.notiwatch/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("NOTIWATCH_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the data directory, expanding a leading `~`.
    ///
    /// Priority: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self, config_data_dir: &str) -> PathBuf {
        match self.data_dir {
            Some(ref p) => p.clone(),
            None => expand_home(config_data_dir),
        }
    }

    /// Resolve the log filter directive.
    ///
    /// Priority: --log-level flag > config file value. RUST_LOG still wins
    /// over both when set.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

/// Expand `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".notiwatch").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}
