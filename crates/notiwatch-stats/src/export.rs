//! Export of notification lists as JSON or CSV.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::TimeZone;

use notiwatch_core::types::{EpochMillis, Notification};

use crate::error::StatsError;

const CSV_HEADER: &str =
    "ID,Display Name,Source ID,Title,Text,Posted At,Is Deleted,Deleted At,Category,Priority";

/// Output format for [`export_notifications`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Pretty-printed JSON array of notification records.
    #[default]
    Json,
    /// One header row, then one row per notification with local timestamps.
    Csv,
}

impl FromStr for ExportFormat {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(StatsError::Export(format!("unknown format: {}", other))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Write `notifications` to `out` and return how many were written.
///
/// CSV timestamps are rendered in `tz` as `YYYY-MM-DD HH:MM:SS`.
pub fn export_notifications<W, Tz>(
    notifications: &[Notification],
    format: ExportFormat,
    tz: &Tz,
    out: &mut W,
) -> Result<usize, StatsError>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, notifications)?;
            writeln!(out)?;
        }
        ExportFormat::Csv => {
            writeln!(out, "{}", CSV_HEADER)?;
            for n in notifications {
                writeln!(out, "{}", csv_row(n, tz))?;
            }
        }
    }
    out.flush()?;
    Ok(notifications.len())
}

fn csv_row<Tz>(n: &Notification, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    [
        n.id.map(|id| id.to_string()).unwrap_or_default(),
        escape_csv(&n.display_name),
        escape_csv(&n.source_id),
        escape_csv(n.title.as_deref().unwrap_or("")),
        escape_csv(n.text.as_deref().unwrap_or("")),
        format_time(n.posted_at, tz),
        n.is_deleted().to_string(),
        n.deleted_at.map(|t| format_time(t, tz)).unwrap_or_default(),
        escape_csv(n.category.as_deref().unwrap_or("")),
        n.priority.to_string(),
    ]
    .join(",")
}

fn escape_csv(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn format_time<Tz>(millis: EpochMillis, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    tz.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> Notification {
        Notification {
            id: Some(7),
            source_key: "k".to_string(),
            source_id: "com.whatsapp".to_string(),
            display_name: "WhatsApp".to_string(),
            title: Some("Alice \"Al\"".to_string()),
            text: Some("see you, later".to_string()),
            sub_text: None,
            big_text: None,
            // 2024-01-10 15:00:00 UTC
            posted_at: 1_704_898_800_000,
            category: None,
            priority: 1,
            ongoing: false,
            group_key: None,
            deleted_at: Some(1_704_898_805_000),
        }
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Csv.to_string(), "csv");
    }

    #[test]
    fn test_json_export_is_array() {
        let mut buf = Vec::new();
        let written =
            export_notifications(&[sample(), sample()], ExportFormat::Json, &Utc, &mut buf)
                .unwrap();
        assert_eq!(written, 2);

        let parsed: Vec<Notification> = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed, vec![sample(), sample()]);
    }

    #[test]
    fn test_csv_export_escapes_and_formats() {
        let mut buf = Vec::new();
        export_notifications(&[sample()], ExportFormat::Csv, &Utc, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "7,\"WhatsApp\",\"com.whatsapp\",\"Alice \"\"Al\"\"\",\"see you, later\",\
             2024-01-10 15:00:00,true,2024-01-10 15:00:05,\"\",1"
        );
    }

    #[test]
    fn test_empty_export() {
        let mut buf = Vec::new();
        let written = export_notifications(&[], ExportFormat::Json, &Utc, &mut buf).unwrap();
        assert_eq!(written, 0);
        assert_eq!(String::from_utf8(buf).unwrap().trim(), "[]");
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        export_notifications(&[sample()], ExportFormat::Csv, &Utc, &mut file).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
