//! Statistics over the stored notification history.
//!
//! [`compute_stats`] is a pure function of a notification snapshot, the
//! current instant and a time zone. [`StatsAggregator`] feeds it from a
//! repository using the local time zone.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Offset, TimeZone, Timelike, Weekday};
use tracing::debug;

use notiwatch_core::clock::Clock;
use notiwatch_core::config::StatsConfig;
use notiwatch_core::types::{EpochMillis, Notification, MILLIS_PER_DAY};
use notiwatch_storage::NotificationRepository;

use crate::error::StatsError;
use crate::types::{CategoryStat, SourceStat, StatsSnapshot, UNKNOWN_CATEGORY};

/// Compute the stats snapshot for `events` as seen at `now` in `tz`.
///
/// Empty input is valid and yields zero counts, a zero average and peak
/// hour 0.
pub fn compute_stats<Tz: TimeZone>(
    events: &[Notification],
    now: EpochMillis,
    tz: &Tz,
    week_start: Weekday,
    top_n: usize,
) -> StatsSnapshot {
    let total = events.len();
    let deleted = events.iter().filter(|n| n.is_deleted()).count();

    let (start_of_day, start_of_week) = match tz.timestamp_millis_opt(now).single() {
        Some(local_now) => {
            let today = local_now.date_naive();
            let back = days_since_week_start(today.weekday(), week_start);
            let week_day = today.checked_sub_days(Days::new(back)).unwrap_or(today);
            (
                local_midnight(tz, &local_now, today),
                local_midnight(tz, &local_now, week_day),
            )
        }
        None => (now, now),
    };

    let count_since = |start: EpochMillis| {
        events
            .iter()
            .filter(|n| n.posted_at >= start && n.posted_at <= now)
            .count()
    };

    let oldest = events.iter().map(|n| n.posted_at).min();
    let newest = events.iter().map(|n| n.posted_at).max();

    let average_per_day = match oldest {
        Some(oldest) => {
            let days = (now.saturating_sub(oldest) / MILLIS_PER_DAY).max(1);
            total as f64 / days as f64
        }
        None => 0.0,
    };

    StatsSnapshot {
        total,
        deleted,
        today: count_since(start_of_day),
        this_week: count_since(start_of_week),
        average_per_day,
        peak_hour: peak_hour(events, tz),
        top_sources: rank_sources(events, top_n),
        categories: rank_categories(events),
        oldest,
        newest,
        computed_at: now,
    }
}

/// Epoch millis of the most recent local midnight at or before `now`.
pub fn start_of_day<Tz: TimeZone>(now: EpochMillis, tz: &Tz) -> EpochMillis {
    match tz.timestamp_millis_opt(now).single() {
        Some(local_now) => local_midnight(tz, &local_now, local_now.date_naive()),
        None => now,
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn days_since_week_start(day: Weekday, week_start: Weekday) -> u64 {
    let diff = 7 + day.num_days_from_monday() - week_start.num_days_from_monday();
    u64::from(diff % 7)
}

/// Epoch millis of local midnight on `date`.
///
/// When midnight does not exist locally (a DST gap) the offset in effect at
/// `reference` is applied to the naive midnight instead.
fn local_midnight<Tz: TimeZone>(tz: &Tz, reference: &DateTime<Tz>, date: NaiveDate) -> EpochMillis {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.timestamp_millis(),
        None => {
            let offset_secs = reference.offset().fix().local_minus_utc() as i64;
            naive.and_utc().timestamp_millis() - offset_secs * 1000
        }
    }
}

/// Hour with the most notifications; ties go to the lowest hour.
fn peak_hour<Tz: TimeZone>(events: &[Notification], tz: &Tz) -> u32 {
    let mut by_hour = [0usize; 24];
    for n in events {
        if let Some(local) = tz.timestamp_millis_opt(n.posted_at).single() {
            by_hour[local.hour() as usize] += 1;
        }
    }

    let mut peak = 0;
    for hour in 1..24 {
        if by_hour[hour] > by_hour[peak] {
            peak = hour;
        }
    }
    peak as u32
}

struct SourceAcc<'a> {
    count: usize,
    deleted: usize,
    newest: &'a Notification,
}

fn rank_sources(events: &[Notification], top_n: usize) -> Vec<SourceStat> {
    let mut groups: BTreeMap<&str, SourceAcc<'_>> = BTreeMap::new();
    for n in events {
        let acc = groups.entry(n.source_id.as_str()).or_insert(SourceAcc {
            count: 0,
            deleted: 0,
            newest: n,
        });
        acc.count += 1;
        if n.is_deleted() {
            acc.deleted += 1;
        }
        if (n.posted_at, n.id) > (acc.newest.posted_at, acc.newest.id) {
            acc.newest = n;
        }
    }

    let total = events.len();
    let mut ranked: Vec<SourceStat> = groups
        .into_iter()
        .map(|(source_id, acc)| SourceStat {
            source_id: source_id.to_string(),
            display_name: acc.newest.display_name.clone(),
            count: acc.count,
            deleted_count: acc.deleted,
            percentage: percentage(acc.count, total),
        })
        .collect();

    // BTreeMap iteration is ascending by source id; the stable sort keeps that
    // as the tie-break.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(top_n);
    ranked
}

fn rank_categories(events: &[Notification]) -> Vec<CategoryStat> {
    let mut groups: BTreeMap<&str, usize> = BTreeMap::new();
    for n in events {
        let category = n.category.as_deref().unwrap_or(UNKNOWN_CATEGORY);
        *groups.entry(category).or_insert(0) += 1;
    }

    let total = events.len();
    let mut ranked: Vec<CategoryStat> = groups
        .into_iter()
        .map(|(category, count)| CategoryStat {
            category: category.to_string(),
            count,
            percentage: percentage(count, total),
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked
}

/// Reads the repository and computes stats in the local time zone.
pub struct StatsAggregator {
    repo: Arc<dyn NotificationRepository>,
    clock: Arc<dyn Clock>,
    week_start: Weekday,
    top_sources: usize,
}

impl StatsAggregator {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        clock: Arc<dyn Clock>,
        config: &StatsConfig,
    ) -> Self {
        Self {
            repo,
            clock,
            week_start: config.week_start(),
            top_sources: config.top_sources,
        }
    }

    pub fn compute(&self) -> Result<StatsSnapshot, StatsError> {
        self.compute_in(&chrono::Local)
    }

    /// Compute against an explicit time zone.
    pub fn compute_in<Tz: TimeZone>(&self, tz: &Tz) -> Result<StatsSnapshot, StatsError> {
        let events = self.repo.query_all()?;
        let now = self.clock.now_millis();
        let snapshot = compute_stats(&events, now, tz, self.week_start, self.top_sources);
        debug!(
            total = snapshot.total,
            deleted = snapshot.deleted,
            sources = snapshot.top_sources.len(),
            "Stats computed"
        );
        Ok(snapshot)
    }
}
