//! Monthly download aggregation across the snapshot/daily cutover.
//!
//! Download history arrives in two regimes separated by a fixed cutover:
//!
//! ```text
//!   discrete snapshots            dense "1d" rows
//! ──●────────●────────●──┤├──▪▪▪▪▪▪▪▪▪▪▪▪▪▪▪▪▪▪▪▪▪▪──▶
//!                snapshot_cutoff  daily_start
//! ```
//!
//! Snapshots on or before `snapshot_cutoff` are emitted verbatim. Daily rows
//! from `daily_start` onward are summed per calendar month. The two point
//! types are only joined by chronological order, never interpolated across.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

use crate::calendar::last_full_month_key;
use crate::models::{Observation, SeriesPoint, SourceWindow};

/// The fixed boundary between the snapshot and dense-daily regimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cutover {
    /// Last day a discrete snapshot may be dated.
    pub snapshot_cutoff: NaiveDate,
    /// First day covered by dense daily rows.
    pub daily_start: NaiveDate,
}

impl Cutover {
    pub fn new(snapshot_cutoff: NaiveDate) -> Self {
        Self {
            snapshot_cutoff,
            daily_start: snapshot_cutoff + Days::new(1),
        }
    }
}

impl Default for Cutover {
    fn default() -> Self {
        Self::new(NaiveDate::from_ymd_opt(2025, 11, 30).expect("valid cutover date"))
    }
}

struct MonthBucket {
    first: NaiveDate,
    last: NaiveDate,
    total: i64,
}

/// Blend snapshot points and monthly sums of daily rows for one metric.
///
/// The window covers the `days` days ending at the latest observed
/// `period_end` (over all rows, whatever their source window).
pub fn monthly_download_points(
    observations: &[Observation],
    days: usize,
    cutover: Cutover,
) -> Vec<SeriesPoint> {
    let Some(latest_day) = observations.iter().map(|o| o.period_end).max() else {
        return Vec::new();
    };
    let lookback = Days::new(days.saturating_sub(1) as u64);
    let window_start = latest_day.checked_sub_days(lookback).unwrap_or(NaiveDate::MIN);

    let mut snapshots: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    let mut months: BTreeMap<(i32, u32), MonthBucket> = BTreeMap::new();
    let daily_from = window_start.max(cutover.daily_start);

    for obs in observations {
        let day = obs.period_end;
        match obs.source_window {
            SourceWindow::DiscreteSnapshot
                if window_start <= day && day <= cutover.snapshot_cutoff =>
            {
                snapshots.insert(day, obs.value);
            }
            SourceWindow::Daily if daily_from <= day && day <= latest_day => {
                months
                    .entry((day.year(), day.month()))
                    .and_modify(|bucket| {
                        bucket.first = bucket.first.min(day);
                        bucket.last = bucket.last.max(day);
                        bucket.total += obs.value;
                    })
                    .or_insert(MonthBucket {
                        first: day,
                        last: day,
                        total: obs.value,
                    });
            }
            _ => {}
        }
    }

    let mut points: Vec<SeriesPoint> = snapshots
        .into_iter()
        .map(|(day, value)| SeriesPoint::day(day, value))
        .chain(months.into_values().map(|bucket| SeriesPoint {
            period_start: bucket.first,
            period_end: bucket.last,
            value: bucket.total,
        }))
        .collect();
    points.sort_by_key(|p| p.period_end);
    points
}

/// The headline value for a download metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatestValue {
    pub value: i64,
    pub period_end: NaiveDate,
}

/// Value of the latest point that ends in the month before `reference`'s.
pub fn last_full_month_value(points: &[SeriesPoint], reference: NaiveDate) -> Option<LatestValue> {
    let target = last_full_month_key(reference);
    points
        .iter()
        .filter(|p| (p.period_end.year(), p.period_end.month()) == target)
        .max_by_key(|p| p.period_end)
        .map(|p| LatestValue {
            value: p.value,
            period_end: p.period_end,
        })
}
