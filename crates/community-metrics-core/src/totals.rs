//! Cross-metric daily totals (e.g. stars summed across repositories).
//!
//! Each metric is gap-filled independently; the combined series covers the
//! union of every metric's daily range, and each day sums every metric's
//! (possibly clamped) value at that day.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar::daily_range;
use crate::interpolate::KnownSeries;
use crate::models::{Observation, SeriesPoint};
use crate::sparkline::project;

/// Sum independently interpolated metrics into one daily series.
///
/// Metrics without observations are skipped.
pub fn combined_daily_total<'a, I>(per_metric: I) -> Vec<SeriesPoint>
where
    I: IntoIterator<Item = &'a [Observation]>,
{
    let series: Vec<KnownSeries> = per_metric
        .into_iter()
        .map(KnownSeries::from_observations)
        .filter(|s| !s.is_empty())
        .collect();

    let mut days: BTreeSet<NaiveDate> = BTreeSet::new();
    for s in &series {
        if let (Some(first), Some(last)) = (s.first_day(), s.last_day()) {
            days.extend(daily_range(first, last));
        }
    }

    days.into_iter()
        .map(|day| {
            let total = series.iter().filter_map(|s| s.value_at(day)).sum();
            SeriesPoint::day(day, total)
        })
        .collect()
}

/// Combined total trimmed for display, with its trailing value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CombinedTotal {
    pub latest_total: Option<i64>,
    pub sparkline: Vec<SeriesPoint>,
}

pub fn combined_sparkline<'a, I>(per_metric: I, days: usize) -> CombinedTotal
where
    I: IntoIterator<Item = &'a [Observation]>,
{
    let sparkline = project(&combined_daily_total(per_metric), days);
    CombinedTotal {
        latest_total: sparkline.last().map(|p| p.value),
        sparkline,
    }
}
