//! Sparkline projection: the trailing N days of a gap-filled series.

use crate::interpolate::interpolate_daily;
use crate::models::{Observation, SeriesPoint};

/// Default trailing window for dashboard views.
pub const DEFAULT_DAYS: usize = 180;
/// Largest trailing window the read API accepts.
pub const MAX_DAYS: usize = 730;

/// Clamp a requested day count into `[1, MAX_DAYS]`.
pub fn clamp_days(days: i64) -> usize {
    days.clamp(1, MAX_DAYS as i64) as usize
}

/// The last `days` points of `daily`, in chronological order.
pub fn project(daily: &[SeriesPoint], days: usize) -> Vec<SeriesPoint> {
    let skip = daily.len().saturating_sub(days);
    daily[skip..].to_vec()
}

/// Gap-fill a metric's observations and keep the trailing `days` points.
pub fn sparkline<'a, I>(observations: I, days: usize) -> Vec<SeriesPoint>
where
    I: IntoIterator<Item = &'a Observation>,
{
    project(&interpolate_daily(observations), days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn points(n: u64) -> Vec<SeriesPoint> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        (0..n)
            .map(|i| SeriesPoint::day(start + chrono::Days::new(i), i as i64))
            .collect()
    }

    #[test]
    fn test_project_keeps_tail() {
        let tail = project(&points(10), 3);
        let values: Vec<i64> = tail.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![7, 8, 9]);
    }

    #[test]
    fn test_project_shorter_series_returned_whole() {
        assert_eq!(project(&points(2), 30).len(), 2);
        assert!(project(&[], 30).is_empty());
    }

    #[test]
    fn test_clamp_days() {
        assert_eq!(clamp_days(0), 1);
        assert_eq!(clamp_days(-5), 1);
        assert_eq!(clamp_days(90), 90);
        assert_eq!(clamp_days(10_000), MAX_DAYS);
    }
}
