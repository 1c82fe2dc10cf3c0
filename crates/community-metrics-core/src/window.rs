//! Rolling-window totals over observations of arbitrary span.
//!
//! Each observation contributes the share of its value that falls inside
//! the window, assuming the underlying activity is spread uniformly over
//! its `period_start..=period_end` span:
//!
//! ```text
//! contribution = value × overlap_days / span_days
//! ```
//!
//! Contributions are summed per group in floating point and rounded (half
//! away from zero) only when the totals are reported.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;

use crate::models::Observation;

/// An inclusive `[start, end]` range of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// The `days` days ending at `end`, inclusive.
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        let lookback = Days::new(u64::from(days.max(1)) - 1);
        Self {
            start: end - lookback,
            end,
        }
    }

    /// Number of days shared with `[start, end]`; zero when disjoint.
    pub fn overlap_days(&self, start: NaiveDate, end: NaiveDate) -> i64 {
        let lo = start.max(self.start);
        let hi = end.min(self.end);
        if hi < lo {
            0
        } else {
            (hi - lo).num_days() + 1
        }
    }
}

/// Per-group totals for one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowTotals {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    #[serde(flatten)]
    pub totals: BTreeMap<String, i64>,
}

impl WindowTotals {
    pub fn total(&self, group: &str) -> i64 {
        self.totals.get(group).copied().unwrap_or(0)
    }
}

/// Sum overlap-weighted contributions per group.
///
/// `key_of` extracts an observation's group key; observations whose key is
/// `None` or not listed in `groups` are ignored. Every listed group is
/// reported, with `0` when nothing contributed.
pub fn window_totals<'a, I, F>(
    observations: I,
    window: DateWindow,
    groups: &[&str],
    key_of: F,
) -> WindowTotals
where
    I: IntoIterator<Item = &'a Observation>,
    F: Fn(&'a Observation) -> Option<&'a str>,
{
    let mut sums: BTreeMap<&str, f64> = groups.iter().map(|g| (*g, 0.0)).collect();

    for obs in observations {
        let Some(key) = key_of(obs) else {
            continue;
        };
        let Some(sum) = sums.get_mut(key) else {
            continue;
        };
        let overlap = window.overlap_days(obs.period_start, obs.period_end);
        if overlap <= 0 {
            continue;
        }
        let span = obs.span_days();
        if span <= 0 {
            continue;
        }
        *sum += obs.value as f64 * (overlap as f64 / span as f64);
    }

    WindowTotals {
        window_start: window.start,
        window_end: window.end,
        totals: sums
            .into_iter()
            .map(|(group, sum)| (group.to_string(), sum.round() as i64))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{metric_product, Provenance, SourceWindow};
    use chrono::Utc;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    fn span(metric_id: &str, start: NaiveDate, end: NaiveDate, value: i64) -> Observation {
        let mut obs = Observation::daily(
            metric_id,
            end,
            value,
            Provenance::CsvSeed,
            SourceWindow::LegacyUnknown,
            Utc::now(),
            "test",
            "run",
        );
        obs.period_start = start;
        obs
    }

    fn totals(rows: &[Observation], window: DateWindow) -> WindowTotals {
        window_totals(rows, window, &["lance", "lancedb"], |o| {
            metric_product(&o.metric_id)
        })
    }

    #[test]
    fn test_partial_overlap_is_apportioned() {
        let rows = vec![span("downloads:lance:python", d(2, 1), d(2, 10), 100)];
        let window = DateWindow {
            start: d(2, 5),
            end: d(2, 14),
        };
        let result = totals(&rows, window);
        assert_eq!(result.total("lance"), 60);
        assert_eq!(result.total("lancedb"), 0);
    }

    #[test]
    fn test_groups_sum_independently() {
        let window = DateWindow::trailing(d(2, 14), 30);
        let rows = vec![
            span("downloads:lance:python", d(2, 1), d(2, 1), 10),
            span("downloads:lance:rust", d(2, 2), d(2, 2), 5),
            span("downloads:lancedb:nodejs", d(2, 3), d(2, 3), 7),
            span("downloads:other:python", d(2, 3), d(2, 3), 1000),
            span("bogus", d(2, 3), d(2, 3), 1000),
        ];
        let result = totals(&rows, window);
        assert_eq!(result.total("lance"), 15);
        assert_eq!(result.total("lancedb"), 7);
    }

    #[test]
    fn test_rounding_happens_once_at_output() {
        // Two thirds of 1 contributed twice: 0.667 + 0.667 = 1.33 → 1,
        // rather than round(0.667) * 2 = 2.
        let window = DateWindow {
            start: d(2, 1),
            end: d(2, 2),
        };
        let rows = vec![
            span("downloads:lance:python", d(2, 1), d(2, 3), 1),
            span("downloads:lance:rust", d(2, 1), d(2, 3), 1),
        ];
        assert_eq!(totals(&rows, window).total("lance"), 1);
    }

    #[test]
    fn test_no_observations_still_reports_window() {
        let window = DateWindow::trailing(d(2, 14), 30);
        let result = totals(&[], window);
        assert_eq!(result.window_start, d(1, 16));
        assert_eq!(result.window_end, d(2, 14));
        assert_eq!(result.totals.len(), 2);
        assert!(result.totals.values().all(|v| *v == 0));
    }

    #[test]
    fn test_overlap_days_disjoint() {
        let window = DateWindow {
            start: d(2, 5),
            end: d(2, 14),
        };
        assert_eq!(window.overlap_days(d(1, 1), d(2, 4)), 0);
        assert_eq!(window.overlap_days(d(2, 14), d(3, 1)), 1);
    }
}
