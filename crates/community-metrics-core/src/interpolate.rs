//! Gap-fill interpolation of sparse daily observations.
//!
//! Turns a metric's irregularly-sampled `(period_end, value)` pairs into a
//! dense series with one entry per calendar day between the first and last
//! known day:
//!
//! - known days return their exact stored value;
//! - days between two known days are linearly interpolated and rounded
//!   half away from zero;
//! - days outside the known range clamp to the nearest known value.
//!
//! Provenance and source window are not consulted here.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::calendar::daily_range;
use crate::models::{Observation, SeriesPoint};

/// The known `(day → value)` pairs for one metric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownSeries {
    known: BTreeMap<NaiveDate, i64>,
}

impl KnownSeries {
    /// Index observations by `period_end`. When several share a day, the
    /// last one in iteration order wins.
    pub fn from_observations<'a, I>(observations: I) -> Self
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        Self::from_points(observations.into_iter().map(|o| (o.period_end, o.value)))
    }

    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, i64)>,
    {
        Self {
            known: points.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        self.known.keys().next().copied()
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        self.known.keys().next_back().copied()
    }

    /// Value at `day`: exact, interpolated, or clamped. `None` only when
    /// the series has no known days.
    pub fn value_at(&self, day: NaiveDate) -> Option<i64> {
        let left = self.known.range(..=day).next_back();
        let right = self.known.range(day..).next();
        match (left, right) {
            (Some((&l_day, &l_val)), _) if l_day == day => Some(l_val),
            (Some((&l_day, &l_val)), Some((&r_day, &r_val))) => {
                Some(interpolate(day, l_day, l_val, r_day, r_val))
            }
            (Some((_, &l_val)), None) => Some(l_val),
            (None, Some((_, &r_val))) => Some(r_val),
            (None, None) => None,
        }
    }

    /// One point per day from the first to the last known day.
    pub fn daily(&self) -> Vec<SeriesPoint> {
        let (Some(start), Some(end)) = (self.first_day(), self.last_day()) else {
            return Vec::new();
        };
        daily_range(start, end)
            .into_iter()
            .filter_map(|day| self.value_at(day).map(|v| SeriesPoint::day(day, v)))
            .collect()
    }
}

fn interpolate(
    target: NaiveDate,
    left: NaiveDate,
    l_val: i64,
    right: NaiveDate,
    r_val: i64,
) -> i64 {
    let span = (right - left).num_days();
    if span <= 0 {
        return l_val;
    }
    let offset = (target - left).num_days() as f64;
    let ratio = offset / span as f64;
    (l_val as f64 + (r_val - l_val) as f64 * ratio).round() as i64
}

/// Gap-fill a metric's observations into a dense daily series.
pub fn interpolate_daily<'a, I>(observations: I) -> Vec<SeriesPoint>
where
    I: IntoIterator<Item = &'a Observation>,
{
    KnownSeries::from_observations(observations).daily()
}
