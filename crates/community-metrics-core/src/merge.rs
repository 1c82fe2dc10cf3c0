//! Merge engine: the idempotent write path.
//!
//! A batch is grouped by metric and each metric's rows are split into runs
//! of consecutive days. For each run the engine deletes every stored row
//! whose `period_end` falls in the run's `[min, max]` range and inserts the
//! run's rows, so repeating a batch leaves storage unchanged.
//!
//! ```text
//! batch:   ●●●●        ●           ●●
//! writes:  [1..=4]     [9..=9]     [15..=16]
//! ```
//!
//! A stored row is only replaced when the batch carries a row for the same
//! day; rows between sparse batch points are left alone.
//!
//! Within one batch, when several rows share `(metric_id, period_end)`, the
//! last one wins.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{Observation, ObservationError, ObservationInput};
use crate::store::{SeriesStore, StoreError};

/// Rows written by a merge.
///
/// Delete-then-insert cannot tell new keys from replaced ones, so every
/// written row is counted as `inserted` and `updated` is always `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub inserted: u64,
    pub updated: u64,
}

impl MergeOutcome {
    pub fn add(&mut self, other: MergeOutcome) {
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

/// One metric's rows over consecutive days and the range they replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricWrite {
    pub metric_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub rows: Vec<Observation>,
}

/// Group a batch by metric, dedupe by `period_end` (last wins), and split
/// each metric's days into consecutive runs. Output is ordered by
/// `metric_id` then `start`, rows by `period_end`.
pub fn plan_merge<I>(batch: I) -> Vec<MetricWrite>
where
    I: IntoIterator<Item = Observation>,
{
    let mut grouped: BTreeMap<String, BTreeMap<NaiveDate, Observation>> = BTreeMap::new();
    for obs in batch {
        grouped
            .entry(obs.metric_id.clone())
            .or_default()
            .insert(obs.period_end, obs);
    }

    let mut writes = Vec::new();
    for (metric_id, by_day) in grouped {
        let mut current: Option<MetricWrite> = None;
        for (day, obs) in by_day {
            let next_day = current
                .as_ref()
                .and_then(|w| w.end.checked_add_days(Days::new(1)));
            if let (Some(write), true) = (current.as_mut(), next_day == Some(day)) {
                write.end = day;
                write.rows.push(obs);
                continue;
            }
            writes.extend(current.take());
            current = Some(MetricWrite {
                metric_id: metric_id.clone(),
                start: day,
                end: day,
                rows: vec![obs],
            });
        }
        writes.extend(current);
    }
    writes
}

/// Validate raw rows, dropping the malformed ones.
pub fn normalize_batch<I>(inputs: I) -> (Vec<Observation>, Vec<ObservationError>)
where
    I: IntoIterator<Item = ObservationInput>,
{
    let mut rows = Vec::new();
    let mut rejected = Vec::new();
    for input in inputs {
        match Observation::try_from_input(input) {
            Ok(obs) => rows.push(obs),
            Err(e) => {
                warn!(error = %e, "skipping invalid observation");
                rejected.push(e);
            }
        }
    }
    (rows, rejected)
}

/// A write that the store rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricFailure {
    pub metric_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub error: StoreError,
}

/// Result of merging a batch: what was written and which writes failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub outcome: MergeOutcome,
    pub failures: Vec<MetricFailure>,
}

impl MergeReport {
    pub fn record(&mut self, write: &MetricWrite, result: Result<u64, StoreError>) {
        match result {
            Ok(written) => self.outcome.inserted += written,
            Err(error) => self.failures.push(MetricFailure {
                metric_id: write.metric_id.clone(),
                start: write.start,
                end: write.end,
                error,
            }),
        }
    }

    /// The outcome, or the first failure.
    pub fn into_result(self) -> Result<MergeOutcome, StoreError> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(self.outcome),
        }
    }
}

/// Replace one planned range.
pub async fn apply_write<S>(store: &S, write: &MetricWrite) -> Result<u64, StoreError>
where
    S: SeriesStore + ?Sized,
{
    let written = store
        .replace_range(&write.metric_id, write.start, write.end, &write.rows)
        .await?;
    debug!(
        metric_id = %write.metric_id,
        start = %write.start,
        end = %write.end,
        rows = written,
        "merged observations"
    );
    Ok(written)
}

/// Write a batch through `store`.
///
/// Each planned range is written independently; a failed range is reported
/// and the remaining ones are still written. Retrying a failed range is
/// safe.
pub async fn merge_observations<S>(store: &S, batch: Vec<Observation>) -> MergeReport
where
    S: SeriesStore + ?Sized,
{
    let mut report = MergeReport::default();
    for write in plan_merge(batch) {
        let result = apply_write(store, &write).await;
        if let Err(e) = &result {
            warn!(metric_id = %write.metric_id, error = %e, "merge failed for metric");
        }
        report.record(&write, result);
    }
    report
}
