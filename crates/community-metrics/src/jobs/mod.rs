//! Ingestion jobs.
//!
//! Every job follows the same shape: start a [`RunContext`], gather rows
//! per metric (collecting per-metric failures instead of aborting), write
//! the batch through the merge engine, and finalize exactly one
//! [`RunRecord`](community_metrics_core::runs::RunRecord).
//!
//! | Job | Run name | Module |
//! |-----|----------|--------|
//! | Daily downloads | `update_daily_downloads` | [`downloads`] |
//! | Daily stars | `update_daily_stars` | [`stars`] |
//! | Downloads then stars | `daily_refresh` | [`refresh`] |
//! | CSV import | `seed_from_csv` | [`seed`] |
//! | Trailing-window rebuild | `recompute_history` | [`recompute`] |

pub mod downloads;
pub mod recompute;
pub mod refresh;
pub mod seed;
pub mod stars;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use community_metrics_core::merge::{apply_write, plan_merge, MergeReport};
use community_metrics_core::models::Observation;
use community_metrics_core::runs::{RunContext, RunStatus};
use community_metrics_core::store::{SeriesStore, StoreError};

use crate::config::RefreshConfig;

/// How storage calls are retried on transient errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RefreshConfig) -> Self {
        Self {
            attempts: config.store_attempts.max(1),
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or attempts run out.
///
/// Backoff doubles from `base_delay`: 0.5s, 1s, 2s, ...
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = policy.base_delay * (1u32 << (attempt - 1).min(5));
                warn!(what, attempt, error = %e, ?delay, "transient storage error, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Counts reported by a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub inserted: u64,
    pub updated: u64,
    pub errors: usize,
}

impl JobSummary {
    pub fn add(&mut self, other: JobSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.errors += other.errors;
    }
}

impl fmt::Display for JobSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inserted={} updated={} errors={}",
            self.inserted, self.updated, self.errors
        )
    }
}

/// Merge `rows`, retrying each planned range on its own. A range that
/// still fails is reported and the others are written anyway.
pub async fn write_batch<S>(store: &S, policy: &RetryPolicy, rows: Vec<Observation>) -> MergeReport
where
    S: SeriesStore + ?Sized,
{
    let mut report = MergeReport::default();
    for write in plan_merge(rows) {
        let result = with_retry(policy, "merge observations", || apply_write(store, &write)).await;
        if let Err(e) = &result {
            warn!(metric_id = %write.metric_id, error = %e, "could not write metric");
        }
        report.record(&write, result);
    }
    report
}

/// Write a job's rows and finalize its run record.
///
/// Write failures are added to `errors`. The run is `failed` (and an error
/// is returned) only when every write failed; otherwise it is `success` or
/// `partial` depending on `errors`.
pub async fn complete_run<S>(
    store: &S,
    policy: &RetryPolicy,
    run: &RunContext,
    rows: Vec<Observation>,
    mut errors: Vec<String>,
) -> anyhow::Result<JobSummary>
where
    S: SeriesStore + ?Sized,
{
    let row_count = rows.len();
    let report = write_batch(store, policy, rows).await;
    for failure in &report.failures {
        errors.push(format!(
            "{}: write failed for {}..{}: {}",
            failure.metric_id, failure.start, failure.end, failure.error
        ));
    }
    let outcome = report.outcome;

    if !report.failures.is_empty() && outcome.inserted == 0 {
        let record = run.finish(RunStatus::Failed, 0, 0, &errors);
        if let Err(record_err) =
            with_retry(policy, "record run", || store.upsert_run(&record)).await
        {
            warn!(run_id = %run.run_id, error = %record_err, "could not record failed run");
        }
        anyhow::bail!("{} failed to write rows: {}", run.job_name, errors.join(" | "));
    }

    let status = RunStatus::from_errors(&errors);
    let record = run.finish(status, outcome.inserted, outcome.updated, &errors);
    with_retry(policy, "record run", || store.upsert_run(&record)).await?;
    info!(
        job = %run.job_name,
        run_id = %run.run_id,
        status = %status,
        rows = row_count,
        inserted = outcome.inserted,
        errors = errors.len(),
        "run finished"
    );
    Ok(JobSummary {
        inserted: outcome.inserted,
        updated: outcome.updated,
        errors: errors.len(),
    })
}

/// Format a per-metric failure for the run's error summary.
pub(crate) fn metric_error(metric_id: &str, err: &anyhow::Error) -> String {
    format!("{}: {:#}", metric_id, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&fast(4), "op", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Transient("database is locked".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast(4), "op", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Fatal("unauthorized".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast(3), "op", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Transient("503".into()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Transient(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_summary_display() {
        let summary = JobSummary {
            inserted: 4,
            updated: 0,
            errors: 1,
        };
        assert_eq!(summary.to_string(), "inserted=4 updated=0 errors=1");
    }
}
