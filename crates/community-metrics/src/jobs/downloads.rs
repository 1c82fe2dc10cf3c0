//! Daily download refresh.
//!
//! For each download metric, fetches the days after its latest stored
//! `period_end` (widened by `lookback_days`) and writes one `1d` row per
//! day. pypistats and npm report every day, so an absent day is a zero;
//! crates.io only keeps a recent window, so absent days are skipped.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};

use community_metrics_core::calendar::{days_to_refresh, latest_completed_day};
use community_metrics_core::models::{Observation, Provenance, SourceWindow};
use community_metrics_core::runs::RunContext;
use community_metrics_core::store::SeriesStore;

use super::{complete_run, metric_error, with_retry, JobSummary, RetryPolicy};
use crate::sources::{DownloadTarget, DownloadsSource, DOWNLOAD_TARGETS};

pub const JOB_NAME: &str = "update_daily_downloads";

/// Shape fetched totals into one daily row per target day.
pub fn download_rows<F>(
    target: &DownloadTarget,
    days: &[NaiveDate],
    totals: &BTreeMap<NaiveDate, i64>,
    provenance: Provenance,
    run_id: &str,
    observed_at: F,
) -> Vec<Observation>
where
    F: Fn(NaiveDate) -> DateTime<Utc>,
{
    days.iter()
        .filter_map(|day| {
            let value = match totals.get(day) {
                Some(v) => *v,
                None if target.provider.missing_days_are_zero() => 0,
                None => return None,
            };
            Some(Observation::daily(
                target.metric_id,
                *day,
                value,
                provenance,
                SourceWindow::Daily,
                observed_at(*day),
                target.source_ref(),
                run_id,
            ))
        })
        .collect()
}

/// Fetch totals covering `days` (ascending, non-empty) for one target.
pub async fn fetch_totals(
    source: &dyn DownloadsSource,
    target: &DownloadTarget,
    days: &[NaiveDate],
) -> Result<BTreeMap<NaiveDate, i64>> {
    let (Some(start), Some(end)) = (days.first(), days.last()) else {
        return Ok(BTreeMap::new());
    };
    debug!(
        metric_id = target.metric_id,
        provider = %target.provider,
        package = target.package,
        %start,
        %end,
        "fetching downloads"
    );
    source
        .daily_downloads(target.provider, target.package, *start, *end)
        .await
}

async fn rows_for_target<S>(
    store: &S,
    source: &dyn DownloadsSource,
    policy: &RetryPolicy,
    target: &DownloadTarget,
    run_id: &str,
    lookback_days: u32,
    latest_day: NaiveDate,
) -> Result<Vec<Observation>>
where
    S: SeriesStore + ?Sized,
{
    let latest_existing = with_retry(policy, "latest period_end", || {
        store.latest_period_end(target.metric_id)
    })
    .await?;
    let days = days_to_refresh(latest_existing, latest_day, lookback_days);
    if days.is_empty() {
        debug!(metric_id = target.metric_id, "already up to date");
        return Ok(Vec::new());
    }
    let totals = fetch_totals(source, target, &days).await?;
    let observed_at = Utc::now();
    Ok(download_rows(
        target,
        &days,
        &totals,
        Provenance::ApiDaily,
        run_id,
        |_| observed_at,
    ))
}

/// Refresh every download metric up to the last completed day before
/// `today`.
pub async fn update_downloads<S>(
    store: &S,
    source: &dyn DownloadsSource,
    policy: &RetryPolicy,
    run_id: Option<String>,
    lookback_days: u32,
    today: NaiveDate,
) -> Result<JobSummary>
where
    S: SeriesStore + ?Sized,
{
    let run = RunContext::start(JOB_NAME, run_id);
    let latest_day = latest_completed_day(today);
    info!(run_id = %run.run_id, lookback_days, %latest_day, "updating daily downloads");

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for target in &DOWNLOAD_TARGETS {
        match rows_for_target(
            store,
            source,
            policy,
            target,
            &run.run_id,
            lookback_days,
            latest_day,
        )
        .await
        {
            Ok(mut target_rows) => rows.append(&mut target_rows),
            Err(e) => errors.push(metric_error(target.metric_id, &e)),
        }
    }

    complete_run(store, policy, &run, rows, errors).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::DownloadProvider;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, day).unwrap()
    }

    fn target(provider: DownloadProvider) -> DownloadTarget {
        DownloadTarget {
            metric_id: "downloads:lance:python",
            provider,
            package: "pylance",
        }
    }

    #[test]
    fn test_missing_days_are_zero_for_pypi() {
        let totals = BTreeMap::from([(d(1), 5)]);
        let rows = download_rows(
            &target(DownloadProvider::PyPi),
            &[d(1), d(2)],
            &totals,
            Provenance::ApiDaily,
            "run",
            |_| Utc::now(),
        );
        let values: Vec<i64> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![5, 0]);
        assert_eq!(rows[0].source_ref, "pypi:pylance");
        assert_eq!(rows[0].source_window, SourceWindow::Daily);
    }

    #[test]
    fn test_missing_days_are_skipped_for_crates() {
        let totals = BTreeMap::from([(d(2), 9)]);
        let rows = download_rows(
            &target(DownloadProvider::Crates),
            &[d(1), d(2), d(3)],
            &totals,
            Provenance::Recomputed,
            "run",
            |_| Utc::now(),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].period_end, d(2));
        assert_eq!(rows[0].provenance, Provenance::Recomputed);
    }
}
