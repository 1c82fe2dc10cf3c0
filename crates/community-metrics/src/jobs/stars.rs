//! Daily star refresh.
//!
//! Star counts are cumulative. A single-day refresh with no lookback takes
//! the repository's current total; anything wider rebuilds each day's total
//! from stargazer timestamps. When the stargazer listing fails, every day
//! falls back to the current total and the run is marked partial.

use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, warn};

use community_metrics_core::calendar::{days_to_refresh, latest_completed_day};
use community_metrics_core::models::{Observation, Provenance, SourceWindow};
use community_metrics_core::runs::RunContext;
use community_metrics_core::store::SeriesStore;

use super::{complete_run, metric_error, with_retry, JobSummary, RetryPolicy};
use crate::sources::{StarTarget, StarsSource, STAR_TARGETS};

pub const JOB_NAME: &str = "update_daily_stars";

pub fn snapshot_ref(repo: &str) -> String {
    format!("github:{}", repo)
}

pub fn stargazers_ref(repo: &str) -> String {
    format!("github-stargazers:{}", repo)
}

/// Cumulative star count at the end of each day: the number of stargazers
/// who starred before the following midnight UTC.
pub fn cumulative_by_day(times: &[DateTime<Utc>], days: &[NaiveDate]) -> Vec<(NaiveDate, i64)> {
    let mut sorted = times.to_vec();
    sorted.sort_unstable();
    days.iter()
        .map(|day| {
            let cutoff = (*day + Days::new(1)).and_time(NaiveTime::MIN).and_utc();
            let count = sorted.partition_point(|t| *t < cutoff);
            (*day, count as i64)
        })
        .collect()
}

/// One cumulative-snapshot row per `(day, value)`.
pub fn star_rows<F>(
    target: &StarTarget,
    values: &[(NaiveDate, i64)],
    provenance: Provenance,
    source_ref: &str,
    run_id: &str,
    observed_at: F,
) -> Vec<Observation>
where
    F: Fn(NaiveDate) -> DateTime<Utc>,
{
    values
        .iter()
        .map(|(day, value)| {
            Observation::daily(
                target.metric_id,
                *day,
                *value,
                provenance,
                SourceWindow::CumulativeSnapshot,
                observed_at(*day),
                source_ref,
                run_id,
            )
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
async fn rows_for_target<S>(
    store: &S,
    source: &dyn StarsSource,
    policy: &RetryPolicy,
    target: &StarTarget,
    run_id: &str,
    lookback_days: u32,
    latest_day: NaiveDate,
    errors: &mut Vec<String>,
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
    let observed_at = Utc::now();

    if days.len() == 1 && lookback_days == 0 {
        let total = source.repo_stars(target.repo).await?;
        return Ok(star_rows(
            target,
            &[(days[0], total)],
            Provenance::ApiDaily,
            &snapshot_ref(target.repo),
            run_id,
            |_| observed_at,
        ));
    }

    match source.stargazer_times(target.repo).await {
        Ok(times) => Ok(star_rows(
            target,
            &cumulative_by_day(&times, &days),
            Provenance::ApiDaily,
            &stargazers_ref(target.repo),
            run_id,
            |_| observed_at,
        )),
        Err(e) => {
            warn!(
                metric_id = target.metric_id,
                error = %e,
                "stargazer backfill failed, using current total"
            );
            let total = source.repo_stars(target.repo).await?;
            errors.push(format!(
                "{}: stargazer backfill failed ({:#}); fell back to snapshot",
                target.metric_id, e
            ));
            let values: Vec<(NaiveDate, i64)> = days.iter().map(|d| (*d, total)).collect();
            Ok(star_rows(
                target,
                &values,
                Provenance::ApiDaily,
                &snapshot_ref(target.repo),
                run_id,
                |_| observed_at,
            ))
        }
    }
}

/// Refresh every star metric up to the last completed day before `today`.
pub async fn update_stars<S>(
    store: &S,
    source: &dyn StarsSource,
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
    info!(run_id = %run.run_id, lookback_days, %latest_day, "updating daily stars");

    let mut rows = Vec::new();
    let mut errors = Vec::new();
    for target in &STAR_TARGETS {
        match rows_for_target(
            store,
            source,
            policy,
            target,
            &run.run_id,
            lookback_days,
            latest_day,
            &mut errors,
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
    use chrono::TimeZone;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, day).unwrap()
    }

    #[test]
    fn test_cumulative_counts_stars_before_next_midnight() {
        let times = vec![
            Utc.with_ymd_and_hms(2026, 2, 2, 23, 59, 59).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 2, 3, 0, 0, 0).unwrap(),
        ];
        let counts = cumulative_by_day(&times, &[d(1), d(2), d(3), d(4)]);
        assert_eq!(counts, vec![(d(1), 1), (d(2), 2), (d(3), 3), (d(4), 3)]);
    }

    #[test]
    fn test_cumulative_with_no_stargazers() {
        assert_eq!(cumulative_by_day(&[], &[d(1)]), vec![(d(1), 0)]);
    }

    #[test]
    fn test_star_rows_are_cumulative_snapshots() {
        let rows = star_rows(
            &STAR_TARGETS[0],
            &[(d(1), 10)],
            Provenance::ApiDaily,
            &snapshot_ref(STAR_TARGETS[0].repo),
            "run",
            |_| Utc::now(),
        );
        assert_eq!(rows[0].source_window, SourceWindow::CumulativeSnapshot);
        assert_eq!(rows[0].source_ref, "github:lance-format/lance");
    }
}
