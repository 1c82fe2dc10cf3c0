//! Trailing-window history rebuild.
//!
//! Rewrites the last `lookback_days` completed days for every metric from
//! the providers (provenance `recomputed`, `observed_at` at the day's
//! midnight UTC) and re-imports seed snapshots dated before the window so
//! the long tail survives a reset. Stars always come from the stargazer
//! listing here; there is no snapshot fallback.

use anyhow::{bail, Result};
use chrono::{Days, NaiveDate, NaiveTime};
use tracing::info;

use community_metrics_core::calendar::{daily_range, latest_completed_day};
use community_metrics_core::models::{metric_catalog, Observation, Provenance};
use community_metrics_core::runs::{join_errors, RunContext};
use community_metrics_core::store::SeriesStore;

use super::downloads::{download_rows, fetch_totals};
use super::seed::load_seed_rows;
use super::stars::{cumulative_by_day, star_rows, stargazers_ref};
use super::{complete_run, metric_error, with_retry, JobSummary, RetryPolicy};
use crate::config::SeedConfig;
use crate::sources::{DownloadsSource, StarsSource, DOWNLOAD_TARGETS, STAR_TARGETS};

pub const JOB_NAME: &str = "recompute_history";

#[derive(Debug, Clone, Copy)]
pub struct RecomputeOptions {
    pub lookback_days: u32,
    /// Fail the command when any provider errored.
    pub strict: bool,
}

/// First day of the recomputed window ending at `latest_day`.
pub fn lookback_start(latest_day: NaiveDate, lookback_days: u32) -> NaiveDate {
    latest_day - Days::new(u64::from(lookback_days.max(1)) - 1)
}

async fn api_rows(
    downloads: &dyn DownloadsSource,
    stars: &dyn StarsSource,
    days: &[NaiveDate],
    run_id: &str,
) -> (Vec<Observation>, Vec<String>) {
    let midnight = |day: NaiveDate| day.and_time(NaiveTime::MIN).and_utc();
    let mut rows = Vec::new();
    let mut errors = Vec::new();

    for target in &DOWNLOAD_TARGETS {
        match fetch_totals(downloads, target, days).await {
            Ok(totals) => rows.extend(download_rows(
                target,
                days,
                &totals,
                Provenance::Recomputed,
                run_id,
                midnight,
            )),
            Err(e) => errors.push(metric_error(target.metric_id, &e)),
        }
    }

    for target in &STAR_TARGETS {
        match stars.stargazer_times(target.repo).await {
            Ok(times) => rows.extend(star_rows(
                target,
                &cumulative_by_day(&times, days),
                Provenance::Recomputed,
                &stargazers_ref(target.repo),
                run_id,
                midnight,
            )),
            Err(e) => errors.push(metric_error(target.metric_id, &e)),
        }
    }

    (rows, errors)
}

/// Rebuild the trailing window. Table creation (and reset) is the caller's
/// job; the metric catalog is (re)seeded here.
pub async fn run_recompute<S>(
    store: &S,
    downloads: &dyn DownloadsSource,
    stars: &dyn StarsSource,
    seed: &SeedConfig,
    policy: &RetryPolicy,
    options: RecomputeOptions,
    today: NaiveDate,
) -> Result<JobSummary>
where
    S: SeriesStore + ?Sized,
{
    if options.lookback_days == 0 {
        bail!("lookback_days must be > 0");
    }
    let latest_day = latest_completed_day(today);
    let start = lookback_start(latest_day, options.lookback_days);
    let run = RunContext::start(JOB_NAME, None);
    info!(
        run_id = %run.run_id,
        lookback_days = options.lookback_days,
        %start,
        end = %latest_day,
        "recomputing history"
    );

    let catalog = metric_catalog();
    let (inserted, updated) =
        with_retry(policy, "seed metrics", || store.seed_metrics(&catalog)).await?;
    info!(inserted, updated, "metric catalog written");

    let mut rows = load_seed_rows(seed, &run.run_id, Some(start))?;
    if !rows.is_empty() {
        info!(rows = rows.len(), "seed snapshots before window loaded");
    }

    let days = daily_range(start, latest_day);
    let (mut fetched, errors) = api_rows(downloads, stars, &days, &run.run_id).await;
    rows.append(&mut fetched);

    let error_summary = join_errors(&errors);
    let summary = complete_run(store, policy, &run, rows, errors).await?;
    if options.strict && summary.errors > 0 {
        match error_summary {
            Some(provider_errors) => bail!(provider_errors),
            None => bail!(
                "{} write error(s); see run {}",
                summary.errors,
                run.run_id
            ),
        }
    }
    Ok(summary)
}
