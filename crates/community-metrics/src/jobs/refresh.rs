//! Combined daily refresh: downloads, then stars, under one run id.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tracing::info;

use community_metrics_core::runs::new_ingestion_run_id;
use community_metrics_core::store::SeriesStore;

use super::downloads::update_downloads;
use super::stars::update_stars;
use super::{JobSummary, RetryPolicy};
use crate::sources::{DownloadsSource, StarsSource};

pub const JOB_NAME: &str = "daily_refresh";

/// Run both daily jobs. Each records its own run, `{id}:downloads` and
/// `{id}:stars`; the returned summary is their sum. A downloads failure
/// aborts before stars run.
pub async fn run_refresh<S>(
    store: &S,
    downloads: &dyn DownloadsSource,
    stars: &dyn StarsSource,
    policy: &RetryPolicy,
    lookback_days: u32,
    today: NaiveDate,
) -> Result<JobSummary>
where
    S: SeriesStore + ?Sized,
{
    let run_id = new_ingestion_run_id(JOB_NAME, Utc::now());
    info!(%run_id, lookback_days, "starting daily refresh");

    let mut summary = update_downloads(
        store,
        downloads,
        policy,
        Some(format!("{}:downloads", run_id)),
        lookback_days,
        today,
    )
    .await?;
    summary.add(
        update_stars(
            store,
            stars,
            policy,
            Some(format!("{}:stars", run_id)),
            lookback_days,
            today,
        )
        .await?,
    );

    info!(%run_id, %summary, "daily refresh finished");
    Ok(summary)
}
