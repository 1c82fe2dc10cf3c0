//! crates.io per-day downloads.
//!
//! The endpoint reports recent days only, split into per-version rows plus
//! `meta.extra_downloads` for versions outside the top set. Both are summed
//! per day.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;

use super::http::JsonClient;
use super::parse_day;

const BASE_URL: &str = "https://crates.io/api/v1/crates";

#[derive(Debug, Deserialize)]
struct DownloadsResponse {
    #[serde(default)]
    version_downloads: Vec<DayRow>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    extra_downloads: Vec<DayRow>,
}

#[derive(Debug, Deserialize)]
struct DayRow {
    date: Option<String>,
    downloads: Option<i64>,
}

pub(crate) async fn daily_downloads(
    client: &JsonClient,
    crate_name: &str,
) -> Result<BTreeMap<NaiveDate, i64>> {
    let url = format!("{}/{}/downloads", BASE_URL, crate_name);
    let body: DownloadsResponse = client.get_json(&url, &[], None, None).await?;
    Ok(sum_by_day(body))
}

fn sum_by_day(body: DownloadsResponse) -> BTreeMap<NaiveDate, i64> {
    let mut totals = BTreeMap::new();
    for row in body
        .version_downloads
        .into_iter()
        .chain(body.meta.extra_downloads)
    {
        if let (Some(day), Some(n)) = (row.date.as_deref().and_then(parse_day), row.downloads) {
            *totals.entry(day).or_insert(0) += n;
        }
    }
    totals
}
