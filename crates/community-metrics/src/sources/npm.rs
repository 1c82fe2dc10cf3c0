//! npm registry range downloads.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;

use super::http::JsonClient;
use super::parse_day;

const BASE_URL: &str = "https://api.npmjs.org/downloads/range";

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    downloads: Vec<RangeRow>,
}

#[derive(Debug, Deserialize)]
struct RangeRow {
    day: Option<String>,
    downloads: Option<i64>,
}

/// Scoped names keep their `@` but the `/` is percent-encoded.
fn encode_package(package: &str) -> String {
    package.replace('/', "%2F")
}

pub(crate) async fn daily_downloads(
    client: &JsonClient,
    package: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<BTreeMap<NaiveDate, i64>> {
    let url = format!("{}/{}:{}/{}", BASE_URL, start, end, encode_package(package));
    let body: RangeResponse = client.get_json(&url, &[], None, None).await?;
    Ok(body
        .downloads
        .into_iter()
        .filter_map(|row| Some((parse_day(row.day.as_deref()?)?, row.downloads?)))
        .collect())
}
