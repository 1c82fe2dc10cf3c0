//! pypistats.org daily downloads (mirrors included).

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;

use super::http::JsonClient;
use super::parse_day;

const BASE_URL: &str = "https://pypistats.org/api/packages";

#[derive(Debug, Deserialize)]
struct OverallResponse {
    #[serde(default)]
    data: Vec<OverallRow>,
}

#[derive(Debug, Deserialize)]
struct OverallRow {
    #[serde(alias = "day")]
    date: Option<String>,
    #[serde(alias = "count")]
    downloads: Option<i64>,
    #[serde(default)]
    category: Option<String>,
}

pub(crate) async fn daily_downloads(
    client: &JsonClient,
    package: &str,
) -> Result<BTreeMap<NaiveDate, i64>> {
    let url = format!("{}/{}/overall", BASE_URL, package);
    let body: OverallResponse = client
        .get_json(&url, &[("mirrors", "true".to_string())], None, None)
        .await?;
    Ok(collect(body))
}

fn collect(body: OverallResponse) -> BTreeMap<NaiveDate, i64> {
    let mut totals = BTreeMap::new();
    for row in body.data {
        // With mirrors=true the payload carries one row per day tagged
        // "with_mirrors"; untagged rows are taken as-is.
        if row.category.as_deref().is_some_and(|c| c != "with_mirrors") {
            continue;
        }
        let (Some(day), Some(downloads)) = (row.date.as_deref().and_then(parse_day), row.downloads)
        else {
            continue;
        };
        *totals.entry(day).or_insert(0) += downloads;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_mirror_rows() {
        let body: OverallResponse = serde_json::from_str(
            r#"{"data": [
                {"category": "with_mirrors", "date": "2026-02-01", "downloads": 10},
                {"category": "without_mirrors", "date": "2026-02-01", "downloads": 7},
                {"category": "with_mirrors", "date": "2026-02-02", "downloads": 12},
                {"date": null, "downloads": 3}
            ]}"#,
        )
        .unwrap();
        let totals = collect(body);
        assert_eq!(totals.len(), 2);
        assert_eq!(totals[&NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()], 10);
    }
}
