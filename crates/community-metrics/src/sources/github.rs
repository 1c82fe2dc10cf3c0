//! GitHub repository star counts and stargazer timestamps.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::http::JsonClient;

const BASE_URL: &str = "https://api.github.com";
const JSON_MEDIA: &str = "application/vnd.github+json";
const STAR_MEDIA: &str = "application/vnd.github.star+json";
const PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct Repo {
    #[serde(default)]
    stargazers_count: i64,
}

#[derive(Debug, Deserialize)]
struct Stargazer {
    starred_at: Option<DateTime<Utc>>,
}

pub(crate) async fn repo_stars(
    client: &JsonClient,
    token: Option<&str>,
    repo: &str,
) -> Result<i64> {
    let url = format!("{}/repos/{}", BASE_URL, repo);
    let body: Repo = client.get_json(&url, &[], Some(JSON_MEDIA), token).await?;
    Ok(body.stargazers_count)
}

/// Walk every stargazers page until an empty one. Returned times are
/// sorted ascending.
pub(crate) async fn stargazer_times(
    client: &JsonClient,
    token: Option<&str>,
    repo: &str,
) -> Result<Vec<DateTime<Utc>>> {
    let url = format!("{}/repos/{}/stargazers", BASE_URL, repo);
    let mut times = Vec::new();
    let mut page = 1u32;
    loop {
        let query = [("per_page", PER_PAGE.to_string()), ("page", page.to_string())];
        let rows: Vec<Stargazer> = client
            .get_json(&url, &query, Some(STAR_MEDIA), token)
            .await?;
        if rows.is_empty() {
            break;
        }
        times.extend(rows.into_iter().filter_map(|r| r.starred_at));
        page += 1;
    }
    times.sort();
    Ok(times)
}
