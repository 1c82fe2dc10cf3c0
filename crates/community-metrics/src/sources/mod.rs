//! Upstream statistics providers.
//!
//! Jobs talk to providers only through [`DownloadsSource`] and
//! [`StarsSource`], so they can be exercised with in-process fakes. The
//! HTTP implementation, [`HttpSources`], is a set of thin `reqwest` clients:
//!
//! | Provider | Endpoint | Module |
//! |----------|----------|--------|
//! | pypistats | `/api/packages/{pkg}/overall?mirrors=true` | [`pypistats`] |
//! | npm | `/downloads/range/{start}:{end}/{pkg}` | [`npm`] |
//! | crates.io | `/api/v1/crates/{name}/downloads` | [`crates_io`] |
//! | GitHub | `/repos/{repo}`, `/repos/{repo}/stargazers` | [`github`] |

pub mod crates_io;
pub mod github;
mod http;
pub mod npm;
pub mod pypistats;

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::config::SourcesConfig;
use http::JsonClient;

/// Where a download metric's counts come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadProvider {
    PyPi,
    Npm,
    Crates,
}

impl DownloadProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadProvider::PyPi => "pypi",
            DownloadProvider::Npm => "npm",
            DownloadProvider::Crates => "crates",
        }
    }

    /// Whether days the provider does not report count as zero downloads.
    /// crates.io only reports a recent window, so its gaps mean "unknown".
    pub fn missing_days_are_zero(&self) -> bool {
        !matches!(self, DownloadProvider::Crates)
    }
}

impl fmt::Display for DownloadProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked download metric and the package it counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadTarget {
    pub metric_id: &'static str,
    pub provider: DownloadProvider,
    pub package: &'static str,
}

impl DownloadTarget {
    pub fn source_ref(&self) -> String {
        format!("{}:{}", self.provider, self.package)
    }
}

pub const DOWNLOAD_TARGETS: [DownloadTarget; 5] = [
    DownloadTarget {
        metric_id: "downloads:lance:python",
        provider: DownloadProvider::PyPi,
        package: "pylance",
    },
    DownloadTarget {
        metric_id: "downloads:lance:rust",
        provider: DownloadProvider::Crates,
        package: "lance",
    },
    DownloadTarget {
        metric_id: "downloads:lancedb:python",
        provider: DownloadProvider::PyPi,
        package: "lancedb",
    },
    DownloadTarget {
        metric_id: "downloads:lancedb:nodejs",
        provider: DownloadProvider::Npm,
        package: "@lancedb/lancedb",
    },
    DownloadTarget {
        metric_id: "downloads:lancedb:rust",
        provider: DownloadProvider::Crates,
        package: "lancedb",
    },
];

/// One tracked star metric and its repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarTarget {
    pub metric_id: &'static str,
    pub repo: &'static str,
}

pub const STAR_TARGETS: [StarTarget; 2] = [
    StarTarget {
        metric_id: "stars:lance:github",
        repo: "lance-format/lance",
    },
    StarTarget {
        metric_id: "stars:lancedb:github",
        repo: "lancedb/lancedb",
    },
];

pub fn star_metric_for_repo(repo: &str) -> Option<&'static str> {
    STAR_TARGETS
        .iter()
        .find(|t| t.repo == repo)
        .map(|t| t.metric_id)
}

/// Daily download counts.
#[async_trait]
pub trait DownloadsSource: Send + Sync {
    /// Per-day downloads for `package`. Providers that take a range are
    /// asked for `[start, end]`; others return whatever window they keep.
    async fn daily_downloads(
        &self,
        provider: DownloadProvider,
        package: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, i64>>;
}

/// Repository star counts.
#[async_trait]
pub trait StarsSource: Send + Sync {
    /// Current total star count.
    async fn repo_stars(&self, repo: &str) -> Result<i64>;

    /// When each current stargazer starred the repository.
    async fn stargazer_times(&self, repo: &str) -> Result<Vec<DateTime<Utc>>>;
}

/// Live providers over HTTPS.
pub struct HttpSources {
    client: JsonClient,
    github_token: Option<String>,
}

impl HttpSources {
    pub fn new(config: &SourcesConfig) -> Result<Self> {
        Ok(Self {
            client: JsonClient::new(config)?,
            github_token: config.github_token(),
        })
    }
}

#[async_trait]
impl DownloadsSource for HttpSources {
    async fn daily_downloads(
        &self,
        provider: DownloadProvider,
        package: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, i64>> {
        match provider {
            DownloadProvider::PyPi => pypistats::daily_downloads(&self.client, package).await,
            DownloadProvider::Npm => npm::daily_downloads(&self.client, package, start, end).await,
            DownloadProvider::Crates => crates_io::daily_downloads(&self.client, package).await,
        }
    }
}

#[async_trait]
impl StarsSource for HttpSources {
    async fn repo_stars(&self, repo: &str) -> Result<i64> {
        github::repo_stars(&self.client, self.github_token.as_deref(), repo).await
    }

    async fn stargazer_times(&self, repo: &str) -> Result<Vec<DateTime<Utc>>> {
        github::stargazer_times(&self.client, self.github_token.as_deref(), repo).await
    }
}

/// Parse a `YYYY-MM-DD` (or longer ISO) day string from a provider payload.
pub(crate) fn parse_day(raw: &str) -> Option<NaiveDate> {
    raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_cover_catalog() {
        let catalog = community_metrics_core::models::metric_catalog();
        for target in DOWNLOAD_TARGETS {
            assert!(catalog.iter().any(|m| m.metric_id == target.metric_id));
        }
        for target in STAR_TARGETS {
            let metric = catalog
                .iter()
                .find(|m| m.metric_id == target.metric_id)
                .unwrap();
            assert_eq!(metric.subject, target.repo);
        }
    }

    #[test]
    fn test_source_ref_and_repo_lookup() {
        assert_eq!(DOWNLOAD_TARGETS[3].source_ref(), "npm:@lancedb/lancedb");
        assert_eq!(star_metric_for_repo("lancedb/lancedb"), Some("stars:lancedb:github"));
        assert_eq!(star_metric_for_repo("other/repo"), None);
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(parse_day("2026-02-01"), NaiveDate::from_ymd_opt(2026, 2, 1));
        assert_eq!(parse_day("2026-02-01T00:00:00Z"), NaiveDate::from_ymd_opt(2026, 2, 1));
        assert_eq!(parse_day("bad"), None);
    }
}
