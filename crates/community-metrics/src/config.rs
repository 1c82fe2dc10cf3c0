//! Configuration parsing and validation.
//!
//! Community Metrics is configured via a TOML file (default:
//! `config/metrics.toml`). Every section except `[db]` is optional and
//! falls back to the defaults below.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/metrics.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [sources]
//! timeout_secs = 30
//! max_retries = 5
//! github_token_env = "GITHUB_TOKEN"
//!
//! [refresh]
//! lookback_days = 1
//! recompute_lookback_days = 90
//!
//! [seed]
//! data_dir = "./seed_data"
//! downloads_file = "download_stats.csv"
//! star_files = ["lance-star-history-2026220.csv", "lancedb-star-history-2026220.csv"]
//! ```
//!
//! Secrets never live in the file. The GitHub token is read once from the
//! environment variable named by `sources.github_token_env`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use community_metrics_core::sparkline::MAX_DAYS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/metrics.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Trailing window served when a request omits `days`.
    #[serde(default = "default_days")]
    pub default_days: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_days: default_days(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_days() -> usize {
    community_metrics_core::sparkline::DEFAULT_DAYS
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_github_token_env")]
    pub github_token_env: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            github_token_env: default_github_token_env(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_user_agent() -> String {
    concat!("community-metrics/", env!("CARGO_PKG_VERSION")).to_string()
}

impl SourcesConfig {
    /// The GitHub token, if the configured variable is set and non-empty.
    pub fn github_token(&self) -> Option<String> {
        std::env::var(&self.github_token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RefreshConfig {
    /// Trailing days re-fetched by `refresh` even when already stored.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    #[serde(default = "default_recompute_lookback_days")]
    pub recompute_lookback_days: u32,
    /// Attempts for each storage call before a transient error is final.
    #[serde(default = "default_store_attempts")]
    pub store_attempts: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
            recompute_lookback_days: default_recompute_lookback_days(),
            store_attempts: default_store_attempts(),
        }
    }
}

fn default_lookback_days() -> u32 {
    1
}
fn default_recompute_lookback_days() -> u32 {
    90
}
fn default_store_attempts() -> u32 {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedConfig {
    #[serde(default = "default_seed_dir")]
    pub data_dir: PathBuf,
    /// Monthly download snapshots, one column per download metric.
    #[serde(default = "default_downloads_file")]
    pub downloads_file: String,
    /// Star-history exports (`Repository`, `Date`, `Stars`).
    #[serde(default = "default_star_files")]
    pub star_files: Vec<String>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            data_dir: default_seed_dir(),
            downloads_file: default_downloads_file(),
            star_files: default_star_files(),
        }
    }
}

fn default_seed_dir() -> PathBuf {
    PathBuf::from("./seed_data")
}
fn default_downloads_file() -> String {
    "download_stats.csv".to_string()
}
fn default_star_files() -> Vec<String> {
    vec![
        "lance-star-history-2026220.csv".to_string(),
        "lancedb-star-history-2026220.csv".to_string(),
    ]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.db.path.as_os_str().is_empty() {
        anyhow::bail!("db.path must not be empty");
    }

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }
    if !(1..=MAX_DAYS).contains(&config.server.default_days) {
        anyhow::bail!("server.default_days must be in [1, {}]", MAX_DAYS);
    }

    if config.sources.timeout_secs == 0 {
        anyhow::bail!("sources.timeout_secs must be > 0");
    }
    if config.sources.github_token_env.trim().is_empty() {
        anyhow::bail!("sources.github_token_env must not be empty");
    }

    if config.refresh.recompute_lookback_days == 0 {
        anyhow::bail!("refresh.recompute_lookback_days must be >= 1");
    }
    if config.refresh.store_attempts == 0 {
        anyhow::bail!("refresh.store_attempts must be >= 1");
    }

    Ok(())
}
