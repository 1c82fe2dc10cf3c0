//! # Community Metrics CLI (`cmetrics`)
//!
//! ## Usage
//!
//! ```bash
//! cmetrics --config ./config/metrics.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cmetrics init` | Create tables and write the metric catalog |
//! | `cmetrics seed` | Import the legacy CSV exports |
//! | `cmetrics refresh` | Update downloads, then stars |
//! | `cmetrics update downloads\|stars` | Run one daily job |
//! | `cmetrics recompute` | Rebuild the trailing window from providers |
//! | `cmetrics series <metric_id>` | Print a gap-filled series |
//! | `cmetrics dashboard` | Print the dashboard payload as JSON |
//! | `cmetrics errors` | List failed and partial runs in a date range |
//! | `cmetrics status` | Row counts, freshness, and the last run |
//! | `cmetrics serve` | Start the read-only HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # First run
//! cmetrics init && cmetrics seed
//!
//! # Scheduled daily
//! cmetrics refresh --lookback-days 3
//!
//! # Rebuild the last 90 days from scratch
//! cmetrics recompute --reset --strict
//! ```

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};

use community_metrics::config::{self, Config};
use community_metrics::jobs::{
    downloads, recompute, refresh, seed, stars, JobSummary, RetryPolicy,
};
use community_metrics::sources::HttpSources;
use community_metrics::sqlite_store::SqliteStore;
use community_metrics::{db, logging, migrate, server, status};
use community_metrics_core::calendar::parse_iso_date;
use community_metrics_core::dashboard::{dashboard_view, series_view};
use community_metrics_core::history::{refresh_errors_view, DEFAULT_ERROR_LIMIT};
use community_metrics_core::models::metric_catalog;
use community_metrics_core::monthly::Cutover;
use community_metrics_core::store::SeriesStore;

/// Community Metrics: download and star history for lance and lancedb.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/metrics.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cmetrics",
    about = "Ingests package download and star counts and serves gap-filled dashboard views",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/metrics.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the tables and write the metric catalog.
    ///
    /// Idempotent. With `--reset`, drops every table first.
    Init {
        /// Drop metrics, stats and history before creating them.
        #[arg(long)]
        reset: bool,
    },

    /// Import the CSV exports from `[seed] data_dir`.
    Seed,

    /// Update downloads, then stars, under one shared run id.
    Refresh {
        /// Trailing days to rewrite even when already stored.
        /// Defaults to `[refresh] lookback_days`.
        #[arg(long)]
        lookback_days: Option<u32>,
    },

    /// Run a single daily job.
    Update {
        #[command(subcommand)]
        job: UpdateJob,
    },

    /// Rebuild the trailing window from providers plus older seed rows.
    Recompute {
        /// Days to rebuild. Defaults to `[refresh] recompute_lookback_days`.
        #[arg(long)]
        lookback_days: Option<u32>,

        /// Exit non-zero if any provider returned an error.
        #[arg(long)]
        strict: bool,

        /// Drop and recreate all tables first.
        #[arg(long)]
        reset: bool,
    },

    /// Print the gap-filled trailing series for one metric.
    Series {
        /// Metric id, e.g. `stars:lance:github`.
        metric_id: String,

        /// Trailing days, clamped to [1, 730].
        #[arg(long)]
        days: Option<i64>,
    },

    /// Print the dashboard payload as JSON.
    Dashboard {
        #[arg(long)]
        days: Option<i64>,
    },

    /// List runs with errors that finished within a date range.
    Errors {
        /// First day (YYYY-MM-DD, UTC, inclusive).
        #[arg(long)]
        start_date: String,

        /// Last day (YYYY-MM-DD, UTC, inclusive).
        #[arg(long)]
        end_date: String,

        /// Maximum runs to list, in [1, 5000].
        #[arg(long, default_value_t = DEFAULT_ERROR_LIMIT)]
        limit: usize,
    },

    /// Show row counts per metric, freshness, and the last run.
    Status,

    /// Start the read-only HTTP API on `[server] bind`.
    Serve,
}

#[derive(Subcommand)]
enum UpdateJob {
    /// Daily download counts from pypistats, npm, and crates.io.
    Downloads {
        /// Use this ingestion run id instead of generating one.
        #[arg(long)]
        run_id: Option<String>,

        #[arg(long, default_value_t = 0)]
        lookback_days: u32,
    },
    /// Daily GitHub star totals.
    Stars {
        #[arg(long)]
        run_id: Option<String>,

        #[arg(long, default_value_t = 0)]
        lookback_days: u32,
    },
}

/// Connect and make sure the schema exists.
async fn open_store(cfg: &Config, reset: bool) -> anyhow::Result<SqliteStore> {
    let pool = db::connect(cfg).await?;
    migrate::create_tables(&pool, reset).await?;
    Ok(SqliteStore::new(pool))
}

fn print_summary(job: &str, summary: &JobSummary) {
    println!("{} complete: {}", job, summary);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_json);

    let cfg = config::load_config(&cli.config)?;
    let policy = RetryPolicy::from_config(&cfg.refresh);
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::Init { reset } => {
            let store = open_store(&cfg, reset).await?;
            let (inserted, updated) = store.seed_metrics(&metric_catalog()).await?;
            println!(
                "Database initialized successfully (metrics inserted={} updated={}).",
                inserted, updated
            );
        }
        Commands::Seed => {
            let store = open_store(&cfg, false).await?;
            let summary = seed::run_seed(&store, &cfg.seed, &policy).await?;
            print_summary(seed::JOB_NAME, &summary);
        }
        Commands::Refresh { lookback_days } => {
            let store = open_store(&cfg, false).await?;
            let sources = HttpSources::new(&cfg.sources)?;
            let lookback = lookback_days.unwrap_or(cfg.refresh.lookback_days);
            let summary =
                refresh::run_refresh(&store, &sources, &sources, &policy, lookback, today).await?;
            print_summary(refresh::JOB_NAME, &summary);
        }
        Commands::Update { job } => {
            let store = open_store(&cfg, false).await?;
            let sources = HttpSources::new(&cfg.sources)?;
            match job {
                UpdateJob::Downloads {
                    run_id,
                    lookback_days,
                } => {
                    let summary = downloads::update_downloads(
                        &store,
                        &sources,
                        &policy,
                        run_id,
                        lookback_days,
                        today,
                    )
                    .await?;
                    print_summary(downloads::JOB_NAME, &summary);
                }
                UpdateJob::Stars {
                    run_id,
                    lookback_days,
                } => {
                    let summary =
                        stars::update_stars(&store, &sources, &policy, run_id, lookback_days, today)
                            .await?;
                    print_summary(stars::JOB_NAME, &summary);
                }
            }
        }
        Commands::Recompute {
            lookback_days,
            strict,
            reset,
        } => {
            let store = open_store(&cfg, reset).await?;
            let sources = HttpSources::new(&cfg.sources)?;
            let options = recompute::RecomputeOptions {
                lookback_days: lookback_days.unwrap_or(cfg.refresh.recompute_lookback_days),
                strict,
            };
            let summary = recompute::run_recompute(
                &store, &sources, &sources, &cfg.seed, &policy, options, today,
            )
            .await?;
            println!(
                "{} complete: lookback_days={} {}",
                recompute::JOB_NAME,
                options.lookback_days,
                summary
            );
        }
        Commands::Series { metric_id, days } => {
            let store = open_store(&cfg, false).await?;
            let days = days.unwrap_or(cfg.server.default_days as i64);
            let view = series_view(&store, &metric_id, days)
                .await
                .with_context(|| format!("Unknown metric_id: {}", metric_id))?;
            for point in &view.points {
                println!("{}  {}", point.period_end, point.value);
            }
        }
        Commands::Dashboard { days } => {
            let store = open_store(&cfg, false).await?;
            let days = days.unwrap_or(cfg.server.default_days as i64);
            let view = dashboard_view(&store, days, today, Cutover::default()).await;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Commands::Errors {
            start_date,
            end_date,
            limit,
        } => {
            let start = parse_iso_date(&start_date)?;
            let end = parse_iso_date(&end_date)?;
            if start > end {
                anyhow::bail!("start_date must be on or before end_date");
            }
            let store = open_store(&cfg, false).await?;
            let view = refresh_errors_view(&store, start, end, limit).await;
            if view.errors.is_empty() {
                println!("No refresh errors between {} and {}.", start, end);
            }
            for err in &view.errors {
                println!(
                    "{}  {}  {}  {}",
                    err.finished_at.format("%Y-%m-%d %H:%M"),
                    err.status,
                    err.ingestion_run_id,
                    err.error_summary
                );
            }
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Serve => {
            open_store(&cfg, false).await?;
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
