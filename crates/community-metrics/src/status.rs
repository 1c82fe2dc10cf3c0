//! Database overview for `cmetrics status`.
//!
//! Prints how many observations each metric holds, the latest stored
//! `period_end`, and the most recent ingestion run, so a glance confirms
//! the scheduled refresh is keeping up.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::config::Config;
use crate::db;

struct MetricStats {
    metric_id: String,
    rows: i64,
    latest_period_end: Option<String>,
}

pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stats")
        .fetch_one(&pool)
        .await?;
    let total_runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM history")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Community Metrics Status");
    println!("========================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();
    println!("  Observations:  {}", total_rows);
    println!("  Runs:          {}", total_runs);

    let rows = sqlx::query(
        r#"
        SELECT
            m.metric_id,
            COUNT(s.metric_id) AS row_count,
            MAX(s.period_end) AS latest_period_end
        FROM metrics m
        LEFT JOIN stats s ON s.metric_id = m.metric_id
        GROUP BY m.metric_id
        ORDER BY m.metric_id
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let metrics: Vec<MetricStats> = rows
        .iter()
        .map(|row| MetricStats {
            metric_id: row.get("metric_id"),
            rows: row.get("row_count"),
            latest_period_end: row.get("latest_period_end"),
        })
        .collect();

    if !metrics.is_empty() {
        println!();
        println!("  By metric:");
        println!("  {:<28} {:>8}   {}", "METRIC", "ROWS", "LATEST");
        println!("  {}", "-".repeat(52));
        for m in &metrics {
            println!(
                "  {:<28} {:>8}   {}",
                m.metric_id,
                m.rows,
                m.latest_period_end.as_deref().unwrap_or("-")
            );
        }
    }

    let last_run = sqlx::query(
        "SELECT ingestion_run_id, job_name, status, finished_at, error_summary \
         FROM history ORDER BY finished_at DESC LIMIT 1",
    )
    .fetch_optional(&pool)
    .await?;

    println!();
    match last_run {
        Some(row) => {
            let finished_at: String = row.get("finished_at");
            let finished = DateTime::parse_from_rfc3339(&finished_at)
                .map(|t| format_relative(t.with_timezone(&Utc), Utc::now()))
                .unwrap_or(finished_at);
            let status: String = row.get("status");
            let job: String = row.get("job_name");
            let run_id: String = row.get("ingestion_run_id");
            println!("  Last run:      {} ({}, {})", run_id, job, status);
            println!("  Finished:      {}", finished);
            if let Some(summary) = row.get::<Option<String>, _>("error_summary") {
                println!("  Errors:        {}", summary);
            }
        }
        None => println!("  Last run:      never"),
    }
    println!();

    pool.close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// "3 hours ago" style rendering; older than 30 days falls back to a date.
fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - at).num_seconds();
    if delta < 0 || delta >= 86400 * 30 {
        return at.format("%Y-%m-%d %H:%M").to_string();
    }
    let plural = |n: i64| if n == 1 { "" } else { "s" };
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, plural(mins))
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, plural(hours))
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, plural(days))
    }
}
