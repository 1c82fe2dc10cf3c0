use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;

/// Create the schema, optionally dropping existing tables first.
pub async fn run_migrations(config: &Config, reset: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    create_tables(&pool, reset).await?;
    pool.close().await;
    Ok(())
}

pub async fn create_tables(pool: &SqlitePool, reset: bool) -> Result<()> {
    if reset {
        for table in ["stats", "history", "metrics"] {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(pool)
                .await?;
        }
        info!("dropped metrics, stats and history tables");
    }

    // Static metric catalog
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics (
            metric_id TEXT PRIMARY KEY,
            metric_family TEXT NOT NULL,
            product TEXT NOT NULL,
            subject TEXT NOT NULL,
            sdk TEXT,
            source TEXT NOT NULL,
            value_kind TEXT NOT NULL,
            unit TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            display_name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Observations, one per (metric_id, period_end)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stats (
            metric_id TEXT NOT NULL,
            period_start TEXT NOT NULL,
            period_end TEXT NOT NULL,
            value INTEGER NOT NULL,
            provenance TEXT NOT NULL,
            source_window TEXT NOT NULL,
            observed_at TEXT NOT NULL,
            source_ref TEXT NOT NULL DEFAULT '',
            ingestion_run_id TEXT NOT NULL DEFAULT '',
            UNIQUE(metric_id, period_end)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Ingestion run records
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS history (
            ingestion_run_id TEXT PRIMARY KEY,
            job_name TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            status TEXT NOT NULL,
            rows_inserted INTEGER NOT NULL DEFAULT 0,
            rows_updated INTEGER NOT NULL DEFAULT 0,
            error_summary TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_stats_metric_id ON stats(metric_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_finished_at ON history(finished_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
