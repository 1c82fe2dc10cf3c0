//! SQLite-backed [`SeriesStore`] implementation.
//!
//! Dates are stored as `YYYY-MM-DD` text and timestamps as RFC 3339 text,
//! so lexical order matches chronological order. Rows that fail validation
//! on the way out are skipped with a warning rather than failing the read.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use community_metrics_core::models::{
    MetricDefinition, MetricFamily, Observation, ObservationInput,
};
use community_metrics_core::runs::{RunRecord, RunStatus};
use community_metrics_core::store::{SeriesStore, StoreError};

/// SQLite implementation of the [`SeriesStore`] trait over the `metrics`,
/// `stats`, and `history` tables.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Classify a sqlx error. Pool exhaustion and I/O failures are retryable;
/// database errors are classified by message (busy, locked, missing table).
pub fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Transient(err.to_string())
        }
        _ => StoreError::from_message(err.to_string()),
    }
}

const STATS_COLUMNS: &str = "metric_id, period_start, period_end, value, provenance, \
     source_window, observed_at, source_ref, ingestion_run_id";

fn observation_from_row(row: &SqliteRow) -> Option<Observation> {
    let input = ObservationInput {
        metric_id: row.get("metric_id"),
        period_start: row.get("period_start"),
        period_end: row.get("period_end"),
        value: row.get("value"),
        provenance: row.get("provenance"),
        source_window: row.get("source_window"),
        observed_at: row.get("observed_at"),
        source_ref: row.get("source_ref"),
        ingestion_run_id: row.get("ingestion_run_id"),
    };
    let metric_id = input.metric_id.clone();
    match Observation::try_from_input(input) {
        Ok(obs) => Some(obs),
        Err(e) => {
            warn!(metric_id = %metric_id, error = %e, "skipping unreadable stats row");
            None
        }
    }
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn run_from_row(row: &SqliteRow) -> Option<RunRecord> {
    let run_id: String = row.get("ingestion_run_id");
    let started: String = row.get("started_at");
    let finished: String = row.get("finished_at");
    let (Some(started_at), Some(finished_at)) = (parse_ts(&started), parse_ts(&finished)) else {
        warn!(run_id = %run_id, "skipping history row with unreadable timestamps");
        return None;
    };
    let status: String = row.get("status");
    Some(RunRecord {
        ingestion_run_id: run_id,
        job_name: row.get("job_name"),
        started_at,
        finished_at,
        status: RunStatus::parse(&status),
        rows_inserted: row.get::<i64, _>("rows_inserted").max(0) as u64,
        rows_updated: row.get::<i64, _>("rows_updated").max(0) as u64,
        error_summary: row.get("error_summary"),
    })
}

fn metric_from_row(row: &SqliteRow) -> Option<MetricDefinition> {
    let metric_id: String = row.get("metric_id");
    let family: String = row.get("metric_family");
    let Some(metric_family) = MetricFamily::parse(&family) else {
        warn!(metric_id = %metric_id, family = %family, "skipping metric with unknown family");
        return None;
    };
    Some(MetricDefinition {
        metric_id,
        metric_family,
        product: row.get("product"),
        subject: row.get("subject"),
        sdk: row.get("sdk"),
        source: row.get("source"),
        value_kind: row.get("value_kind"),
        unit: row.get("unit"),
        is_active: row.get::<i64, _>("is_active") != 0,
        display_name: row.get("display_name"),
    })
}

#[async_trait]
impl SeriesStore for SqliteStore {
    async fn observations(&self, metric_id: &str) -> Result<Vec<Observation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM stats WHERE metric_id = ? ORDER BY period_end ASC",
            STATS_COLUMNS
        ))
        .bind(metric_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.iter().filter_map(observation_from_row).collect())
    }

    async fn all_observations(&self) -> Result<Vec<Observation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM stats ORDER BY metric_id ASC, period_end ASC",
            STATS_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.iter().filter_map(observation_from_row).collect())
    }

    async fn replace_range(
        &self,
        metric_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[Observation],
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        sqlx::query("DELETE FROM stats WHERE metric_id = ? AND period_end >= ? AND period_end <= ?")
            .bind(metric_id)
            .bind(start.to_string())
            .bind(end.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        let mut written = 0u64;
        for row in rows {
            sqlx::query(&format!(
                r#"
                INSERT INTO stats ({})
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(metric_id, period_end) DO UPDATE SET
                    period_start = excluded.period_start,
                    value = excluded.value,
                    provenance = excluded.provenance,
                    source_window = excluded.source_window,
                    observed_at = excluded.observed_at,
                    source_ref = excluded.source_ref,
                    ingestion_run_id = excluded.ingestion_run_id
                "#,
                STATS_COLUMNS
            ))
            .bind(metric_id)
            .bind(row.period_start.to_string())
            .bind(row.period_end.to_string())
            .bind(row.value)
            .bind(row.provenance.as_str())
            .bind(row.source_window.as_str())
            .bind(row.observed_at.to_rfc3339())
            .bind(&row.source_ref)
            .bind(&row.ingestion_run_id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
            written += 1;
        }

        tx.commit().await.map_err(store_error)?;
        Ok(written)
    }

    async fn upsert_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        sqlx::query("DELETE FROM history WHERE ingestion_run_id = ?")
            .bind(&run.ingestion_run_id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        sqlx::query(
            r#"
            INSERT INTO history (ingestion_run_id, job_name, started_at, finished_at,
                                 status, rows_inserted, rows_updated, error_summary)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.ingestion_run_id)
        .bind(&run.job_name)
        .bind(run.started_at.to_rfc3339())
        .bind(run.finished_at.to_rfc3339())
        .bind(run.status.as_str())
        .bind(run.rows_inserted as i64)
        .bind(run.rows_updated as i64)
        .bind(&run.error_summary)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT ingestion_run_id, job_name, started_at, finished_at, status,
                   rows_inserted, rows_updated, error_summary
            FROM history
            ORDER BY finished_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.iter().filter_map(run_from_row).collect())
    }

    async fn seed_metrics(&self, metrics: &[MetricDefinition]) -> Result<(u64, u64), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let mut inserted = 0u64;
        let mut updated = 0u64;

        for metric in metrics {
            let exists: bool =
                sqlx::query_scalar("SELECT COUNT(*) > 0 FROM metrics WHERE metric_id = ?")
                    .bind(&metric.metric_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(store_error)?;

            sqlx::query(
                r#"
                INSERT INTO metrics (metric_id, metric_family, product, subject, sdk, source,
                                     value_kind, unit, is_active, display_name)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(metric_id) DO UPDATE SET
                    metric_family = excluded.metric_family,
                    product = excluded.product,
                    subject = excluded.subject,
                    sdk = excluded.sdk,
                    source = excluded.source,
                    value_kind = excluded.value_kind,
                    unit = excluded.unit,
                    is_active = excluded.is_active,
                    display_name = excluded.display_name
                "#,
            )
            .bind(&metric.metric_id)
            .bind(metric.metric_family.as_str())
            .bind(&metric.product)
            .bind(&metric.subject)
            .bind(&metric.sdk)
            .bind(&metric.source)
            .bind(&metric.value_kind)
            .bind(&metric.unit)
            .bind(metric.is_active as i64)
            .bind(&metric.display_name)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

            if exists {
                updated += 1;
            } else {
                inserted += 1;
            }
        }

        tx.commit().await.map_err(store_error)?;
        Ok((inserted, updated))
    }

    async fn metric_definitions(&self) -> Result<Vec<MetricDefinition>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT metric_id, metric_family, product, subject, sdk, source,
                   value_kind, unit, is_active, display_name
            FROM metrics
            ORDER BY metric_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(rows.iter().filter_map(metric_from_row).collect())
    }

    async fn latest_period_end(&self, metric_id: &str) -> Result<Option<NaiveDate>, StoreError> {
        let latest: Option<String> =
            sqlx::query_scalar("SELECT MAX(period_end) FROM stats WHERE metric_id = ?")
                .bind(metric_id)
                .fetch_one(&self.pool)
                .await
                .map_err(store_error)?;

        Ok(latest.and_then(|raw| raw.get(..10).and_then(|d| d.parse().ok())))
    }
}
