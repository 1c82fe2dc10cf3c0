//! In-memory [`SeriesStore`] implementation for tests and dry runs.
//!
//! Observations are kept per metric in a `BTreeMap` keyed by `period_end`,
//! so the `(metric_id, period_end)` uniqueness invariant holds structurally.
//! Everything sits behind `std::sync::RwLock` for thread safety.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{MetricDefinition, Observation};
use crate::runs::RunRecord;

use super::{SeriesStore, StoreError};

type SeriesMap = BTreeMap<String, BTreeMap<NaiveDate, Observation>>;

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    series: RwLock<SeriesMap>,
    runs: RwLock<BTreeMap<String, RunRecord>>,
    metrics: RwLock<BTreeMap<String, MetricDefinition>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Fatal("in-memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Fatal("in-memory store lock poisoned".to_string()))
}

#[async_trait]
impl SeriesStore for InMemoryStore {
    async fn observations(&self, metric_id: &str) -> Result<Vec<Observation>, StoreError> {
        let series = read(&self.series)?;
        Ok(series
            .get(metric_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn all_observations(&self) -> Result<Vec<Observation>, StoreError> {
        let series = read(&self.series)?;
        Ok(series
            .values()
            .flat_map(|rows| rows.values().cloned())
            .collect())
    }

    async fn replace_range(
        &self,
        metric_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[Observation],
    ) -> Result<u64, StoreError> {
        let mut series = write(&self.series)?;
        let stored = series.entry(metric_id.to_string()).or_default();
        stored.retain(|day, _| *day < start || *day > end);
        for row in rows {
            stored.insert(row.period_end, row.clone());
        }
        if stored.is_empty() {
            series.remove(metric_id);
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        write(&self.runs)?.insert(run.ingestion_run_id.clone(), run.clone());
        Ok(())
    }

    async fn runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        Ok(read(&self.runs)?.values().cloned().collect())
    }

    async fn seed_metrics(&self, metrics: &[MetricDefinition]) -> Result<(u64, u64), StoreError> {
        let mut stored = write(&self.metrics)?;
        let mut inserted = 0;
        let mut updated = 0;
        for metric in metrics {
            match stored.insert(metric.metric_id.clone(), metric.clone()) {
                Some(_) => updated += 1,
                None => inserted += 1,
            }
        }
        Ok((inserted, updated))
    }

    async fn metric_definitions(&self) -> Result<Vec<MetricDefinition>, StoreError> {
        Ok(read(&self.metrics)?.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{metric_catalog, Provenance, SourceWindow};
    use crate::runs::{RunContext, RunStatus};
    use chrono::Utc;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    fn row(day: u32, value: i64) -> Observation {
        Observation::daily(
            "downloads:lance:python",
            d(day),
            value,
            Provenance::ApiDaily,
            SourceWindow::Daily,
            Utc::now(),
            "pypi:pylance",
            "run-1",
        )
    }

    #[tokio::test]
    async fn test_replace_range_deletes_whole_range() {
        let store = InMemoryStore::new();
        store
            .replace_range("downloads:lance:python", d(1), d(5), &[row(1, 1), row(3, 3), row(5, 5)])
            .await
            .unwrap();
        store
            .replace_range("downloads:lance:python", d(2), d(5), &[row(2, 20), row(5, 50)])
            .await
            .unwrap();

        let values: Vec<(NaiveDate, i64)> = store
            .observations("downloads:lance:python")
            .await
            .unwrap()
            .iter()
            .map(|o| (o.period_end, o.value))
            .collect();
        assert_eq!(values, vec![(d(1), 1), (d(2), 20), (d(5), 50)]);
    }

    #[tokio::test]
    async fn test_unknown_metric_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.observations("nope").await.unwrap().is_empty());
        assert_eq!(store.latest_period_end("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_run_replaces_by_id() {
        let store = InMemoryStore::new();
        let run = RunContext::start("seed", Some("seed:1".to_string()));
        store
            .upsert_run(&run.finish(RunStatus::Failed, 0, 0, &["boom".to_string()]))
            .await
            .unwrap();
        store
            .upsert_run(&run.finish(RunStatus::Success, 10, 0, &[]))
            .await
            .unwrap();
        let runs = store.runs().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[0].rows_inserted, 10);
    }

    #[tokio::test]
    async fn test_seed_metrics_counts_inserts_then_updates() {
        let store = InMemoryStore::new();
        let catalog = metric_catalog();
        assert_eq!(store.seed_metrics(&catalog).await.unwrap(), (7, 0));
        assert_eq!(store.seed_metrics(&catalog).await.unwrap(), (0, 7));
        assert_eq!(store.metric_definitions().await.unwrap().len(), 7);
    }
}
