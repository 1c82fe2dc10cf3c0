//! Storage abstraction for Community Metrics.
//!
//! The [`SeriesStore`] trait is the narrow capability the aggregation core
//! needs from durable storage: read a metric's observations, atomically
//! replace a metric's date range, and record ingestion runs. Backends
//! (SQLite, in-memory) live behind it so that nothing in the core depends
//! on a storage technology.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{MetricDefinition, Observation};
use crate::runs::RunRecord;

/// Storage failure, classified by whether a retry can help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Busy, locked, not yet visible, unavailable, timed out.
    #[error("transient storage error: {0}")]
    Transient(String),
    /// Authorization, schema, or constraint failure.
    #[error("storage error: {0}")]
    Fatal(String),
}

const TRANSIENT_MARKERS: &[&str] = &[
    "404",
    "503",
    "table not found",
    "no such table",
    "database is locked",
    "database is busy",
    "service unavailable",
    "temporarily unavailable",
    "retry limit",
    "timed out",
    "pool timed out",
];

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// Classify a backend error message.
    ///
    /// Known transient markers win; everything else (including
    /// authorization and schema errors) is fatal.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
            StoreError::Transient(message)
        } else {
            StoreError::Fatal(message)
        }
    }
}

/// Abstract storage backend for observations, run records, and the metric
/// catalog.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`observations`](SeriesStore::observations) | One metric's rows, ascending by `period_end` |
/// | [`all_observations`](SeriesStore::all_observations) | Every stored row |
/// | [`replace_range`](SeriesStore::replace_range) | Delete a metric's `[start, end]` range and insert rows, atomically |
/// | [`upsert_run`](SeriesStore::upsert_run) | Replace a run record by `ingestion_run_id` |
/// | [`runs`](SeriesStore::runs) | All run records |
/// | [`seed_metrics`](SeriesStore::seed_metrics) | Upsert catalog entries by `metric_id` |
/// | [`metric_definitions`](SeriesStore::metric_definitions) | The stored catalog |
#[async_trait]
pub trait SeriesStore: Send + Sync {
    async fn observations(&self, metric_id: &str) -> Result<Vec<Observation>, StoreError>;

    async fn all_observations(&self) -> Result<Vec<Observation>, StoreError>;

    /// Delete every row of `metric_id` with `period_end` in `[start, end]`,
    /// then insert `rows`. Returns the number of rows inserted.
    ///
    /// Callers guarantee `rows` belong to `metric_id`, fall inside the
    /// range, and carry distinct `period_end`s.
    async fn replace_range(
        &self,
        metric_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        rows: &[Observation],
    ) -> Result<u64, StoreError>;

    async fn upsert_run(&self, run: &RunRecord) -> Result<(), StoreError>;

    async fn runs(&self) -> Result<Vec<RunRecord>, StoreError>;

    /// Returns `(inserted, updated)`.
    async fn seed_metrics(&self, metrics: &[MetricDefinition]) -> Result<(u64, u64), StoreError>;

    async fn metric_definitions(&self) -> Result<Vec<MetricDefinition>, StoreError>;

    async fn latest_period_end(&self, metric_id: &str) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self
            .observations(metric_id)
            .await?
            .iter()
            .map(|o| o.period_end)
            .max())
    }
}
