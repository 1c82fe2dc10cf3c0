//! Core data models for Community Metrics.
//!
//! [`Observation`] is the atomic fact: one dated value for one metric.
//! Ingestion jobs and storage backends hand rows across the boundary as
//! loosely-typed [`ObservationInput`]s; [`Observation::try_from_input`]
//! validates them into the strongly-typed form every aggregator consumes.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::parse_iso_date;

/// Errors raised while validating an [`ObservationInput`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservationError {
    #[error("metric_id must not be empty")]
    EmptyMetricId,
    #[error("invalid {field} date '{raw}': expected YYYY-MM-DD")]
    InvalidDate { field: &'static str, raw: String },
    #[error("invalid observed_at timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("value must be non-negative, got {0}")]
    NegativeValue(i64),
    #[error("period_end {end} is before period_start {start}")]
    InvertedPeriod { start: NaiveDate, end: NaiveDate },
}

/// How an observation's value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Fresh pull from a provider API by a routine refresh.
    ApiDaily,
    /// Rebuilt from a provider API by a history recompute.
    Recomputed,
    /// Imported from a legacy CSV export.
    CsvSeed,
    Unknown,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::ApiDaily => "api_daily",
            Provenance::Recomputed => "recomputed",
            Provenance::CsvSeed => "csv_seed",
            Provenance::Unknown => "unknown",
        }
    }

    /// Lenient parse: unrecognised tags become [`Provenance::Unknown`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "api_daily" => Provenance::ApiDaily,
            "recomputed" => Provenance::Recomputed,
            "csv_seed" => Provenance::CsvSeed,
            _ => Provenance::Unknown,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling granularity and semantics of an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceWindow {
    /// One day's delta (`"1d"`).
    #[serde(rename = "1d")]
    Daily,
    /// Running total as of `period_end`.
    #[serde(rename = "cumulative_snapshot")]
    CumulativeSnapshot,
    /// A point-in-time total from a sparse historical export.
    #[serde(rename = "discrete_snapshot")]
    DiscreteSnapshot,
    #[serde(rename = "legacy_unknown")]
    LegacyUnknown,
}

impl SourceWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceWindow::Daily => "1d",
            SourceWindow::CumulativeSnapshot => "cumulative_snapshot",
            SourceWindow::DiscreteSnapshot => "discrete_snapshot",
            SourceWindow::LegacyUnknown => "legacy_unknown",
        }
    }

    /// Lenient parse: unrecognised tags become [`SourceWindow::LegacyUnknown`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "1d" => SourceWindow::Daily,
            "cumulative_snapshot" => SourceWindow::CumulativeSnapshot,
            "discrete_snapshot" => SourceWindow::DiscreteSnapshot,
            _ => SourceWindow::LegacyUnknown,
        }
    }
}

impl fmt::Display for SourceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw observation row as handed over by a job or read back from storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationInput {
    pub metric_id: String,
    pub period_start: String,
    pub period_end: String,
    pub value: i64,
    pub provenance: String,
    pub source_window: String,
    /// RFC 3339 timestamp; `None` means "now".
    pub observed_at: Option<String>,
    pub source_ref: String,
    pub ingestion_run_id: String,
}

/// One validated, dated data point for a metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub metric_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub value: i64,
    pub provenance: Provenance,
    pub source_window: SourceWindow,
    pub observed_at: DateTime<Utc>,
    pub source_ref: String,
    pub ingestion_run_id: String,
}

impl Observation {
    /// Validate a raw row.
    ///
    /// Unknown tags are accepted and mapped to their `Unknown` variants;
    /// malformed dates, negative values, and inverted periods are rejected.
    pub fn try_from_input(input: ObservationInput) -> Result<Self, ObservationError> {
        let metric_id = input.metric_id.trim().to_string();
        if metric_id.is_empty() {
            return Err(ObservationError::EmptyMetricId);
        }
        let period_start = parse_boundary_date("period_start", &input.period_start)?;
        let period_end = parse_boundary_date("period_end", &input.period_end)?;
        if period_end < period_start {
            return Err(ObservationError::InvertedPeriod {
                start: period_start,
                end: period_end,
            });
        }
        if input.value < 0 {
            return Err(ObservationError::NegativeValue(input.value));
        }
        let observed_at = match input.observed_at.as_deref().map(str::trim) {
            None | Some("") => Utc::now(),
            Some(raw) => parse_timestamp(raw)?,
        };

        Ok(Self {
            metric_id,
            period_start,
            period_end,
            value: input.value,
            provenance: Provenance::parse(&input.provenance),
            source_window: SourceWindow::parse(&input.source_window),
            observed_at,
            source_ref: input.source_ref,
            ingestion_run_id: input.ingestion_run_id,
        })
    }

    /// Build a single-day observation (`period_start == period_end == day`).
    #[allow(clippy::too_many_arguments)]
    pub fn daily(
        metric_id: impl Into<String>,
        day: NaiveDate,
        value: i64,
        provenance: Provenance,
        source_window: SourceWindow,
        observed_at: DateTime<Utc>,
        source_ref: impl Into<String>,
        ingestion_run_id: impl Into<String>,
    ) -> Self {
        Self {
            metric_id: metric_id.into(),
            period_start: day,
            period_end: day,
            value: value.max(0),
            provenance,
            source_window,
            observed_at,
            source_ref: source_ref.into(),
            ingestion_run_id: ingestion_run_id.into(),
        }
    }

    /// Inclusive length of the observation's period in days.
    pub fn span_days(&self) -> i64 {
        (self.period_end - self.period_start).num_days() + 1
    }

    pub fn to_input(&self) -> ObservationInput {
        ObservationInput {
            metric_id: self.metric_id.clone(),
            period_start: self.period_start.to_string(),
            period_end: self.period_end.to_string(),
            value: self.value,
            provenance: self.provenance.as_str().to_string(),
            source_window: self.source_window.as_str().to_string(),
            observed_at: Some(self.observed_at.to_rfc3339()),
            source_ref: self.source_ref.clone(),
            ingestion_run_id: self.ingestion_run_id.clone(),
        }
    }
}

fn parse_boundary_date(field: &'static str, raw: &str) -> Result<NaiveDate, ObservationError> {
    // Stored values may carry a time suffix; only the calendar date matters.
    let head = raw.trim().get(..10).unwrap_or(raw.trim());
    parse_iso_date(head).map_err(|_| ObservationError::InvalidDate {
        field,
        raw: raw.to_string(),
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ObservationError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw.get(..19).unwrap_or(raw), "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw.get(..19).unwrap_or(raw), "%Y-%m-%dT%H:%M:%S")
        })
        .map(|naive| naive.and_utc())
        .map_err(|_| ObservationError::InvalidTimestamp(raw.to_string()))
}

/// Metric family: decides which aggregation strategy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    /// Per-period deltas, rolled up monthly on the dashboard.
    Downloads,
    /// Cumulative counts, shown as a gap-filled daily sparkline.
    Stars,
}

impl MetricFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricFamily::Downloads => "downloads",
            MetricFamily::Stars => "stars",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "downloads" => Some(MetricFamily::Downloads),
            "stars" => Some(MetricFamily::Stars),
            _ => None,
        }
    }
}

/// Static catalog entry describing one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub metric_id: String,
    pub metric_family: MetricFamily,
    pub product: String,
    pub subject: String,
    pub sdk: Option<String>,
    pub source: String,
    pub value_kind: String,
    pub unit: String,
    pub is_active: bool,
    pub display_name: String,
}

impl MetricDefinition {
    fn downloads(product: &str, subject: &str, sdk: &str, source: &str, display: &str) -> Self {
        Self {
            metric_id: format!("downloads:{}:{}", product, sdk),
            metric_family: MetricFamily::Downloads,
            product: product.to_string(),
            subject: subject.to_string(),
            sdk: Some(sdk.to_string()),
            source: source.to_string(),
            value_kind: "daily_downloads".to_string(),
            unit: "count".to_string(),
            is_active: true,
            display_name: display.to_string(),
        }
    }

    fn github_stars(product: &str, repo: &str) -> Self {
        Self {
            metric_id: format!("stars:{}:github", product),
            metric_family: MetricFamily::Stars,
            product: product.to_string(),
            subject: repo.to_string(),
            sdk: None,
            source: "github".to_string(),
            value_kind: "cumulative_stars".to_string(),
            unit: "count".to_string(),
            is_active: true,
            display_name: "GitHub Stars".to_string(),
        }
    }
}

/// The metrics tracked by the dashboard.
pub fn metric_catalog() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::downloads("lance", "pylance", "python", "pypistats", "Python"),
        MetricDefinition::downloads("lance", "lance", "rust", "cratesio", "Rust"),
        MetricDefinition::downloads("lancedb", "lancedb", "python", "pypistats", "Python"),
        MetricDefinition::downloads("lancedb", "@lancedb/lancedb", "nodejs", "npm", "NodeJS"),
        MetricDefinition::downloads("lancedb", "lancedb", "rust", "cratesio", "Rust"),
        MetricDefinition::github_stars("lance", "lance-format/lance"),
        MetricDefinition::github_stars("lancedb", "lancedb/lancedb"),
    ]
}

/// Product segment of a structured metric id (`family:product:variant`).
///
/// Returns `None` for ids with fewer than three segments.
pub fn metric_product(metric_id: &str) -> Option<&str> {
    let mut parts = metric_id.split(':');
    let _family = parts.next()?;
    let product = parts.next()?;
    parts.next()?;
    Some(product)
}

/// A `(period_start, period_end, value)` triple as served to the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub value: i64,
}

impl SeriesPoint {
    pub fn day(day: NaiveDate, value: i64) -> Self {
        Self {
            period_start: day,
            period_end: day,
            value,
        }
    }
}
