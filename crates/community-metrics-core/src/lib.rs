//! # Community Metrics Core
//!
//! Time-series reconciliation and aggregation for package download and
//! repository star metrics.
//!
//! Observations arrive sparse and mixed: daily API deltas, cumulative star
//! counts, and discrete snapshots from legacy CSV exports. This crate turns
//! them into dashboard views:
//!
//! | Module | Role |
//! |--------|------|
//! | [`interpolate`] | Gap-fill a sparse series into one value per day |
//! | [`sparkline`] | Trim a daily series to the trailing N days |
//! | [`monthly`] | Blend snapshots and monthly sums of daily rows |
//! | [`window`] | Overlap-weighted rolling-window totals |
//! | [`totals`] | Sum independently interpolated metrics |
//! | [`merge`] | Idempotent range-replace write path |
//! | [`dashboard`], [`history`] | Read-path views over a [`store::SeriesStore`] |
//!
//! This crate contains no tokio runtime, sqlx, HTTP, or filesystem I/O.
//! Storage is reached only through the [`store::SeriesStore`] trait.

pub mod calendar;
pub mod dashboard;
pub mod history;
pub mod interpolate;
pub mod merge;
pub mod models;
pub mod monthly;
pub mod runs;
pub mod sparkline;
pub mod store;
pub mod totals;
pub mod window;
