//! # Community Metrics
//!
//! **Download and star history for the lance and lancedb projects.**
//!
//! Daily jobs pull counts from package registries and GitHub into a sparse
//! SQLite time series; a read-only HTTP API serves gap-filled sparklines,
//! monthly download roll-ups, and rolling totals computed by
//! [`community_metrics_core`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Providers   │──▶│    Jobs      │──▶│  SQLite  │
//! │ pypi/npm/... │   │ merge+retry  │   │  stats   │
//! └──────────────┘   └──────────────┘   └────┬─────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   │(cmetrics)│       │  (axum)  │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema creation and reset |
//! | [`sqlite_store`] | `SeriesStore` over SQLite |
//! | [`sources`] | Provider traits and HTTP clients |
//! | [`jobs`] | Ingestion jobs: daily updates, refresh, seed, recompute |
//! | [`server`] | Read-only HTTP API |
//! | [`status`] | `cmetrics status` overview |

pub mod config;
pub mod db;
pub mod jobs;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sources;
pub mod sqlite_store;
pub mod status;
