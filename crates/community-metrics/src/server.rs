//! Read-only HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/v1/health` | Health check (returns version) |
//! | `GET` | `/api/v1/definitions` | Metric catalog, sorted |
//! | `GET` | `/api/v1/series/{metric_id}?days=N` | Gap-filled trailing series |
//! | `GET` | `/api/v1/dashboard/daily?days=N` | Grouped dashboard payload |
//! | `GET` | `/api/v1/history/refresh-errors?start_date&end_date&limit` | Failed and partial runs |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid start_date ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404). Storage failures on
//! the read path are logged and served as empty data, never as 5xx.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the dashboard can be
//! served from anywhere.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use community_metrics_core::calendar::parse_iso_date;
use community_metrics_core::dashboard::{
    dashboard_view, definitions_view, series_view, DashboardResponse, SeriesView,
};
use community_metrics_core::history::{
    refresh_errors_view, RefreshErrorsView, DEFAULT_ERROR_LIMIT, MAX_ERROR_LIMIT,
};
use community_metrics_core::models::MetricDefinition;
use community_metrics_core::monthly::Cutover;
use community_metrics_core::store::SeriesStore;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SeriesStore>,
    /// Trailing window used when a request omits `days`.
    pub default_days: usize,
    pub cutover: Cutover,
}

impl AppState {
    pub fn new(store: Arc<dyn SeriesStore>, default_days: usize) -> Self {
        Self {
            store,
            default_days,
            cutover: Cutover::default(),
        }
    }
}

/// Build the router. Exposed separately from [`run_server`] so tests can
/// drive it in-process.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/definitions", get(handle_definitions))
        .route("/api/v1/series/{metric_id}", get(handle_series))
        .route("/api/v1/dashboard/daily", get(handle_dashboard))
        .route(
            "/api/v1/history/refresh-errors",
            get(handle_refresh_errors),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `[server].bind` until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn SeriesStore> = Arc::new(SqliteStore::new(pool));
    let app = build_router(AppState::new(store, config.server.default_days));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "metrics API listening");
    println!("Metrics API listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Parameters arrive as raw strings so that malformed values map onto the
/// error contract instead of the extractor's plain-text rejection.
fn parse_days(raw: Option<&str>, default: usize) -> Result<i64, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default as i64),
        Some(value) => value
            .parse::<i64>()
            .map_err(|_| bad_request(format!("days must be an integer, got '{}'", value))),
    }
}

// ============ GET /api/v1/health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/v1/definitions ============

async fn handle_definitions(State(state): State<AppState>) -> Json<Vec<MetricDefinition>> {
    Json(definitions_view(state.store.as_ref()).await)
}

// ============ GET /api/v1/series/{metric_id} ============

#[derive(Deserialize)]
struct DaysParams {
    days: Option<String>,
}

async fn handle_series(
    State(state): State<AppState>,
    Path(metric_id): Path<String>,
    Query(params): Query<DaysParams>,
) -> Result<Json<SeriesView>, AppError> {
    let days = parse_days(params.days.as_deref(), state.default_days)?;
    series_view(state.store.as_ref(), &metric_id, days)
        .await
        .map(Json)
        .ok_or_else(|| not_found(format!("Unknown metric_id: {}", metric_id)))
}

// ============ GET /api/v1/dashboard/daily ============

async fn handle_dashboard(
    State(state): State<AppState>,
    Query(params): Query<DaysParams>,
) -> Result<Json<DashboardResponse>, AppError> {
    let days = parse_days(params.days.as_deref(), state.default_days)?;
    let today = Utc::now().date_naive();
    Ok(Json(
        dashboard_view(state.store.as_ref(), days, today, state.cutover).await,
    ))
}

// ============ GET /api/v1/history/refresh-errors ============

#[derive(Deserialize)]
struct RefreshErrorsParams {
    start_date: Option<String>,
    end_date: Option<String>,
    limit: Option<String>,
}

fn required_date(raw: Option<&str>, name: &str) -> Result<NaiveDate, AppError> {
    let raw = raw.ok_or_else(|| bad_request(format!("{} is required", name)))?;
    parse_iso_date(raw).map_err(|_| bad_request(format!("invalid {}, expected YYYY-MM-DD", name)))
}

fn parse_limit(raw: Option<&str>) -> Result<usize, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(DEFAULT_ERROR_LIMIT);
    };
    match raw.parse::<usize>() {
        Ok(limit) if (1..=MAX_ERROR_LIMIT).contains(&limit) => Ok(limit),
        _ => Err(bad_request(format!(
            "limit must be an integer in [1, {}]",
            MAX_ERROR_LIMIT
        ))),
    }
}

async fn handle_refresh_errors(
    State(state): State<AppState>,
    Query(params): Query<RefreshErrorsParams>,
) -> Result<Json<RefreshErrorsView>, AppError> {
    let start = required_date(params.start_date.as_deref(), "start_date")?;
    let end = required_date(params.end_date.as_deref(), "end_date")?;
    if start > end {
        return Err(bad_request("start_date must be on or before end_date"));
    }
    let limit = parse_limit(params.limit.as_deref())?;
    Ok(Json(
        refresh_errors_view(state.store.as_ref(), start, end, limit).await,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_days() {
        assert_eq!(parse_days(None, 180).unwrap(), 180);
        assert_eq!(parse_days(Some(""), 180).unwrap(), 180);
        assert_eq!(parse_days(Some("-3"), 180).unwrap(), -3);
        assert!(parse_days(Some("ten"), 180).is_err());
    }

    #[test]
    fn test_parse_limit_bounds() {
        assert_eq!(parse_limit(None).unwrap(), DEFAULT_ERROR_LIMIT);
        assert_eq!(parse_limit(Some("5000")).unwrap(), 5000);
        assert!(parse_limit(Some("0")).is_err());
        assert!(parse_limit(Some("5001")).is_err());
    }
}
