//! Refresh-error history: failed or partial runs within a date range.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::dashboard::or_empty;
use crate::runs::{RunRecord, RunStatus};
use crate::store::SeriesStore;

pub const DEFAULT_ERROR_LIMIT: usize = 500;
pub const MAX_ERROR_LIMIT: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshError {
    pub ingestion_run_id: String,
    pub job_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error_summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshErrorsView {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub count: usize,
    pub errors: Vec<RefreshError>,
}

/// Runs with a non-empty error summary that finished within
/// `[start, end]`, newest first, at most `limit` of them.
pub fn refresh_errors(
    runs: Vec<RunRecord>,
    start: NaiveDate,
    end: NaiveDate,
    limit: usize,
) -> Vec<RefreshError> {
    let mut matches: Vec<RefreshError> = runs
        .into_iter()
        .filter(|run| run.has_error())
        .filter(|run| (start..=end).contains(&run.finished_day()))
        .map(|run| RefreshError {
            error_summary: run.error_summary.unwrap_or_default().trim().to_string(),
            ingestion_run_id: run.ingestion_run_id,
            job_name: run.job_name,
            status: run.status,
            started_at: run.started_at,
            finished_at: run.finished_at,
        })
        .collect();
    matches.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
    matches.truncate(limit);
    matches
}

pub async fn refresh_errors_view<S: SeriesStore + ?Sized>(
    store: &S,
    start: NaiveDate,
    end: NaiveDate,
    limit: usize,
) -> RefreshErrorsView {
    let runs = or_empty(store.runs().await, "run history");
    let errors = refresh_errors(runs, start, end, limit.clamp(1, MAX_ERROR_LIMIT));
    RefreshErrorsView {
        start_date: start,
        end_date: end,
        count: errors.len(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run(id: &str, day: u32, summary: Option<&str>) -> RunRecord {
        let at = Utc.with_ymd_and_hms(2026, 2, day, 12, 0, 0).unwrap();
        RunRecord {
            ingestion_run_id: id.to_string(),
            job_name: "daily_refresh".to_string(),
            started_at: at,
            finished_at: at,
            status: if summary.is_some() {
                RunStatus::Partial
            } else {
                RunStatus::Success
            },
            rows_inserted: 0,
            rows_updated: 0,
            error_summary: summary.map(str::to_string),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    #[test]
    fn test_filters_by_range_and_error_presence() {
        let runs = vec![
            run("a", 1, Some("timeout")),
            run("b", 5, None),
            run("c", 6, Some("   ")),
            run("d", 7, Some("503")),
            run("e", 20, Some("late")),
        ];
        let errors = refresh_errors(runs, day(1), day(10), 500);
        let ids: Vec<&str> = errors.iter().map(|e| e.ingestion_run_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a"]);
    }

    #[test]
    fn test_limit_keeps_newest() {
        let runs = vec![run("a", 1, Some("x")), run("b", 2, Some("y")), run("c", 3, Some("z"))];
        let errors = refresh_errors(runs, day(1), day(28), 2);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].ingestion_run_id, "c");
        assert_eq!(errors[1].ingestion_run_id, "b");
    }
}
