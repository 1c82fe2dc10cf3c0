//! Ingestion run bookkeeping.
//!
//! Every job execution is tracked by one [`RunRecord`], created from a
//! [`RunContext`] at job start and finalized exactly once at job end.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    /// Some metrics failed; the rest were written.
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    /// Unrecognised stored values read back as `Failed`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "success" => RunStatus::Success,
            "partial" => RunStatus::Partial,
            _ => RunStatus::Failed,
        }
    }

    /// `Success` when no errors were collected, `Partial` otherwise.
    pub fn from_errors(errors: &[String]) -> Self {
        if errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finalized ingestion run. Natural key: `ingestion_run_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub ingestion_run_id: String,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub rows_inserted: u64,
    pub rows_updated: u64,
    pub error_summary: Option<String>,
}

impl RunRecord {
    /// UTC calendar day the run finished.
    pub fn finished_day(&self) -> chrono::NaiveDate {
        self.finished_at.date_naive()
    }

    pub fn has_error(&self) -> bool {
        self.error_summary
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

/// A run in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub job_name: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// Start a run, generating an id unless one is supplied.
    pub fn start(job_name: &str, run_id: Option<String>) -> Self {
        let started_at = Utc::now();
        Self {
            job_name: job_name.to_string(),
            run_id: run_id.unwrap_or_else(|| new_ingestion_run_id(job_name, started_at)),
            started_at,
        }
    }

    /// Finalize the run. Errors are joined with `" | "` into the summary.
    pub fn finish(
        &self,
        status: RunStatus,
        rows_inserted: u64,
        rows_updated: u64,
        errors: &[String],
    ) -> RunRecord {
        RunRecord {
            ingestion_run_id: self.run_id.clone(),
            job_name: self.job_name.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            status,
            rows_inserted,
            rows_updated,
            error_summary: join_errors(errors),
        }
    }
}

pub fn join_errors(errors: &[String]) -> Option<String> {
    if errors.is_empty() {
        None
    } else {
        Some(errors.join(" | "))
    }
}

/// `{job}:{YYYYMMDDTHHMMSSZ}:{8 hex}`.
pub fn new_ingestion_run_id(job_name: &str, now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}:{}:{}",
        job_name,
        now.format("%Y%m%dT%H%M%SZ"),
        &suffix[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_id_format() {
        let now = Utc.with_ymd_and_hms(2026, 2, 15, 6, 30, 0).unwrap();
        let id = new_ingestion_run_id("update_daily_downloads", now);
        let parts: Vec<&str> = id.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "update_daily_downloads");
        assert_eq!(parts[1], "20260215T063000Z");
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_finish_joins_errors() {
        let run = RunContext::start("refresh", Some("refresh:fixed".to_string()));
        let errors = vec!["npm: timeout".to_string(), "github: 503".to_string()];
        let record = run.finish(RunStatus::from_errors(&errors), 4, 0, &errors);
        assert_eq!(record.ingestion_run_id, "refresh:fixed");
        assert_eq!(record.status, RunStatus::Partial);
        assert_eq!(record.error_summary.as_deref(), Some("npm: timeout | github: 503"));
        assert!(record.has_error());
        assert!(record.finished_at >= record.started_at);
    }

    #[test]
    fn test_clean_run_has_no_summary() {
        let record = RunContext::start("seed", None).finish(RunStatus::Success, 0, 0, &[]);
        assert_eq!(record.status, RunStatus::Success);
        assert!(record.error_summary.is_none());
        assert!(record.ingestion_run_id.starts_with("seed:"));
    }

    #[test]
    fn test_status_round_trip_and_fallback() {
        assert_eq!(RunStatus::parse("partial"), RunStatus::Partial);
        assert_eq!(RunStatus::parse("weird"), RunStatus::Failed);
        assert_eq!(RunStatus::Success.to_string(), "success");
    }
}
