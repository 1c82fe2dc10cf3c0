//! Calendar helpers shared by the ingestion jobs and the read path.
//!
//! All days are UTC calendar dates. "Completed" days are those strictly
//! before the reference day: providers publish a day's totals only once
//! it has ended.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

/// The most recent day whose totals are final, relative to `reference`.
pub fn latest_completed_day(reference: NaiveDate) -> NaiveDate {
    reference - Days::new(1)
}

/// Every day from `start` to `end`, inclusive. Empty when `end < start`.
pub fn daily_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|day| *day <= end).collect()
}

/// Days a refresh job must (re)write.
///
/// Starts the day after the latest stored `period_end` (or at
/// `latest_completed` when nothing is stored), then widens backwards so the
/// trailing `lookback_days` days are always rewritten. Returns an empty list
/// when storage is already current and no lookback was requested.
pub fn days_to_refresh(
    latest_existing: Option<NaiveDate>,
    latest_completed: NaiveDate,
    lookback_days: u32,
) -> Vec<NaiveDate> {
    let mut start = match latest_existing {
        Some(day) => day + Days::new(1),
        None => latest_completed,
    };
    if lookback_days > 0 {
        let lookback_start = latest_completed - Days::new(u64::from(lookback_days) - 1);
        if lookback_start < start {
            start = lookback_start;
        }
    }
    daily_range(start, latest_completed)
}

/// Parse a `YYYY-MM-DD` date, tolerating surrounding whitespace and quotes.
pub fn parse_iso_date(raw: &str) -> Result<NaiveDate> {
    let cleaned = raw.trim().trim_matches('"');
    NaiveDate::parse_from_str(cleaned, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{}': expected YYYY-MM-DD", raw))
}

/// Parse the browser-style timestamps found in star-history exports.
///
/// Example: `Fri Feb 20 2026 14:34:58 GMT-0500 (Eastern Standard Time)`.
pub fn parse_seed_star_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    let cleaned = match trimmed.find(" (") {
        Some(idx) if trimmed.ends_with(')') => trimmed[..idx].trim_end(),
        _ => trimmed,
    };
    let parsed = DateTime::parse_from_str(cleaned, "%a %b %d %Y %H:%M:%S GMT%z")
        .with_context(|| format!("invalid star-history timestamp '{}'", raw))?;
    Ok(parsed.with_timezone(&Utc))
}

/// `(year, month)` of the calendar month before `reference`'s month.
pub fn last_full_month_key(reference: NaiveDate) -> (i32, u32) {
    if reference.month() == 1 {
        (reference.year() - 1, 12)
    } else {
        (reference.year(), reference.month() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_days_to_refresh_incremental() {
        let days = days_to_refresh(Some(d(2026, 2, 10)), d(2026, 2, 12), 0);
        assert_eq!(days, vec![d(2026, 2, 11), d(2026, 2, 12)]);
    }

    #[test]
    fn test_days_to_refresh_lookback_includes_recent_days() {
        let days = days_to_refresh(Some(d(2026, 2, 15)), d(2026, 2, 15), 3);
        assert_eq!(days, vec![d(2026, 2, 13), d(2026, 2, 14), d(2026, 2, 15)]);
    }

    #[test]
    fn test_days_to_refresh_up_to_date_is_empty() {
        assert!(days_to_refresh(Some(d(2026, 2, 15)), d(2026, 2, 15), 0).is_empty());
    }

    #[test]
    fn test_days_to_refresh_empty_store_starts_at_latest() {
        assert_eq!(days_to_refresh(None, d(2026, 2, 15), 0), vec![d(2026, 2, 15)]);
    }

    #[test]
    fn test_parse_iso_date_strips_quotes() {
        assert_eq!(parse_iso_date(" \"2025-10-30\" ").unwrap(), d(2025, 10, 30));
        assert!(parse_iso_date("10/30/2025").is_err());
    }

    #[test]
    fn test_parse_seed_star_timestamp_converts_to_utc() {
        let ts =
            parse_seed_star_timestamp("Fri Feb 20 2026 14:34:58 GMT-0500 (Eastern Standard Time)")
                .unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-02-20T19:34:58+00:00");
    }

    #[test]
    fn test_last_full_month_key_wraps_year() {
        assert_eq!(last_full_month_key(d(2026, 1, 5)), (2025, 12));
        assert_eq!(last_full_month_key(d(2026, 2, 15)), (2026, 1));
    }

    #[test]
    fn test_daily_range_inclusive() {
        assert_eq!(daily_range(d(2026, 2, 27), d(2026, 3, 1)).len(), 3);
        assert!(daily_range(d(2026, 3, 2), d(2026, 3, 1)).is_empty());
    }
}
