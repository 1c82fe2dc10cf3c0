//! CSV seed import.
//!
//! Two kinds of legacy export live in `[seed] data_dir`:
//!
//! - `download_stats.csv`: one row per snapshot day, one column per
//!   download metric. Counts may carry thousands separators (`"1,234"`).
//! - star-history exports with `Repository`, `Date`, `Stars` columns, where
//!   `Date` is a browser-formatted timestamp.
//!
//! Download rows become `csv_seed`/`discrete_snapshot` observations; star
//! rows become `csv_seed`/`cumulative_snapshot` observations dated by the
//! UTC day of their timestamp.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, info, warn};

use community_metrics_core::calendar::{parse_iso_date, parse_seed_star_timestamp};
use community_metrics_core::models::{Observation, Provenance, SourceWindow};
use community_metrics_core::runs::{RunContext, RunStatus};
use community_metrics_core::store::SeriesStore;

use super::{complete_run, with_retry, JobSummary, RetryPolicy};
use crate::config::SeedConfig;
use crate::sources::star_metric_for_repo;

pub const JOB_NAME: &str = "seed_from_csv";

/// `download_stats.csv` column → metric id.
pub const DOWNLOAD_COLUMNS: [(&str, &str); 5] = [
    ("Python (lance)", "downloads:lance:python"),
    ("Rust (lance)", "downloads:lance:rust"),
    ("Python (lanceDB)", "downloads:lancedb:python"),
    ("NodeJS (lancedb)", "downloads:lancedb:nodejs"),
    ("Rust (lancedb)", "downloads:lancedb:rust"),
];

/// Parse an integer cell, ignoring whitespace and thousands separators.
pub fn clean_int(raw: &str) -> Result<i64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<i64>()
        .with_context(|| format!("invalid integer '{}'", raw))
}

/// A parsed CSV file: header row plus data rows.
struct CsvTable {
    headers: StringRecord,
    rows: Vec<StringRecord>,
}

impl CsvTable {
    fn parse(text: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(text.trim_start_matches('\u{feff}').as_bytes());
        let headers = reader.headers().context("missing header row")?.clone();
        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .context("malformed CSV record")?;
        Ok(Self { headers, rows })
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("missing column '{}'", name))
    }
}

/// 1-based line of a record, counting the header as line 1.
fn line_of(row: &StringRecord, index: usize) -> u64 {
    row.position().map_or(index as u64 + 2, |p| p.line())
}

fn cell(row: &StringRecord, idx: usize, line: u64) -> Result<&str> {
    row.get(idx)
        .with_context(|| format!("row {}: too few fields", line))
}

fn read_seed_file(path: &Path) -> Result<CsvTable> {
    if !path.exists() {
        bail!("Seed file not found: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    CsvTable::parse(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn seed_ref(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("seed_data/{}", name)
}

/// Rows from `download_stats.csv`. With `before`, only days strictly
/// earlier than it are kept.
pub fn download_seed_rows(
    path: &Path,
    run_id: &str,
    before: Option<NaiveDate>,
) -> Result<Vec<Observation>> {
    let table = read_seed_file(path)?;
    let day_col = table.column("Day")?;
    let columns = DOWNLOAD_COLUMNS
        .iter()
        .map(|(name, metric_id)| Ok((table.column(name)?, *metric_id)))
        .collect::<Result<Vec<_>>>()?;
    let source_ref = seed_ref(path);

    let mut rows = Vec::new();
    for (i, raw) in table.rows.iter().enumerate() {
        let line = line_of(raw, i);
        let day = parse_iso_date(cell(raw, day_col, line)?)
            .with_context(|| format!("{}: row {}", source_ref, line))?;
        if before.is_some_and(|cutoff| day >= cutoff) {
            continue;
        }
        let observed_at = day.and_time(NaiveTime::MIN).and_utc();
        for (idx, metric_id) in &columns {
            let value = clean_int(cell(raw, *idx, line)?)
                .with_context(|| format!("{}: row {}", source_ref, line))?;
            rows.push(Observation::daily(
                *metric_id,
                day,
                value,
                Provenance::CsvSeed,
                SourceWindow::DiscreteSnapshot,
                observed_at,
                source_ref.as_str(),
                run_id,
            ));
        }
    }
    Ok(rows)
}

/// Rows from a star-history export. Repositories outside the catalog are
/// skipped.
pub fn star_seed_rows(
    path: &Path,
    run_id: &str,
    before: Option<NaiveDate>,
) -> Result<Vec<Observation>> {
    let table = read_seed_file(path)?;
    let repo_col = table.column("Repository")?;
    let date_col = table.column("Date")?;
    let stars_col = table.column("Stars")?;
    let source_ref = seed_ref(path);

    let mut rows = Vec::new();
    for (i, raw) in table.rows.iter().enumerate() {
        let line = line_of(raw, i);
        let repo = cell(raw, repo_col, line)?;
        let Some(metric_id) = star_metric_for_repo(repo) else {
            debug!(repo, "skipping star row for untracked repository");
            continue;
        };
        let observed_at = parse_seed_star_timestamp(cell(raw, date_col, line)?)
            .with_context(|| format!("{}: row {}", source_ref, line))?;
        let day = observed_at.date_naive();
        if before.is_some_and(|cutoff| day >= cutoff) {
            continue;
        }
        let value = clean_int(cell(raw, stars_col, line)?)
            .with_context(|| format!("{}: row {}", source_ref, line))?;
        rows.push(Observation::daily(
            metric_id,
            day,
            value,
            Provenance::CsvSeed,
            SourceWindow::CumulativeSnapshot,
            observed_at,
            source_ref.as_str(),
            run_id,
        ));
    }
    Ok(rows)
}

fn seed_path(config: &SeedConfig, filename: &str) -> PathBuf {
    config.data_dir.join(filename)
}

/// Every seed row from the configured files, optionally limited to days
/// before `before`.
pub fn load_seed_rows(
    config: &SeedConfig,
    run_id: &str,
    before: Option<NaiveDate>,
) -> Result<Vec<Observation>> {
    let mut rows = download_seed_rows(
        &seed_path(config, &config.downloads_file),
        run_id,
        before,
    )?;
    for filename in &config.star_files {
        rows.extend(star_seed_rows(&seed_path(config, filename), run_id, before)?);
    }
    Ok(rows)
}

/// Import all seed files. Any failure records a `failed` run with the error
/// as its summary and is returned.
pub async fn run_seed<S>(
    store: &S,
    config: &SeedConfig,
    policy: &RetryPolicy,
) -> Result<JobSummary>
where
    S: SeriesStore + ?Sized,
{
    let run = RunContext::start(JOB_NAME, None);
    info!(run_id = %run.run_id, data_dir = %config.data_dir.display(), "seeding from csv");

    match load_seed_rows(config, &run.run_id, None) {
        Ok(rows) => {
            info!(rows = rows.len(), "seed rows loaded");
            complete_run(store, policy, &run, rows, Vec::new()).await
        }
        Err(e) => {
            let record = run.finish(RunStatus::Failed, 0, 0, &[format!("{:#}", e)]);
            if let Err(record_err) =
                with_retry(policy, "record run", || store.upsert_run(&record)).await
            {
                warn!(run_id = %run.run_id, error = %record_err, "could not record failed run");
            }
            Err(e.context("seed_from_csv failed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DOWNLOADS: &str = "Day,Python (lance),Rust (lance),Python (lanceDB),NodeJS (lancedb),Rust (lancedb)\n\
        2025-10-30,\"1,599,523\",10,20,30,40\n\
        2025-11-30,2000000,11,21,31,41\n";

    const STARS: &str = "Repository,Date,Stars\r\n\
        lance-format/lance,Fri Feb 20 2026 14:34:58 GMT-0500 (Eastern Standard Time),5100\r\n\
        someone/else,Fri Feb 20 2026 14:34:58 GMT-0500 (Eastern Standard Time),1\r\n\
        lance-format/lance,Sat Feb 21 2026 22:00:00 GMT-0500 (Eastern Standard Time),\"5,150\"\r\n";

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_clean_int_strips_separators() {
        assert_eq!(clean_int(" 1,599,523 ").unwrap(), 1_599_523);
        assert!(clean_int("").is_err());
        assert!(clean_int("12a").is_err());
    }

    #[test]
    fn test_table_handles_quotes_bom_and_blank_lines() {
        let text = "\u{feff}a,b ,c\r\n\
                    1,\"x,y\",\"say \"\"hi\"\"\"\r\n\
                    \r\n\
                    2,\"two\nlines\",z\r\n";
        let table = CsvTable::parse(text).unwrap();
        assert_eq!(table.column("a").unwrap(), 0);
        assert_eq!(table.column("b").unwrap(), 1);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(&table.rows[0][1], "x,y");
        assert_eq!(&table.rows[0][2], "say \"hi\"");
        assert_eq!(&table.rows[1][1], "two\nlines");
        assert_eq!(line_of(&table.rows[0], 0), 2);
    }

    #[test]
    fn test_download_rows_per_column() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "download_stats.csv", DOWNLOADS);
        let rows = download_seed_rows(&path, "run", None).unwrap();
        assert_eq!(rows.len(), 10);
        let first = &rows[0];
        assert_eq!(first.metric_id, "downloads:lance:python");
        assert_eq!(first.value, 1_599_523);
        assert_eq!(first.provenance, Provenance::CsvSeed);
        assert_eq!(first.source_window, SourceWindow::DiscreteSnapshot);
        assert_eq!(first.source_ref, "seed_data/download_stats.csv");
        assert_eq!(first.observed_at.date_naive(), first.period_end);
    }

    #[test]
    fn test_download_rows_filtered_by_cutoff() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "download_stats.csv", DOWNLOADS);
        let cutoff = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();
        let rows = download_seed_rows(&path, "run", Some(cutoff)).unwrap();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.period_end < cutoff));
    }

    #[test]
    fn test_star_rows_skip_untracked_repos() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "lance-stars.csv", STARS);
        let rows = star_seed_rows(&path, "run", None).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.metric_id == "stars:lance:github"));
        assert_eq!(rows[0].period_end, NaiveDate::from_ymd_opt(2026, 2, 20).unwrap());
        // 22:00 EST is 03:00 UTC the next day.
        assert_eq!(rows[1].period_end, NaiveDate::from_ymd_opt(2026, 2, 22).unwrap());
        assert_eq!(rows[1].value, 5150);
        assert_eq!(rows[1].source_window, SourceWindow::CumulativeSnapshot);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "download_stats.csv", "Day,Python (lance)\n2025-10-30,1\n");
        let err = download_seed_rows(&path, "run", None).unwrap_err();
        assert!(err.to_string().contains("Rust (lance)"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = SeedConfig {
            data_dir: dir.path().to_path_buf(),
            ..SeedConfig::default()
        };
        let err = load_seed_rows(&config, "run", None).unwrap_err();
        assert!(err.to_string().contains("Seed file not found"));
    }
}
