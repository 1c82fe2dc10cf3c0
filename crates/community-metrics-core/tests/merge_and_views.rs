//! End-to-end tests of the write path and read-path views over the
//! in-memory store.

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use community_metrics_core::dashboard::{dashboard_view, definitions_view, series_view};
use community_metrics_core::history::refresh_errors_view;
use community_metrics_core::merge::{merge_observations, MergeOutcome};
use community_metrics_core::models::{
    metric_catalog, MetricDefinition, Observation, Provenance, SourceWindow,
};
use community_metrics_core::monthly::Cutover;
use community_metrics_core::runs::{RunContext, RunRecord, RunStatus};
use community_metrics_core::store::memory::InMemoryStore;
use community_metrics_core::store::{SeriesStore, StoreError};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn row(metric_id: &str, day: NaiveDate, value: i64, window: SourceWindow) -> Observation {
    Observation::daily(
        metric_id,
        day,
        value,
        Provenance::ApiDaily,
        window,
        Utc.with_ymd_and_hms(2026, 2, 15, 0, 0, 0).unwrap(),
        "test",
        "run-1",
    )
}

/// Rejects every call, standing in for an unreachable database.
struct FailingStore;

fn refused() -> StoreError {
    StoreError::Fatal("connection refused".into())
}

#[async_trait]
impl SeriesStore for FailingStore {
    async fn observations(&self, _metric_id: &str) -> Result<Vec<Observation>, StoreError> {
        Err(refused())
    }

    async fn all_observations(&self) -> Result<Vec<Observation>, StoreError> {
        Err(refused())
    }

    async fn replace_range(
        &self,
        _metric_id: &str,
        _start: NaiveDate,
        _end: NaiveDate,
        _rows: &[Observation],
    ) -> Result<u64, StoreError> {
        Err(refused())
    }

    async fn upsert_run(&self, _run: &RunRecord) -> Result<(), StoreError> {
        Err(refused())
    }

    async fn runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        Err(refused())
    }

    async fn seed_metrics(&self, _metrics: &[MetricDefinition]) -> Result<(u64, u64), StoreError> {
        Err(refused())
    }

    async fn metric_definitions(&self) -> Result<Vec<MetricDefinition>, StoreError> {
        Err(refused())
    }
}

async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.seed_metrics(&metric_catalog()).await.unwrap();
    store
}

#[tokio::test]
async fn test_merging_same_batch_twice_is_idempotent() {
    let store = seeded_store().await;
    let batch = vec![
        row("downloads:lance:python", d(2026, 2, 1), 10, SourceWindow::Daily),
        row("downloads:lance:python", d(2026, 2, 2), 20, SourceWindow::Daily),
        row("stars:lance:github", d(2026, 2, 2), 500, SourceWindow::CumulativeSnapshot),
    ];

    let first = merge_observations(&store, batch.clone()).await.into_result().unwrap();
    let after_first = store.all_observations().await.unwrap();
    let second = merge_observations(&store, batch).await.into_result().unwrap();
    let after_second = store.all_observations().await.unwrap();

    assert_eq!(first, MergeOutcome { inserted: 3, updated: 0 });
    assert_eq!(second, first);
    assert_eq!(after_first, after_second);
    assert_eq!(after_second.len(), 3);
}

#[tokio::test]
async fn test_merge_supersedes_rows_by_key() {
    let store = seeded_store().await;
    merge_observations(
        &store,
        vec![row("downloads:lance:rust", d(2026, 2, 3), 1, SourceWindow::Daily)],
    )
    .await
    .into_result()
    .unwrap();
    merge_observations(
        &store,
        vec![row("downloads:lance:rust", d(2026, 2, 3), 9, SourceWindow::Daily)],
    )
    .await
    .into_result()
    .unwrap();

    let rows = store.observations("downloads:lance:rust").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value, 9);
}

#[tokio::test]
async fn test_merge_keeps_rows_between_sparse_batch_points() {
    let store = seeded_store().await;
    let metric = "downloads:lancedb:nodejs";
    merge_observations(
        &store,
        (1..=5)
            .map(|day| row(metric, d(2026, 2, day), 1, SourceWindow::Daily))
            .collect(),
    )
    .await
    .into_result()
    .unwrap();

    // Days 2 and 4 are replaced; the 3rd is not in the batch and survives.
    merge_observations(
        &store,
        vec![
            row(metric, d(2026, 2, 2), 7, SourceWindow::Daily),
            row(metric, d(2026, 2, 4), 7, SourceWindow::Daily),
        ],
    )
    .await
    .into_result()
    .unwrap();

    let days: Vec<(NaiveDate, i64)> = store
        .observations(metric)
        .await
        .unwrap()
        .iter()
        .map(|o| (o.period_end, o.value))
        .collect();
    assert_eq!(
        days,
        vec![
            (d(2026, 2, 1), 1),
            (d(2026, 2, 2), 7),
            (d(2026, 2, 3), 1),
            (d(2026, 2, 4), 7),
            (d(2026, 2, 5), 1),
        ]
    );
}

#[tokio::test]
async fn test_series_view_gap_fills_and_rejects_unknown_metrics() {
    let store = seeded_store().await;
    merge_observations(
        &store,
        vec![
            row("stars:lancedb:github", d(2026, 1, 1), 100, SourceWindow::CumulativeSnapshot),
            row("stars:lancedb:github", d(2026, 1, 11), 200, SourceWindow::CumulativeSnapshot),
        ],
    )
    .await
    .into_result()
    .unwrap();

    let view = series_view(&store, "stars:lancedb:github", 5).await.unwrap();
    assert_eq!(view.days, 5);
    let values: Vec<i64> = view.points.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![160, 170, 180, 190, 200]);

    let clamped = series_view(&store, "stars:lancedb:github", 0).await.unwrap();
    assert_eq!(clamped.days, 1);

    assert!(series_view(&store, "stars:nope:github", 30).await.is_none());
}

#[tokio::test]
async fn test_dashboard_serializes_expected_shape() {
    let store = seeded_store().await;
    merge_observations(
        &store,
        vec![
            row("downloads:lance:python", d(2025, 11, 30), 2_100_000, SourceWindow::DiscreteSnapshot),
            row("downloads:lance:python", d(2025, 12, 1), 100, SourceWindow::Daily),
            row("stars:lance:github", d(2026, 2, 1), 10, SourceWindow::CumulativeSnapshot),
        ],
    )
    .await
    .into_result()
    .unwrap();

    let view = dashboard_view(&store, 180, d(2026, 2, 15), Cutover::default()).await;
    let json = serde_json::to_value(&view).unwrap();

    assert_eq!(json["days"], 180);
    assert_eq!(json["total_stars"], 10);
    assert_eq!(json["groups"][0]["product"], "lance");
    assert_eq!(json["last_30d_download_totals"]["window_end"], "2026-02-14");
    assert_eq!(json["last_30d_download_totals"]["lance"], 0);
    assert_eq!(json["last_30d_download_totals"]["lancedb"], 0);

    let python = &json["groups"][0]["items"][0];
    assert_eq!(python["metric_id"], "downloads:lance:python");
    assert_eq!(python["metric_family"], "downloads");
    assert_eq!(python["sparkline"].as_array().unwrap().len(), 2);
    assert_eq!(python["sparkline"][0]["period_end"], "2025-11-30");
    assert_eq!(python["latest_provenance"], "api_daily");
}

#[tokio::test]
async fn test_empty_store_serves_empty_views() {
    let store = InMemoryStore::new();
    assert!(definitions_view(&store).await.is_empty());
    let view = dashboard_view(&store, 30, d(2026, 2, 15), Cutover::default()).await;
    assert!(view.groups.is_empty());
    assert!(view.total_stars_sparkline.is_empty());
}

#[tokio::test]
async fn test_refresh_errors_view_reports_failed_runs() {
    let store = InMemoryStore::new();
    let run = RunContext::start("daily_refresh", None);
    let errors = vec!["npm: HTTP 503".to_string()];
    store
        .upsert_run(&run.finish(RunStatus::Partial, 3, 0, &errors))
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let view = refresh_errors_view(&store, today.pred_opt().unwrap(), today, 500).await;
    assert_eq!(view.count, 1);
    assert_eq!(view.errors[0].error_summary, "npm: HTTP 503");
    assert_eq!(view.errors[0].status, RunStatus::Partial);
}

#[tokio::test]
async fn test_failing_store_reads_as_no_data() {
    let store = FailingStore;

    assert!(definitions_view(&store).await.is_empty());

    let series = series_view(&store, "stars:lance:github", 30).await.unwrap();
    assert_eq!(series.days, 30);
    assert!(series.points.is_empty());
    assert!(series_view(&store, "stars:nope:github", 30).await.is_none());

    let dashboard = dashboard_view(&store, 180, d(2026, 2, 15), Cutover::default()).await;
    assert!(dashboard.groups.is_empty());
    assert_eq!(dashboard.total_stars, None);
    assert!(dashboard.total_stars_sparkline.is_empty());
    let totals = &dashboard.last_30d_download_totals;
    assert_eq!(totals.window_start, d(2026, 1, 16));
    assert_eq!(totals.window_end, d(2026, 2, 14));
    assert_eq!(totals.total("lance"), 0);
    assert_eq!(totals.total("lancedb"), 0);

    let errors = refresh_errors_view(&store, d(2026, 2, 1), d(2026, 2, 15), 500).await;
    assert_eq!(errors.count, 0);
    assert!(errors.errors.is_empty());
    assert_eq!(errors.start_date, d(2026, 2, 1));
}

#[tokio::test]
async fn test_failing_store_merge_reports_every_metric() {
    let report = merge_observations(
        &FailingStore,
        vec![
            row("downloads:lance:python", d(2026, 2, 1), 1, SourceWindow::Daily),
            row("downloads:lance:rust", d(2026, 2, 1), 1, SourceWindow::Daily),
        ],
    )
    .await;
    assert_eq!(report.outcome, MergeOutcome::default());
    let failed: Vec<&str> = report.failures.iter().map(|f| f.metric_id.as_str()).collect();
    assert_eq!(failed, vec!["downloads:lance:python", "downloads:lance:rust"]);
}
