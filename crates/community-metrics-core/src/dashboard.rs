//! Read-path view builders.
//!
//! Each view pulls raw rows from a [`SeriesStore`] once and runs them
//! through the aggregators. Storage failures are logged and treated as "no
//! data": a view is always produced, possibly empty.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::warn;

use crate::calendar::latest_completed_day;
use crate::models::{
    metric_catalog, metric_product, MetricDefinition, MetricFamily, Observation, Provenance,
    SeriesPoint,
};
use crate::monthly::{last_full_month_value, monthly_download_points, Cutover};
use crate::sparkline::{clamp_days, sparkline};
use crate::store::{SeriesStore, StoreError};
use crate::totals::combined_sparkline;
use crate::window::{window_totals, DateWindow, WindowTotals};

/// Metrics whose values are summed into the headline star total.
pub const STAR_METRIC_IDS: [&str; 2] = ["stars:lance:github", "stars:lancedb:github"];

/// Dashboard groups, in display order, with their titles.
pub const DASHBOARD_PRODUCTS: [(&str, &str); 2] = [("lance", "Lance"), ("lancedb", "LanceDB")];

/// Trailing window for the headline download totals.
pub const DOWNLOAD_TOTALS_DAYS: u32 = 30;

pub(crate) fn or_empty<T: Default>(result: Result<T, StoreError>, what: &str) -> T {
    result.unwrap_or_else(|e| {
        warn!(error = %e, transient = e.is_transient(), "{} unavailable, serving empty data", what);
        T::default()
    })
}

/// Catalog ordered by product, family, display name, then id.
pub fn sorted_definitions(mut definitions: Vec<MetricDefinition>) -> Vec<MetricDefinition> {
    definitions.sort_by(|a, b| {
        (&a.product, a.metric_family, &a.display_name, &a.metric_id).cmp(&(
            &b.product,
            b.metric_family,
            &b.display_name,
            &b.metric_id,
        ))
    });
    definitions
}

pub async fn definitions_view<S: SeriesStore + ?Sized>(store: &S) -> Vec<MetricDefinition> {
    sorted_definitions(or_empty(store.metric_definitions().await, "metric catalog"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesView {
    pub metric_id: String,
    pub days: usize,
    pub points: Vec<SeriesPoint>,
}

/// Gap-filled trailing series for one metric; `None` when the metric is not
/// in the stored catalog. If the catalog cannot be read, the built-in
/// catalog decides instead.
pub async fn series_view<S: SeriesStore + ?Sized>(
    store: &S,
    metric_id: &str,
    days: i64,
) -> Option<SeriesView> {
    let definitions = store.metric_definitions().await.unwrap_or_else(|e| {
        warn!(error = %e, "metric catalog unavailable, using built-in catalog");
        metric_catalog()
    });
    if !definitions.iter().any(|m| m.metric_id == metric_id) {
        return None;
    }
    let days = clamp_days(days);
    let rows = or_empty(store.observations(metric_id).await, "observations");
    Some(SeriesView {
        metric_id: metric_id.to_string(),
        days,
        points: sparkline(&rows, days),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardItem {
    pub metric_id: String,
    pub display_name: String,
    pub metric_family: MetricFamily,
    pub sdk: Option<String>,
    pub subject: String,
    pub latest_value: Option<i64>,
    pub latest_period_end: Option<NaiveDate>,
    pub latest_provenance: Option<Provenance>,
    pub total_stars: Option<i64>,
    pub sparkline: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardGroup {
    pub product: String,
    pub title: String,
    pub items: Vec<DashboardItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardResponse {
    pub generated_at: DateTime<Utc>,
    pub days: usize,
    pub groups: Vec<DashboardGroup>,
    pub total_stars: Option<i64>,
    pub total_stars_sparkline: Vec<SeriesPoint>,
    pub last_30d_download_totals: WindowTotals,
}

/// Rolling download totals per product over the `DOWNLOAD_TOTALS_DAYS`
/// completed days before `today`.
pub fn last_30d_download_totals(observations: &[Observation], today: NaiveDate) -> WindowTotals {
    let window = DateWindow::trailing(latest_completed_day(today), DOWNLOAD_TOTALS_DAYS);
    let groups: Vec<&str> = DASHBOARD_PRODUCTS.iter().map(|(p, _)| *p).collect();
    window_totals(observations, window, &groups, |o| {
        if o.metric_id.starts_with("downloads:") {
            metric_product(&o.metric_id)
        } else {
            None
        }
    })
}

fn build_item(
    metric: &MetricDefinition,
    rows: &[Observation],
    days: usize,
    today: NaiveDate,
    cutover: Cutover,
) -> DashboardItem {
    let (points, latest) = match metric.metric_family {
        MetricFamily::Downloads => {
            let points = monthly_download_points(rows, days, cutover);
            let latest = last_full_month_value(&points, latest_completed_day(today))
                .map(|l| (l.value, l.period_end));
            (points, latest)
        }
        MetricFamily::Stars => {
            let points = sparkline(rows, days);
            let latest = points.last().map(|p| (p.value, p.period_end));
            (points, latest)
        }
    };
    let latest_provenance = rows.iter().max_by_key(|o| o.period_end).map(|o| o.provenance);

    DashboardItem {
        metric_id: metric.metric_id.clone(),
        display_name: metric.display_name.clone(),
        metric_family: metric.metric_family,
        sdk: metric.sdk.clone(),
        subject: metric.subject.clone(),
        latest_value: latest.map(|(value, _)| value),
        latest_period_end: latest.map(|(_, day)| day),
        latest_provenance,
        total_stars: None,
        sparkline: points,
    }
}

/// Assemble the dashboard from already-loaded rows.
pub fn build_dashboard(
    definitions: &[MetricDefinition],
    observations: &[Observation],
    days: i64,
    today: NaiveDate,
    cutover: Cutover,
) -> DashboardResponse {
    let days = clamp_days(days);
    let last_30d_download_totals = last_30d_download_totals(observations, today);

    if definitions.is_empty() {
        return DashboardResponse {
            generated_at: Utc::now(),
            days,
            groups: Vec::new(),
            total_stars: None,
            total_stars_sparkline: Vec::new(),
            last_30d_download_totals,
        };
    }

    let mut by_metric: HashMap<&str, Vec<Observation>> = HashMap::new();
    for obs in observations {
        by_metric
            .entry(obs.metric_id.as_str())
            .or_default()
            .push(obs.clone());
    }
    let no_rows: Vec<Observation> = Vec::new();
    let rows_for = |metric_id: &str| by_metric.get(metric_id).unwrap_or(&no_rows);

    let stars = combined_sparkline(
        STAR_METRIC_IDS.iter().map(|id| rows_for(*id).as_slice()),
        days,
    );

    let mut groups = Vec::new();
    for (product, title) in DASHBOARD_PRODUCTS {
        let mut metrics: Vec<&MetricDefinition> =
            definitions.iter().filter(|m| m.product == product).collect();
        if metrics.is_empty() {
            continue;
        }
        metrics.sort_by(|a, b| {
            (a.metric_family, &a.display_name, &a.metric_id).cmp(&(
                b.metric_family,
                &b.display_name,
                &b.metric_id,
            ))
        });

        let items = metrics
            .into_iter()
            .map(|metric| {
                let rows = rows_for(metric.metric_id.as_str());
                let mut item = build_item(metric, rows, days, today, cutover);
                if metric.metric_family == MetricFamily::Stars {
                    item.total_stars = stars.latest_total;
                }
                item
            })
            .collect();

        groups.push(DashboardGroup {
            product: product.to_string(),
            title: title.to_string(),
            items,
        });
    }

    DashboardResponse {
        generated_at: Utc::now(),
        days,
        groups,
        total_stars: stars.latest_total,
        total_stars_sparkline: stars.sparkline,
        last_30d_download_totals,
    }
}

/// Load everything once and build the dashboard.
pub async fn dashboard_view<S: SeriesStore + ?Sized>(
    store: &S,
    days: i64,
    today: NaiveDate,
    cutover: Cutover,
) -> DashboardResponse {
    let definitions = or_empty(store.metric_definitions().await, "metric catalog");
    let observations = or_empty(store.all_observations().await, "observations");
    build_dashboard(&definitions, &observations, days, today, cutover)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{metric_catalog, SourceWindow};

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
            Utc::now(),
            "test",
            "run",
        )
    }

    #[test]
    fn test_sorted_definitions_order() {
        let sorted = sorted_definitions(metric_catalog());
        let ids: Vec<&str> = sorted.iter().map(|m| m.metric_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "downloads:lance:python",
                "downloads:lance:rust",
                "stars:lance:github",
                "downloads:lancedb:nodejs",
                "downloads:lancedb:python",
                "downloads:lancedb:rust",
                "stars:lancedb:github",
            ]
        );
    }

    #[test]
    fn test_empty_catalog_yields_empty_dashboard_with_window() {
        let view = build_dashboard(&[], &[], 90, d(2026, 2, 15), Cutover::default());
        assert!(view.groups.is_empty());
        assert_eq!(view.total_stars, None);
        assert_eq!(view.days, 90);
        assert_eq!(view.last_30d_download_totals.window_end, d(2026, 2, 14));
        assert_eq!(view.last_30d_download_totals.window_start, d(2026, 1, 16));
    }

    #[test]
    fn test_dashboard_groups_and_star_totals() {
        let today = d(2026, 2, 15);
        let rows = vec![
            row("stars:lance:github", d(2026, 2, 10), 100, SourceWindow::CumulativeSnapshot),
            row("stars:lancedb:github", d(2026, 2, 10), 200, SourceWindow::CumulativeSnapshot),
            row("downloads:lance:python", d(2026, 1, 31), 40, SourceWindow::Daily),
            row("downloads:lance:python", d(2026, 2, 14), 60, SourceWindow::Daily),
        ];
        let view = build_dashboard(&metric_catalog(), &rows, 180, today, Cutover::default());

        assert_eq!(view.groups.len(), 2);
        assert_eq!(view.groups[0].title, "Lance");
        assert_eq!(view.groups[1].title, "LanceDB");
        assert_eq!(view.total_stars, Some(300));

        let lance = &view.groups[0].items;
        let python = lance
            .iter()
            .find(|i| i.metric_id == "downloads:lance:python")
            .unwrap();
        assert_eq!(python.latest_value, Some(40));
        assert_eq!(python.latest_period_end, Some(d(2026, 1, 31)));
        assert_eq!(python.latest_provenance, Some(Provenance::ApiDaily));

        let stars = lance.iter().find(|i| i.metric_id == "stars:lance:github").unwrap();
        assert_eq!(stars.latest_value, Some(100));
        assert_eq!(stars.total_stars, Some(300));
        assert_eq!(python.total_stars, None);

        assert_eq!(view.last_30d_download_totals.total("lance"), 100);
        assert_eq!(view.last_30d_download_totals.total("lancedb"), 0);
    }

    #[test]
    fn test_star_rows_do_not_count_as_downloads() {
        let rows = vec![row(
            "stars:lance:github",
            d(2026, 2, 10),
            500,
            SourceWindow::CumulativeSnapshot,
        )];
        let totals = last_30d_download_totals(&rows, d(2026, 2, 15));
        assert_eq!(totals.total("lance"), 0);
    }
}
