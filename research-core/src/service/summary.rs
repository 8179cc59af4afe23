// service/summary.rs
// Reconciled time-series summary with on-the-fly ads ratio derivation

use std::collections::{BTreeMap, BTreeSet};

use research_common::data::store::MetricStore;
use research_common::data::types::MetricRecord;

use super::errors::ServiceError;
use crate::fees::derived;
use crate::ingest::month::is_month;
use crate::reconcile::select_authoritative;

/// Reconciled series for one dataset: sorted buckets and one value per
/// `(metric, bucket)` after cohort selection.
#[derive(Debug, Default)]
pub struct MetricSummary {
    pub time_buckets: Vec<String>,
    pub series_by_metric: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Build the summary for a dataset. Month buckets outside `[from, to]`
/// are dropped; fixed token buckets always survive the range filter.
/// ROAS/ACOS/TACOS are derived per bucket from stored CR/CPC/avg
/// price/click share when not stored themselves.
pub async fn metric_summary(
    store: &dyn MetricStore,
    dataset_id: &str,
    metrics: Option<&[&str]>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<MetricSummary, ServiceError> {
    let records = store.get_records(dataset_id, None).await?;

    let in_range = |record: &MetricRecord| {
        if !is_month(&record.bucket) {
            return true;
        }
        if let Some(from) = from {
            if record.bucket.as_str() < from {
                return false;
            }
        }
        if let Some(to) = to {
            if record.bucket.as_str() > to {
                return false;
            }
        }
        true
    };

    let mut groups: BTreeMap<(String, String), Vec<MetricRecord>> = BTreeMap::new();
    for record in records.into_iter().filter(in_range) {
        groups
            .entry((record.metric.clone(), record.bucket.clone()))
            .or_default()
            .push(record);
    }

    let mut series: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for ((metric, bucket), candidates) in groups {
        if let Some(selected) = select_authoritative(&candidates) {
            series.entry(metric).or_default().insert(bucket, selected.value);
        }
    }

    derive_ads_ratios(&mut series);

    // The metric filter applies to the output only; derivation above may
    // need inputs the caller did not ask for.
    if let Some(metrics) = metrics {
        series.retain(|metric, _| metrics.contains(&metric.as_str()));
    }

    let time_buckets: BTreeSet<String> = series
        .values()
        .flat_map(|by_bucket| by_bucket.keys().cloned())
        .collect();

    Ok(MetricSummary {
        time_buckets: time_buckets.into_iter().collect(),
        series_by_metric: series,
    })
}

fn derive_ads_ratios(series: &mut BTreeMap<String, BTreeMap<String, f64>>) {
    let buckets: BTreeSet<String> = series
        .values()
        .flat_map(|by_bucket| by_bucket.keys().cloned())
        .collect();

    let lookup = |series: &BTreeMap<String, BTreeMap<String, f64>>,
                  metric: &str,
                  bucket: &str| {
        series.get(metric).and_then(|m| m.get(bucket)).copied()
    };

    for bucket in buckets {
        let cr = lookup(series, "cr", &bucket);
        let cpc = lookup(series, "cpc", &bucket);
        let avg_price = lookup(series, "avg_price", &bucket);
        let click_share = lookup(series, "click_share", &bucket);

        let roas = match lookup(series, "roas", &bucket) {
            Some(stored) => Some(stored),
            None => match (cr, avg_price, cpc) {
                (Some(cr), Some(price), Some(cpc)) => derived::roas(cr / 100.0, price, cpc),
                _ => None,
            },
        };
        let acos = match lookup(series, "acos", &bucket) {
            Some(stored) => Some(stored),
            None => roas.and_then(derived::acos).map(|v| v * 100.0),
        };
        let tacos = match lookup(series, "tacos", &bucket) {
            Some(stored) => Some(stored),
            None => match (acos, click_share) {
                (Some(acos), Some(share)) => {
                    derived::tacos(acos / 100.0, share / 100.0).map(|v| v * 100.0)
                }
                _ => None,
            },
        };

        let mut store_value = |metric: &str, value: Option<f64>| {
            if let Some(value) = value {
                series
                    .entry(metric.to_string())
                    .or_default()
                    .insert(bucket.clone(), value);
            }
        };
        store_value("roas", roas);
        store_value("acos", acos);
        store_value("tacos", tacos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use research_common::data::repository::MetricRepository;
    use research_common::data::types::{Dataset, DatasetStatus, MetricRecord, MetricUnit};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn setup() -> Arc<MetricRepository> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = Arc::new(MetricRepository::from_pool(pool));
        repo.ensure_schema().await.unwrap();
        repo.upsert_category("cat-1", "Kitchen").await.unwrap();
        repo.insert_dataset(&Dataset {
            id: "ds-1".into(),
            category_id: "cat-1".into(),
            name: "kitchen.xlsx".into(),
            status: DatasetStatus::Ready,
            time_from: Some("2024-05".into()),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        repo
    }

    fn record(metric: &str, bucket: &str, value: f64, unit: MetricUnit) -> MetricRecord {
        MetricRecord::new("ds-1", "cat-1", metric, bucket, value, unit, "market_analysis")
    }

    #[tokio::test]
    async fn test_summary_reconciles_cohorts() {
        let repo = setup().await;
        let records = vec![
            record("sales_units", "2024-05", 60000.0, MetricUnit::Units)
                .with_sample("All", 500.0),
            record("sales_units", "2024-05", 90000.0, MetricUnit::Units)
                .with_sample("Top 50", 5000.0),
        ];
        repo.replace_sheet_records("ds-1", "market_analysis", &records)
            .await
            .unwrap();

        let summary = metric_summary(repo.as_ref(), "ds-1", None, None, None)
            .await
            .unwrap();
        assert_eq!(summary.time_buckets, vec!["2024-05".to_string()]);
        assert_eq!(
            summary.series_by_metric["sales_units"]["2024-05"],
            60000.0
        );
    }

    #[tokio::test]
    async fn test_summary_derives_ads_ratios() {
        let repo = setup().await;
        let records = vec![
            record("cr", "2024-05", 3.0, MetricUnit::Pct),
            record("cpc", "2024-05", 0.875, MetricUnit::Usd),
            record("avg_price", "2024-05", 20.0, MetricUnit::Usd),
            record("click_share", "2024-05", 25.0, MetricUnit::Pct),
        ];
        repo.replace_sheet_records("ds-1", "ads_metrics", &records)
            .await
            .unwrap();

        let summary = metric_summary(repo.as_ref(), "ds-1", None, None, None)
            .await
            .unwrap();

        let roas = summary.series_by_metric["roas"]["2024-05"];
        assert!((roas - 0.03 * 20.0 / 0.875).abs() < 1e-9);
        let acos = summary.series_by_metric["acos"]["2024-05"];
        assert!((acos - 100.0 / roas).abs() < 1e-9);
        let tacos = summary.series_by_metric["tacos"]["2024-05"];
        assert!((tacos - acos * 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_month_range_filter_keeps_tokens() {
        let repo = setup().await;
        let records = vec![
            record("sales_units", "2024-04", 100.0, MetricUnit::Units),
            record("sales_units", "2024-05", 200.0, MetricUnit::Units),
            record("listing_concentration", "top10", 35.0, MetricUnit::Pct),
        ];
        repo.replace_sheet_records("ds-1", "market_analysis", &records)
            .await
            .unwrap();

        let summary = metric_summary(
            repo.as_ref(),
            "ds-1",
            None,
            Some("2024-05"),
            Some("2024-05"),
        )
        .await
        .unwrap();

        assert!(!summary.series_by_metric["sales_units"].contains_key("2024-04"));
        assert!(summary.series_by_metric["sales_units"].contains_key("2024-05"));
        assert!(summary
            .series_by_metric
            .get("listing_concentration")
            .is_some());
    }

    #[tokio::test]
    async fn test_metric_filter_applies_after_derivation() {
        let repo = setup().await;
        let records = vec![
            record("cr", "2024-05", 3.0, MetricUnit::Pct),
            record("cpc", "2024-05", 0.875, MetricUnit::Usd),
            record("avg_price", "2024-05", 20.0, MetricUnit::Usd),
        ];
        repo.replace_sheet_records("ds-1", "ads_metrics", &records)
            .await
            .unwrap();

        let summary = metric_summary(repo.as_ref(), "ds-1", Some(&["roas"]), None, None)
            .await
            .unwrap();
        assert_eq!(summary.series_by_metric.len(), 1);
        assert!(summary.series_by_metric.contains_key("roas"));
    }
}
