// service/ingestion.rs
// Per-sheet ingestion pipeline with per-sheet error isolation

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use research_common::data::store::{MetricStore, RuleStore};
use research_common::data::types::{Category, Dataset, DatasetStatus, BUCKET_OVERALL};

use super::errors::ServiceError;
use crate::ingest::month::is_month;
use crate::ingest::parsers::{parse_sheet, ParseContext, RuleSet};
use crate::ingest::workbook::{open_recognized_sheets, RawSheet, SheetKind};
use crate::reconcile::select_authoritative;

/// Outcome of one sheet within a workbook ingestion.
#[derive(Debug, Clone)]
pub struct SheetReport {
    pub sheet: &'static str,
    pub records: usize,
    pub error: Option<String>,
}

/// Ordered fallback strategies for the ads average price. Tried one by
/// one; any store failure inside a strategy is non-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AvgPriceStrategy {
    /// `avg_price` in this dataset for the same bucket.
    SameBucket,
    /// `avg_price` of a sibling dataset in the category for the month.
    CategoryMonth,
    /// Most recent `avg_price` anywhere in this dataset.
    LatestAnywhere,
}

const AVG_PRICE_STRATEGIES: [AvgPriceStrategy; 3] = [
    AvgPriceStrategy::SameBucket,
    AvgPriceStrategy::CategoryMonth,
    AvgPriceStrategy::LatestAnywhere,
];

/// Drives workbook ingestion: header/column detection, parsing, record
/// replacement and category constant refresh, one sheet at a time.
pub struct IngestionService {
    store: Arc<dyn MetricStore>,
    rules: Arc<dyn RuleStore>,
    constants_cache: DashMap<String, Category>,
}

impl IngestionService {
    pub fn new(store: Arc<dyn MetricStore>, rules: Arc<dyn RuleStore>) -> Self {
        Self {
            store,
            rules,
            constants_cache: DashMap::new(),
        }
    }

    /// Ingest every recognized sheet of a workbook file.
    pub async fn ingest_workbook_file<P: AsRef<Path>>(
        &self,
        dataset_id: &str,
        path: P,
    ) -> Result<Vec<SheetReport>, ServiceError> {
        let sheets = open_recognized_sheets(path)?;
        self.ingest_sheets(dataset_id, sheets).await
    }

    /// Ingest already-extracted raw sheets. Sheets are processed in
    /// shape order so market-research constants land before the
    /// analysis enrichment that reads them; a failure in one sheet
    /// never blocks the others.
    pub async fn ingest_sheets(
        &self,
        dataset_id: &str,
        mut sheets: Vec<(SheetKind, RawSheet)>,
    ) -> Result<Vec<SheetReport>, ServiceError> {
        let dataset = self.store.get_dataset(dataset_id).await?;
        self.store
            .set_dataset_status(dataset_id, DatasetStatus::Parsed)
            .await?;

        let rule_set = self.load_rule_set().await?;
        let default_bucket = dataset
            .time_from
            .clone()
            .unwrap_or_else(|| BUCKET_OVERALL.to_string());

        sheets.sort_by_key(|(kind, _)| kind_order(*kind));

        let mut reports = Vec::with_capacity(sheets.len());
        let mut any_ok = false;
        for (kind, sheet) in &sheets {
            match self
                .ingest_sheet(&dataset, &rule_set, *kind, sheet, &default_bucket)
                .await
            {
                Ok(count) => {
                    any_ok = true;
                    reports.push(SheetReport {
                        sheet: kind.source_sheet(),
                        records: count,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(
                        "Sheet '{}' failed for dataset {}: {}",
                        kind.source_sheet(),
                        dataset_id,
                        e
                    );
                    reports.push(SheetReport {
                        sheet: kind.source_sheet(),
                        records: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let status = if any_ok {
            DatasetStatus::Ready
        } else {
            DatasetStatus::Failed
        };
        self.store.set_dataset_status(dataset_id, status).await?;

        info!(
            "Dataset {} ingested: {}/{} sheets ok",
            dataset_id,
            reports.iter().filter(|r| r.error.is_none()).count(),
            reports.len()
        );
        Ok(reports)
    }

    async fn ingest_sheet(
        &self,
        dataset: &Dataset,
        rule_set: &RuleSet,
        kind: SheetKind,
        sheet: &RawSheet,
        default_bucket: &str,
    ) -> Result<usize, ServiceError> {
        // Re-read per sheet: an earlier sheet may have refreshed the
        // category constants this parser falls back to.
        let category = self.category_for(&dataset.category_id).await?;

        let fallback_avg_price = if kind == SheetKind::AdsMetrics {
            self.resolve_fallback_avg_price(dataset, default_bucket)
                .await
        } else {
            None
        };

        let ctx = ParseContext {
            dataset_id: &dataset.id,
            category_id: &dataset.category_id,
            category: &category,
            rules: rule_set,
            default_bucket,
            fallback_avg_price,
        };

        let output = parse_sheet(kind, &ctx, sheet)?;
        let count = self
            .store
            .replace_sheet_records(&dataset.id, kind.source_sheet(), &output.records)
            .await?;

        // Constants refresh is enrichment: log and move on if it fails.
        if let Some(update) = output.category_update {
            match self
                .store
                .apply_constant_update(&dataset.category_id, &update)
                .await
            {
                Ok(()) => {
                    self.constants_cache.remove(&dataset.category_id);
                }
                Err(e) => {
                    warn!(
                        "Constants update failed for category {}: {}",
                        dataset.category_id, e
                    );
                }
            }
        }

        Ok(count)
    }

    async fn load_rule_set(&self) -> Result<RuleSet, ServiceError> {
        Ok(RuleSet {
            referral: self.rules.referral_fee_rules().await?,
            size_tiers: self.rules.size_tier_rules().await?,
            fba_fees: self.rules.fba_fee_rules().await?,
        })
    }

    async fn category_for(&self, category_id: &str) -> Result<Category, ServiceError> {
        if let Some(category) = self.constants_cache.get(category_id) {
            return Ok(category.clone());
        }
        let category = self.store.get_category(category_id).await?;
        self.constants_cache
            .insert(category_id.to_string(), category.clone());
        Ok(category)
    }

    /// Walk the fallback strategies in order; the first one producing a
    /// value wins. Store failures inside a strategy only skip it.
    async fn resolve_fallback_avg_price(
        &self,
        dataset: &Dataset,
        bucket: &str,
    ) -> Option<f64> {
        for strategy in AVG_PRICE_STRATEGIES {
            match self.try_avg_price(strategy, dataset, bucket).await {
                Ok(Some(price)) => {
                    debug!(
                        "Resolved avg price {:.2} for dataset {} via {:?}",
                        price, dataset.id, strategy
                    );
                    return Some(price);
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        "Avg price strategy {:?} failed for dataset {}: {}",
                        strategy, dataset.id, e
                    );
                    continue;
                }
            }
        }
        None
    }

    async fn try_avg_price(
        &self,
        strategy: AvgPriceStrategy,
        dataset: &Dataset,
        bucket: &str,
    ) -> Result<Option<f64>, ServiceError> {
        match strategy {
            AvgPriceStrategy::SameBucket => {
                let candidates = self
                    .store
                    .get_metric_candidates(&dataset.id, "avg_price", bucket)
                    .await?;
                Ok(select_authoritative(&candidates).map(|r| r.value))
            }
            AvgPriceStrategy::CategoryMonth => {
                if !is_month(bucket) {
                    return Ok(None);
                }
                let candidates = self
                    .store
                    .category_month_candidates(
                        &dataset.category_id,
                        "avg_price",
                        bucket,
                        &dataset.id,
                    )
                    .await?;
                Ok(select_authoritative(&candidates).map(|r| r.value))
            }
            AvgPriceStrategy::LatestAnywhere => {
                Ok(self.store.latest_metric_value(&dataset.id, "avg_price").await?)
            }
        }
    }

    /// Background auto-ingestion right after upload, detached from the
    /// caller.
    pub fn spawn_ingest(
        self: &Arc<Self>,
        dataset_id: String,
        path: PathBuf,
    ) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            match service.ingest_workbook_file(&dataset_id, &path).await {
                Ok(reports) => {
                    info!(
                        "Background ingestion of {} finished ({} sheets)",
                        dataset_id,
                        reports.len()
                    );
                }
                Err(e) => {
                    error!("Background ingestion of {} failed: {}", dataset_id, e);
                }
            }
        })
    }
}

fn kind_order(kind: SheetKind) -> usize {
    SheetKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(SheetKind::ALL.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use research_common::data::repository::MetricRepository;
    use research_common::data::types::MetricUnit;
    use sqlx::sqlite::SqlitePoolOptions;

    use crate::ingest::workbook::RawCell;

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    fn num(n: f64) -> RawCell {
        RawCell::Number(n)
    }

    async fn setup() -> (Arc<MetricRepository>, IngestionService) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = Arc::new(MetricRepository::from_pool(pool));
        repo.ensure_schema().await.unwrap();
        repo.upsert_category("cat-1", "Kitchen & Dining").await.unwrap();
        repo.insert_dataset(&Dataset {
            id: "ds-1".into(),
            category_id: "cat-1".into(),
            name: "kitchen-2024-05.xlsx".into(),
            status: DatasetStatus::Uploaded,
            time_from: Some("2024-05".into()),
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        let service = IngestionService::new(repo.clone(), repo.clone());
        (repo, service)
    }

    fn market_analysis_missing_sample_type() -> RawSheet {
        RawSheet::new(
            "Market Analysis",
            vec![
                vec![
                    text("Sample Size"),
                    text("Avg. Monthly Unit Sales"),
                    text("Avg. Monthly Revenue"),
                    text("Avg. Price"),
                ],
                vec![num(500.0), num(120.0), num(30.0), num(18.99)],
            ],
        )
    }

    fn fulfillment_sheet() -> RawSheet {
        RawSheet::new(
            "Fulfillment",
            vec![
                vec![text("Fulfillment Type"), text("Percentage")],
                vec![text("FBA"), num(0.625)],
                vec![text("FBM"), num(0.375)],
            ],
        )
    }

    fn market_analysis_sheet() -> RawSheet {
        RawSheet::new(
            "Market Analysis",
            vec![
                vec![
                    text("Sample Type"),
                    text("Sample Size"),
                    text("Avg. Monthly Unit Sales"),
                    text("Avg. Monthly Revenue"),
                    text("Avg. Price"),
                ],
                vec![text("All"), num(500.0), num(120.0), num(30.0), num(20.0)],
            ],
        )
    }

    fn ads_sheet_without_price() -> RawSheet {
        RawSheet::new(
            "Ads Metrics",
            vec![
                vec![
                    text("Keyword"),
                    text("Clicks"),
                    text("Impressions"),
                    text("Orders"),
                    text("Monthly Searches"),
                    text("Suggested Bid"),
                ],
                vec![
                    text("spatula"),
                    num(400.0),
                    num(6000.0),
                    num(30.0),
                    num(1000.0),
                    num(0.875),
                ],
            ],
        )
    }

    #[tokio::test]
    async fn test_sheet_failures_are_isolated() {
        use research_common::data::store::MetricStore;
        let (repo, service) = setup().await;

        let reports = service
            .ingest_sheets(
                "ds-1",
                vec![
                    (SheetKind::MarketAnalysis, market_analysis_missing_sample_type()),
                    (SheetKind::Fulfillment, fulfillment_sheet()),
                ],
            )
            .await
            .unwrap();

        let analysis = reports
            .iter()
            .find(|r| r.sheet == "market_analysis")
            .unwrap();
        assert!(analysis.error.as_deref().unwrap().contains("sample_type"));

        let fulfillment = reports.iter().find(|r| r.sheet == "fulfillment").unwrap();
        assert!(fulfillment.error.is_none());
        assert_eq!(fulfillment.records, 2);

        // The good sheet landed, and one success keeps the dataset ready.
        let stored = repo.get_records("ds-1", Some("fulfillment_fba")).await.unwrap();
        assert_eq!(stored.len(), 1);
        let dataset = repo.get_dataset("ds-1").await.unwrap();
        assert_eq!(dataset.status, DatasetStatus::Ready);
    }

    #[tokio::test]
    async fn test_all_sheets_failing_marks_dataset_failed() {
        use research_common::data::store::MetricStore;
        let (repo, service) = setup().await;

        let reports = service
            .ingest_sheets(
                "ds-1",
                vec![(
                    SheetKind::MarketAnalysis,
                    market_analysis_missing_sample_type(),
                )],
            )
            .await
            .unwrap();

        assert!(reports[0].error.is_some());
        let dataset = repo.get_dataset("ds-1").await.unwrap();
        assert_eq!(dataset.status, DatasetStatus::Failed);
    }

    #[tokio::test]
    async fn test_ads_avg_price_falls_back_to_stored_records() {
        use research_common::data::store::MetricStore;
        let (repo, service) = setup().await;

        // First pass stores avg_price 20.00 for 2024-05.
        service
            .ingest_sheets("ds-1", vec![(SheetKind::MarketAnalysis, market_analysis_sheet())])
            .await
            .unwrap();

        // Ads sheet has no price column; the same-bucket record is used.
        service
            .ingest_sheets("ds-1", vec![(SheetKind::AdsMetrics, ads_sheet_without_price())])
            .await
            .unwrap();

        let roas = repo.get_records("ds-1", Some("roas")).await.unwrap();
        assert_eq!(roas.len(), 1);
        // cr 0.03, price 20, cpc 0.875
        assert!((roas[0].value - 0.03 * 20.0 / 0.875).abs() < 1e-9);
        assert_eq!(roas[0].unit, MetricUnit::Ratio);
    }

    #[tokio::test]
    async fn test_reingestion_is_idempotent_through_service() {
        use research_common::data::store::MetricStore;
        let (repo, service) = setup().await;

        for _ in 0..2 {
            service
                .ingest_sheets(
                    "ds-1",
                    vec![(SheetKind::Fulfillment, fulfillment_sheet())],
                )
                .await
                .unwrap();
        }

        let stored = repo.get_records("ds-1", None).await.unwrap();
        assert_eq!(stored.len(), 2);
    }
}
