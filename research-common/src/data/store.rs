// data/store.rs
// Persistence boundary consumed by the ingestion engine

use async_trait::async_trait;

use super::types::{
    Category, CategoryConstantUpdate, DataResult, Dataset, DatasetStatus, FbaFeeRule,
    MetricRecord, ReferralFeeRule, SizeTierRule,
};

/// Store contract for metric records, datasets and category constants.
///
/// Ingestion only ever goes through this trait; the engine stays pure
/// given the collaborator.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Replace the full record set for `(dataset_id, source_sheet)`.
    /// Delete-then-insert, best effort (no transaction).
    async fn replace_sheet_records(
        &self,
        dataset_id: &str,
        source_sheet: &str,
        records: &[MetricRecord],
    ) -> DataResult<usize>;

    /// All records of a dataset, optionally restricted to one metric.
    async fn get_records(
        &self,
        dataset_id: &str,
        metric: Option<&str>,
    ) -> DataResult<Vec<MetricRecord>>;

    /// Candidate records for one `(metric, bucket)` pair of a dataset,
    /// to be narrowed down by the reconciler.
    async fn get_metric_candidates(
        &self,
        dataset_id: &str,
        metric: &str,
        bucket: &str,
    ) -> DataResult<Vec<MetricRecord>>;

    /// Candidate records for `(metric, bucket)` across all other datasets
    /// of a category.
    async fn category_month_candidates(
        &self,
        category_id: &str,
        metric: &str,
        bucket: &str,
        exclude_dataset: &str,
    ) -> DataResult<Vec<MetricRecord>>;

    /// Most recently written value of a metric for a dataset, any bucket.
    async fn latest_metric_value(
        &self,
        dataset_id: &str,
        metric: &str,
    ) -> DataResult<Option<f64>>;

    async fn get_dataset(&self, dataset_id: &str) -> DataResult<Dataset>;

    async fn set_dataset_status(
        &self,
        dataset_id: &str,
        status: DatasetStatus,
    ) -> DataResult<()>;

    async fn set_dataset_time_from(&self, dataset_id: &str, month: &str) -> DataResult<()>;

    async fn get_category(&self, category_id: &str) -> DataResult<Category>;

    /// Apply a partial constants update; `None` fields keep their value.
    async fn apply_constant_update(
        &self,
        category_id: &str,
        update: &CategoryConstantUpdate,
    ) -> DataResult<()>;
}

/// Read-only access to the externally supplied fee rule tables.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn referral_fee_rules(&self) -> DataResult<Vec<ReferralFeeRule>>;

    /// Size tier rules in table order; first match wins.
    async fn size_tier_rules(&self) -> DataResult<Vec<SizeTierRule>>;

    async fn fba_fee_rules(&self) -> DataResult<Vec<FbaFeeRule>>;
}
