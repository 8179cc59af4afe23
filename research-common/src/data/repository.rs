// data/repository.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use super::store::{MetricStore, RuleStore};
use super::types::{
    Category, CategoryConstantUpdate, DataError, DataResult, Dataset, DatasetStatus,
    FbaFeeRule, FeeApplyTo, LengthUnit, MetricRecord, MetricUnit, OverageRule,
    ReferralFeeRule, SizeTierRule, WeightUnit,
};

// =================================================================
// Repository Implementation
// =================================================================

/// SQLite-backed store for metric records, datasets, categories and the
/// externally maintained fee rule tables.
pub struct MetricRepository {
    pool: SqlitePool,
}

impl MetricRepository {
    pub async fn new(url: &str) -> DataResult<Self> {
        let pool = SqlitePool::connect(url)
            .await
            .map_err(DataError::Database)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create all tables and indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> DataResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                fba_fee_usd REAL,
                size_tier_estimate TEXT,
                avg_weight_lb REAL,
                avg_volume_in3 REAL,
                referral_fee_percent_default REAL,
                referral_min_fee_usd REAL,
                default_ctr REAL,
                default_cpc REAL,
                default_cr REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS datasets (
                id TEXT PRIMARY KEY,
                category_id TEXT NOT NULL,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                time_from TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metric_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dataset_id TEXT NOT NULL,
                category_id TEXT NOT NULL,
                metric TEXT NOT NULL,
                bucket TEXT NOT NULL,
                value REAL NOT NULL,
                unit TEXT NOT NULL,
                source_sheet TEXT NOT NULL,
                sample_size REAL,
                sample_type TEXT,
                fee_percent REAL,
                base_price REAL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_records_dataset_sheet
                ON metric_records(dataset_id, source_sheet);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_records_metric_bucket
                ON metric_records(dataset_id, metric, bucket);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS referral_fee_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                price_min TEXT,
                price_max TEXT,
                fee_percent TEXT NOT NULL,
                apply_to TEXT NOT NULL,
                min_fee_usd TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS size_tier_rules (
                position INTEGER PRIMARY KEY AUTOINCREMENT,
                tier TEXT NOT NULL,
                longest_max REAL,
                median_max REAL,
                shortest_max REAL,
                length_girth_max REAL,
                shipping_weight_max REAL,
                unit_length TEXT NOT NULL,
                unit_weight TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fba_fee_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tier TEXT NOT NULL,
                unit TEXT NOT NULL,
                weight_min REAL,
                weight_max REAL,
                fee_usd TEXT,
                base_usd TEXT,
                overage_rules TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;

        Ok(())
    }

    // =================================================================
    // Categories and datasets
    // =================================================================

    pub async fn upsert_category(&self, id: &str, name: &str) -> DataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;
        Ok(())
    }

    pub async fn insert_dataset(&self, dataset: &Dataset) -> DataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO datasets (id, category_id, name, status, time_from, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&dataset.id)
        .bind(&dataset.category_id)
        .bind(&dataset.name)
        .bind(dataset.status.as_str())
        .bind(&dataset.time_from)
        .bind(dataset.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;
        Ok(())
    }

    /// Delete a dataset and cascade its metric records.
    pub async fn delete_dataset(&self, dataset_id: &str) -> DataResult<()> {
        sqlx::query("DELETE FROM metric_records WHERE dataset_id = ?1")
            .bind(dataset_id)
            .execute(&self.pool)
            .await
            .map_err(DataError::Database)?;

        sqlx::query("DELETE FROM datasets WHERE id = ?1")
            .bind(dataset_id)
            .execute(&self.pool)
            .await
            .map_err(DataError::Database)?;

        info!("Deleted dataset {} and its metric records", dataset_id);
        Ok(())
    }

    // =================================================================
    // Rule table seeding
    // =================================================================

    pub async fn insert_referral_fee_rule(&self, rule: &ReferralFeeRule) -> DataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO referral_fee_rules
            (category, price_min, price_max, fee_percent, apply_to, min_fee_usd)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&rule.category)
        .bind(rule.price_min.map(|d| d.to_string()))
        .bind(rule.price_max.map(|d| d.to_string()))
        .bind(rule.fee_percent.to_string())
        .bind(rule.apply_to.as_str())
        .bind(rule.min_fee_usd.map(|d| d.to_string()))
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;
        Ok(())
    }

    pub async fn insert_size_tier_rule(&self, rule: &SizeTierRule) -> DataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO size_tier_rules
            (tier, longest_max, median_max, shortest_max, length_girth_max,
             shipping_weight_max, unit_length, unit_weight)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&rule.tier)
        .bind(rule.longest_max)
        .bind(rule.median_max)
        .bind(rule.shortest_max)
        .bind(rule.length_girth_max)
        .bind(rule.shipping_weight_max)
        .bind(rule.unit_length.as_str())
        .bind(rule.unit_weight.as_str())
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;
        Ok(())
    }

    pub async fn insert_fba_fee_rule(&self, rule: &FbaFeeRule) -> DataResult<()> {
        let overages = serde_json::to_string(&rule.overage_rules)?;
        sqlx::query(
            r#"
            INSERT INTO fba_fee_rules
            (tier, unit, weight_min, weight_max, fee_usd, base_usd, overage_rules)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&rule.tier)
        .bind(rule.unit.as_str())
        .bind(rule.weight_min)
        .bind(rule.weight_max)
        .bind(rule.fee_usd.map(|d| d.to_string()))
        .bind(rule.base_usd.map(|d| d.to_string()))
        .bind(overages)
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;
        Ok(())
    }

    // =================================================================
    // Helper Methods
    // =================================================================

    /// Validate a metric record before it is written.
    fn validate_record(&self, record: &MetricRecord) -> DataResult<()> {
        if record.metric.is_empty() {
            return Err(DataError::Validation("Metric name cannot be empty".into()));
        }
        if record.bucket.is_empty() {
            return Err(DataError::Validation("Bucket cannot be empty".into()));
        }
        if !record.value.is_finite() {
            return Err(DataError::Validation(format!(
                "Non-finite value for metric '{}'",
                record.metric
            )));
        }
        Ok(())
    }

    fn metric_from_row(row: &SqliteRow) -> DataResult<MetricRecord> {
        let unit_text: String = row.try_get("unit").map_err(DataError::Database)?;
        let unit = MetricUnit::parse(&unit_text).ok_or_else(|| {
            DataError::Validation(format!("Unknown metric unit '{}'", unit_text))
        })?;
        let created_ms: i64 = row.try_get("created_at").map_err(DataError::Database)?;
        let created_at = DateTime::from_timestamp_millis(created_ms).unwrap_or_else(Utc::now);

        Ok(MetricRecord {
            dataset_id: row.try_get("dataset_id").map_err(DataError::Database)?,
            category_id: row.try_get("category_id").map_err(DataError::Database)?,
            metric: row.try_get("metric").map_err(DataError::Database)?,
            bucket: row.try_get("bucket").map_err(DataError::Database)?,
            value: row.try_get("value").map_err(DataError::Database)?,
            unit,
            source_sheet: row.try_get("source_sheet").map_err(DataError::Database)?,
            sample_size: row.try_get("sample_size").map_err(DataError::Database)?,
            sample_type: row.try_get("sample_type").map_err(DataError::Database)?,
            fee_percent: row.try_get("fee_percent").map_err(DataError::Database)?,
            base_price: row.try_get("base_price").map_err(DataError::Database)?,
            created_at,
        })
    }

    fn decimal_column(row: &SqliteRow, column: &str) -> DataResult<Option<Decimal>> {
        let text: Option<String> = row.try_get(column).map_err(DataError::Database)?;
        match text {
            Some(t) => Decimal::from_str(&t)
                .map(Some)
                .map_err(|e| DataError::Validation(format!("Invalid decimal '{}': {}", t, e))),
            None => Ok(None),
        }
    }

    async fn insert_record(&self, record: &MetricRecord) -> DataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO metric_records
            (dataset_id, category_id, metric, bucket, value, unit, source_sheet,
             sample_size, sample_type, fee_percent, base_price, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&record.dataset_id)
        .bind(&record.category_id)
        .bind(&record.metric)
        .bind(&record.bucket)
        .bind(record.value)
        .bind(record.unit.as_str())
        .bind(&record.source_sheet)
        .bind(record.sample_size)
        .bind(&record.sample_type)
        .bind(record.fee_percent)
        .bind(record.base_price)
        .bind(record.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;
        Ok(())
    }
}

// =================================================================
// MetricStore
// =================================================================

#[async_trait]
impl MetricStore for MetricRepository {
    async fn replace_sheet_records(
        &self,
        dataset_id: &str,
        source_sheet: &str,
        records: &[MetricRecord],
    ) -> DataResult<usize> {
        for record in records {
            self.validate_record(record)?;
        }

        debug!(
            "Replacing records for dataset={} sheet={} with {} new rows",
            dataset_id,
            source_sheet,
            records.len()
        );

        sqlx::query("DELETE FROM metric_records WHERE dataset_id = ?1 AND source_sheet = ?2")
            .bind(dataset_id)
            .bind(source_sheet)
            .execute(&self.pool)
            .await
            .map_err(DataError::Database)?;

        for record in records {
            self.insert_record(record).await?;
        }

        info!(
            "Wrote {} records for dataset={} sheet={}",
            records.len(),
            dataset_id,
            source_sheet
        );
        Ok(records.len())
    }

    async fn get_records(
        &self,
        dataset_id: &str,
        metric: Option<&str>,
    ) -> DataResult<Vec<MetricRecord>> {
        let rows = match metric {
            Some(m) => {
                sqlx::query(
                    r#"
                    SELECT * FROM metric_records
                    WHERE dataset_id = ?1 AND metric = ?2
                    ORDER BY bucket, metric, id
                    "#,
                )
                .bind(dataset_id)
                .bind(m)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM metric_records
                    WHERE dataset_id = ?1
                    ORDER BY bucket, metric, id
                    "#,
                )
                .bind(dataset_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(DataError::Database)?;

        rows.iter().map(Self::metric_from_row).collect()
    }

    async fn get_metric_candidates(
        &self,
        dataset_id: &str,
        metric: &str,
        bucket: &str,
    ) -> DataResult<Vec<MetricRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM metric_records
            WHERE dataset_id = ?1 AND metric = ?2 AND bucket = ?3
            ORDER BY id
            "#,
        )
        .bind(dataset_id)
        .bind(metric)
        .bind(bucket)
        .fetch_all(&self.pool)
        .await
        .map_err(DataError::Database)?;

        rows.iter().map(Self::metric_from_row).collect()
    }

    async fn category_month_candidates(
        &self,
        category_id: &str,
        metric: &str,
        bucket: &str,
        exclude_dataset: &str,
    ) -> DataResult<Vec<MetricRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM metric_records
            WHERE category_id = ?1 AND metric = ?2 AND bucket = ?3
              AND dataset_id != ?4
            ORDER BY id
            "#,
        )
        .bind(category_id)
        .bind(metric)
        .bind(bucket)
        .bind(exclude_dataset)
        .fetch_all(&self.pool)
        .await
        .map_err(DataError::Database)?;

        rows.iter().map(Self::metric_from_row).collect()
    }

    async fn latest_metric_value(
        &self,
        dataset_id: &str,
        metric: &str,
    ) -> DataResult<Option<f64>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM metric_records
            WHERE dataset_id = ?1 AND metric = ?2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(dataset_id)
        .bind(metric)
        .fetch_optional(&self.pool)
        .await
        .map_err(DataError::Database)?;

        match row {
            Some(r) => Ok(Some(r.try_get("value").map_err(DataError::Database)?)),
            None => Ok(None),
        }
    }

    async fn get_dataset(&self, dataset_id: &str) -> DataResult<Dataset> {
        let row = sqlx::query("SELECT * FROM datasets WHERE id = ?1")
            .bind(dataset_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DataError::Database)?
            .ok_or_else(|| DataError::NotFound(format!("Dataset '{}'", dataset_id)))?;

        let status_text: String = row.try_get("status").map_err(DataError::Database)?;
        let status = DatasetStatus::parse(&status_text).ok_or_else(|| {
            DataError::Validation(format!("Unknown dataset status '{}'", status_text))
        })?;
        let created_ms: i64 = row.try_get("created_at").map_err(DataError::Database)?;

        Ok(Dataset {
            id: row.try_get("id").map_err(DataError::Database)?,
            category_id: row.try_get("category_id").map_err(DataError::Database)?,
            name: row.try_get("name").map_err(DataError::Database)?,
            status,
            time_from: row.try_get("time_from").map_err(DataError::Database)?,
            created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_else(Utc::now),
        })
    }

    async fn set_dataset_status(
        &self,
        dataset_id: &str,
        status: DatasetStatus,
    ) -> DataResult<()> {
        sqlx::query("UPDATE datasets SET status = ?1 WHERE id = ?2")
            .bind(status.as_str())
            .bind(dataset_id)
            .execute(&self.pool)
            .await
            .map_err(DataError::Database)?;
        debug!("Dataset {} status -> {}", dataset_id, status.as_str());
        Ok(())
    }

    async fn set_dataset_time_from(&self, dataset_id: &str, month: &str) -> DataResult<()> {
        sqlx::query("UPDATE datasets SET time_from = ?1 WHERE id = ?2")
            .bind(month)
            .bind(dataset_id)
            .execute(&self.pool)
            .await
            .map_err(DataError::Database)?;
        Ok(())
    }

    async fn get_category(&self, category_id: &str) -> DataResult<Category> {
        let row = sqlx::query("SELECT * FROM categories WHERE id = ?1")
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DataError::Database)?
            .ok_or_else(|| DataError::NotFound(format!("Category '{}'", category_id)))?;

        Ok(Category {
            id: row.try_get("id").map_err(DataError::Database)?,
            name: row.try_get("name").map_err(DataError::Database)?,
            fba_fee_usd: row.try_get("fba_fee_usd").map_err(DataError::Database)?,
            size_tier_estimate: row
                .try_get("size_tier_estimate")
                .map_err(DataError::Database)?,
            avg_weight_lb: row.try_get("avg_weight_lb").map_err(DataError::Database)?,
            avg_volume_in3: row.try_get("avg_volume_in3").map_err(DataError::Database)?,
            referral_fee_percent_default: row
                .try_get("referral_fee_percent_default")
                .map_err(DataError::Database)?,
            referral_min_fee_usd: row
                .try_get("referral_min_fee_usd")
                .map_err(DataError::Database)?,
            default_ctr: row.try_get("default_ctr").map_err(DataError::Database)?,
            default_cpc: row.try_get("default_cpc").map_err(DataError::Database)?,
            default_cr: row.try_get("default_cr").map_err(DataError::Database)?,
        })
    }

    async fn apply_constant_update(
        &self,
        category_id: &str,
        update: &CategoryConstantUpdate,
    ) -> DataResult<()> {
        if update.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE categories SET
                fba_fee_usd = COALESCE(?1, fba_fee_usd),
                size_tier_estimate = COALESCE(?2, size_tier_estimate),
                avg_weight_lb = COALESCE(?3, avg_weight_lb),
                avg_volume_in3 = COALESCE(?4, avg_volume_in3),
                referral_fee_percent_default = COALESCE(?5, referral_fee_percent_default),
                referral_min_fee_usd = COALESCE(?6, referral_min_fee_usd),
                default_ctr = COALESCE(?7, default_ctr),
                default_cpc = COALESCE(?8, default_cpc),
                default_cr = COALESCE(?9, default_cr)
            WHERE id = ?10
            "#,
        )
        .bind(update.fba_fee_usd)
        .bind(&update.size_tier_estimate)
        .bind(update.avg_weight_lb)
        .bind(update.avg_volume_in3)
        .bind(update.referral_fee_percent_default)
        .bind(update.referral_min_fee_usd)
        .bind(update.default_ctr)
        .bind(update.default_cpc)
        .bind(update.default_cr)
        .bind(category_id)
        .execute(&self.pool)
        .await
        .map_err(DataError::Database)?;

        info!("Updated category {} constants", category_id);
        Ok(())
    }
}

// =================================================================
// RuleStore
// =================================================================

#[async_trait]
impl RuleStore for MetricRepository {
    async fn referral_fee_rules(&self) -> DataResult<Vec<ReferralFeeRule>> {
        let rows = sqlx::query("SELECT * FROM referral_fee_rules ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::Database)?;

        rows.iter()
            .map(|row| {
                let apply_text: String = row.try_get("apply_to").map_err(DataError::Database)?;
                let apply_to = FeeApplyTo::parse(&apply_text).ok_or_else(|| {
                    DataError::Validation(format!("Unknown apply_to '{}'", apply_text))
                })?;
                let fee_text: String =
                    row.try_get("fee_percent").map_err(DataError::Database)?;
                let fee_percent = Decimal::from_str(&fee_text).map_err(|e| {
                    DataError::Validation(format!("Invalid fee percent '{}': {}", fee_text, e))
                })?;

                Ok(ReferralFeeRule {
                    category: row.try_get("category").map_err(DataError::Database)?,
                    price_min: Self::decimal_column(row, "price_min")?,
                    price_max: Self::decimal_column(row, "price_max")?,
                    fee_percent,
                    apply_to,
                    min_fee_usd: Self::decimal_column(row, "min_fee_usd")?,
                })
            })
            .collect()
    }

    async fn size_tier_rules(&self) -> DataResult<Vec<SizeTierRule>> {
        let rows = sqlx::query("SELECT * FROM size_tier_rules ORDER BY position")
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::Database)?;

        rows.iter()
            .map(|row| {
                let length_text: String =
                    row.try_get("unit_length").map_err(DataError::Database)?;
                let weight_text: String =
                    row.try_get("unit_weight").map_err(DataError::Database)?;
                let unit_length = LengthUnit::parse(&length_text).ok_or_else(|| {
                    DataError::Validation(format!("Unknown length unit '{}'", length_text))
                })?;
                let unit_weight = WeightUnit::parse(&weight_text).ok_or_else(|| {
                    DataError::Validation(format!("Unknown weight unit '{}'", weight_text))
                })?;

                Ok(SizeTierRule {
                    tier: row.try_get("tier").map_err(DataError::Database)?,
                    longest_max: row.try_get("longest_max").map_err(DataError::Database)?,
                    median_max: row.try_get("median_max").map_err(DataError::Database)?,
                    shortest_max: row.try_get("shortest_max").map_err(DataError::Database)?,
                    length_girth_max: row
                        .try_get("length_girth_max")
                        .map_err(DataError::Database)?,
                    shipping_weight_max: row
                        .try_get("shipping_weight_max")
                        .map_err(DataError::Database)?,
                    unit_length,
                    unit_weight,
                })
            })
            .collect()
    }

    async fn fba_fee_rules(&self) -> DataResult<Vec<FbaFeeRule>> {
        let rows = sqlx::query("SELECT * FROM fba_fee_rules ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::Database)?;

        rows.iter()
            .map(|row| {
                let unit_text: String = row.try_get("unit").map_err(DataError::Database)?;
                let unit = WeightUnit::parse(&unit_text).ok_or_else(|| {
                    DataError::Validation(format!("Unknown weight unit '{}'", unit_text))
                })?;
                let overage_text: String =
                    row.try_get("overage_rules").map_err(DataError::Database)?;
                let overage_rules: Vec<OverageRule> = serde_json::from_str(&overage_text)?;

                Ok(FbaFeeRule {
                    tier: row.try_get("tier").map_err(DataError::Database)?,
                    unit,
                    weight_min: row.try_get("weight_min").map_err(DataError::Database)?,
                    weight_max: row.try_get("weight_max").map_err(DataError::Database)?,
                    fee_usd: Self::decimal_column(row, "fee_usd")?,
                    base_usd: Self::decimal_column(row, "base_usd")?,
                    overage_rules,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::BUCKET_OVERALL;
    use rust_decimal::prelude::FromPrimitive;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_repo() -> MetricRepository {
        // Single connection so the in-memory database is shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = MetricRepository::from_pool(pool);
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
        repo
    }

    fn sample_records(n: usize) -> Vec<MetricRecord> {
        (0..n)
            .map(|i| {
                MetricRecord::new(
                    "ds-1",
                    "cat-1",
                    "sales_units",
                    "2024-05",
                    1000.0 + i as f64,
                    MetricUnit::Units,
                    "market_analysis",
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn replace_is_idempotent() {
        let repo = test_repo().await;
        let records = sample_records(3);

        repo.replace_sheet_records("ds-1", "market_analysis", &records)
            .await
            .unwrap();
        repo.replace_sheet_records("ds-1", "market_analysis", &records)
            .await
            .unwrap();

        let stored = repo.get_records("ds-1", None).await.unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn replace_only_touches_own_sheet() {
        let repo = test_repo().await;
        repo.replace_sheet_records("ds-1", "market_analysis", &sample_records(2))
            .await
            .unwrap();

        let fulfillment = vec![MetricRecord::new(
            "ds-1",
            "cat-1",
            "fulfillment_fba",
            BUCKET_OVERALL,
            62.5,
            MetricUnit::Pct,
            "fulfillment",
        )];
        repo.replace_sheet_records("ds-1", "fulfillment", &fulfillment)
            .await
            .unwrap();
        repo.replace_sheet_records("ds-1", "market_analysis", &sample_records(1))
            .await
            .unwrap();

        let stored = repo.get_records("ds-1", None).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().any(|r| r.metric == "fulfillment_fba"));
    }

    #[tokio::test]
    async fn delete_dataset_cascades() {
        let repo = test_repo().await;
        repo.replace_sheet_records("ds-1", "market_analysis", &sample_records(2))
            .await
            .unwrap();

        repo.delete_dataset("ds-1").await.unwrap();

        assert!(matches!(
            repo.get_dataset("ds-1").await,
            Err(DataError::NotFound(_))
        ));
        let stored = repo.get_records("ds-1", None).await.unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn constant_update_is_partial() {
        let repo = test_repo().await;

        repo.apply_constant_update(
            "cat-1",
            &CategoryConstantUpdate {
                fba_fee_usd: Some(3.22),
                referral_fee_percent_default: Some(0.15),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        repo.apply_constant_update(
            "cat-1",
            &CategoryConstantUpdate {
                avg_weight_lb: Some(0.24),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let category = repo.get_category("cat-1").await.unwrap();
        assert_eq!(category.fba_fee_usd, Some(3.22));
        assert_eq!(category.referral_fee_percent_default, Some(0.15));
        assert_eq!(category.avg_weight_lb, Some(0.24));
    }

    #[tokio::test]
    async fn fba_rule_overages_round_trip() {
        let repo = test_repo().await;
        let rule = FbaFeeRule {
            tier: "Oversize".into(),
            unit: WeightUnit::Lb,
            weight_min: Some(0.0),
            weight_max: Some(150.0),
            fee_usd: None,
            base_usd: Decimal::from_f64(9.73),
            overage_rules: vec![OverageRule {
                over_threshold_value: 1.0,
                over_threshold_unit: WeightUnit::Lb,
                step_value: 0.5,
                step_fee_usd: Decimal::from_f64(0.38).unwrap(),
            }],
        };
        repo.insert_fba_fee_rule(&rule).await.unwrap();

        let rules = repo.fba_fee_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].overage_rules.len(), 1);
        assert_eq!(rules[0].overage_rules[0].over_threshold_unit, WeightUnit::Lb);
    }
}
