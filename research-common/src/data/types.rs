// data/types.rs
// Canonical metric model, rule tables and error types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed bucket token for single-snapshot sheets.
pub const BUCKET_OVERALL: &str = "overall";
/// Fixed bucket token for rank-1..10 concentration aggregates.
pub const BUCKET_TOP10: &str = "top10";

// =================================================================
// Errors
// =================================================================

/// Data layer error types
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DataResult<T> = Result<T, DataError>;

// =================================================================
// Metric records
// =================================================================

/// Unit attached to a stored metric value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    Usd,
    Pct,
    Units,
    Count,
    Ratio,
}

impl MetricUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricUnit::Usd => "usd",
            MetricUnit::Pct => "pct",
            MetricUnit::Units => "units",
            MetricUnit::Count => "count",
            MetricUnit::Ratio => "ratio",
        }
    }

    pub fn parse(s: &str) -> Option<MetricUnit> {
        match s {
            "usd" => Some(MetricUnit::Usd),
            "pct" => Some(MetricUnit::Pct),
            "units" => Some(MetricUnit::Units),
            "count" => Some(MetricUnit::Count),
            "ratio" => Some(MetricUnit::Ratio),
            _ => None,
        }
    }
}

/// One canonical time-series data point produced by sheet ingestion.
///
/// `bucket` is either a `YYYY-MM` month or a fixed token
/// (`overall`, `top10`). Records for a `(dataset_id, source_sheet)`
/// pair are replaced wholesale on re-ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    pub dataset_id: String,
    pub category_id: String,
    pub metric: String,
    pub bucket: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub source_sheet: String,
    pub sample_size: Option<f64>,
    pub sample_type: Option<String>,
    pub fee_percent: Option<f64>,
    pub base_price: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl MetricRecord {
    pub fn new(
        dataset_id: &str,
        category_id: &str,
        metric: &str,
        bucket: &str,
        value: f64,
        unit: MetricUnit,
        source_sheet: &str,
    ) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            category_id: category_id.to_string(),
            metric: metric.to_string(),
            bucket: bucket.to_string(),
            value,
            unit,
            source_sheet: source_sheet.to_string(),
            sample_size: None,
            sample_type: None,
            fee_percent: None,
            base_price: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_sample(mut self, sample_type: &str, sample_size: f64) -> Self {
        self.sample_type = Some(sample_type.to_string());
        self.sample_size = Some(sample_size);
        self
    }

    pub fn with_fee_basis(mut self, fee_percent: f64, base_price: f64) -> Self {
        self.fee_percent = Some(fee_percent);
        self.base_price = Some(base_price);
        self
    }
}

// =================================================================
// Datasets and categories
// =================================================================

/// Ingestion lifecycle of an uploaded dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    Uploaded,
    Parsed,
    Ready,
    Failed,
}

impl DatasetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Uploaded => "uploaded",
            DatasetStatus::Parsed => "parsed",
            DatasetStatus::Ready => "ready",
            DatasetStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<DatasetStatus> {
        match s {
            "uploaded" => Some(DatasetStatus::Uploaded),
            "parsed" => Some(DatasetStatus::Parsed),
            "ready" => Some(DatasetStatus::Ready),
            "failed" => Some(DatasetStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub status: DatasetStatus,
    /// Detected month (`YYYY-MM`) used as the default bucket for sheets
    /// that carry no time column of their own.
    pub time_from: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Category with its cached ingestion constants.
///
/// Constants are written back after each market-research / ads parse and
/// read as a fallback source when per-row rule matching fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub fba_fee_usd: Option<f64>,
    pub size_tier_estimate: Option<String>,
    pub avg_weight_lb: Option<f64>,
    pub avg_volume_in3: Option<f64>,
    pub referral_fee_percent_default: Option<f64>,
    pub referral_min_fee_usd: Option<f64>,
    pub default_ctr: Option<f64>,
    pub default_cpc: Option<f64>,
    pub default_cr: Option<f64>,
}

/// Partial update of category constants, produced by a parser and applied
/// by the caller through the store. Fields left `None` keep their stored
/// value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryConstantUpdate {
    pub fba_fee_usd: Option<f64>,
    pub size_tier_estimate: Option<String>,
    pub avg_weight_lb: Option<f64>,
    pub avg_volume_in3: Option<f64>,
    pub referral_fee_percent_default: Option<f64>,
    pub referral_min_fee_usd: Option<f64>,
    pub default_ctr: Option<f64>,
    pub default_cpc: Option<f64>,
    pub default_cr: Option<f64>,
}

impl CategoryConstantUpdate {
    pub fn is_empty(&self) -> bool {
        self.fba_fee_usd.is_none()
            && self.size_tier_estimate.is_none()
            && self.avg_weight_lb.is_none()
            && self.avg_volume_in3.is_none()
            && self.referral_fee_percent_default.is_none()
            && self.referral_min_fee_usd.is_none()
            && self.default_ctr.is_none()
            && self.default_cpc.is_none()
            && self.default_cr.is_none()
    }
}

// =================================================================
// Fee rule tables
// =================================================================

/// Whether a referral fee percentage applies to the whole price or only
/// to the slice of price inside the rule's band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeApplyTo {
    Total,
    Portion,
}

impl FeeApplyTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeApplyTo::Total => "total",
            FeeApplyTo::Portion => "portion",
        }
    }

    pub fn parse(s: &str) -> Option<FeeApplyTo> {
        match s {
            "total" => Some(FeeApplyTo::Total),
            "portion" => Some(FeeApplyTo::Portion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralFeeRule {
    pub category: String,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    /// Fraction, e.g. 0.15 for 15%.
    pub fee_percent: Decimal,
    pub apply_to: FeeApplyTo,
    pub min_fee_usd: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    In,
    Cm,
}

impl LengthUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            LengthUnit::In => "in",
            LengthUnit::Cm => "cm",
        }
    }

    pub fn parse(s: &str) -> Option<LengthUnit> {
        match s {
            "in" => Some(LengthUnit::In),
            "cm" => Some(LengthUnit::Cm),
            _ => None,
        }
    }

    /// Convert a length expressed in this unit to inches.
    pub fn to_inches(&self, value: f64) -> f64 {
        match self {
            LengthUnit::In => value,
            LengthUnit::Cm => value / 2.54,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    Lb,
    Oz,
}

impl WeightUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightUnit::Lb => "lb",
            WeightUnit::Oz => "oz",
        }
    }

    pub fn parse(s: &str) -> Option<WeightUnit> {
        match s {
            "lb" => Some(WeightUnit::Lb),
            "oz" => Some(WeightUnit::Oz),
            _ => None,
        }
    }

    /// Convert a weight expressed in this unit to pounds.
    pub fn to_pounds(&self, value: f64) -> f64 {
        match self {
            WeightUnit::Lb => value,
            WeightUnit::Oz => value / 16.0,
        }
    }

    /// Convert a weight expressed in pounds to this unit.
    pub fn from_pounds(&self, pounds: f64) -> f64 {
        match self {
            WeightUnit::Lb => pounds,
            WeightUnit::Oz => pounds * 16.0,
        }
    }
}

/// One row of the ordered size-tier table. The first rule whose defined
/// maxima accommodate the computed dimensions and shipping weight wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeTierRule {
    pub tier: String,
    pub longest_max: Option<f64>,
    pub median_max: Option<f64>,
    pub shortest_max: Option<f64>,
    pub length_girth_max: Option<f64>,
    pub shipping_weight_max: Option<f64>,
    pub unit_length: LengthUnit,
    pub unit_weight: WeightUnit,
}

/// Stepped surcharge applied above a weight threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverageRule {
    pub over_threshold_value: f64,
    pub over_threshold_unit: WeightUnit,
    pub step_value: f64,
    pub step_fee_usd: Decimal,
}

/// FBA fulfillment fee band for a size tier. Either a fixed `fee_usd`
/// or a `base_usd` plus overage ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FbaFeeRule {
    pub tier: String,
    /// Unit of `weight_min` / `weight_max`.
    pub unit: WeightUnit,
    pub weight_min: Option<f64>,
    pub weight_max: Option<f64>,
    pub fee_usd: Option<Decimal>,
    pub base_usd: Option<Decimal>,
    pub overage_rules: Vec<OverageRule>,
}
