// ingest/parsers/mod.rs
// One parser per known sheet shape, all pure over raw rows

pub mod ads_metrics;
pub mod fulfillment;
pub mod listing_concentration;
pub mod market_analysis;
pub mod publication_time;
pub mod seller_origin;
pub mod weight_tier;

use research_common::data::types::{
    Category, CategoryConstantUpdate, FbaFeeRule, MetricRecord, ReferralFeeRule, SizeTierRule,
};

use super::errors::IngestResult;
use super::workbook::{RawCell, RawSheet, SheetKind};

/// Externally supplied fee rule tables, loaded once per ingestion run.
#[derive(Debug, Default, Clone)]
pub struct RuleSet {
    pub referral: Vec<ReferralFeeRule>,
    pub size_tiers: Vec<SizeTierRule>,
    pub fba_fees: Vec<FbaFeeRule>,
}

/// Everything a parser may read. Parsers never touch the store.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub dataset_id: &'a str,
    pub category_id: &'a str,
    /// Category constants used as fallback when rule matching fails.
    pub category: &'a Category,
    pub rules: &'a RuleSet,
    /// Bucket for sheets without a time column: the dataset month, or
    /// `overall` when none was detected.
    pub default_bucket: &'a str,
    /// Pre-resolved average price for the ads aggregate path, from the
    /// store-backed fallback chain.
    pub fallback_avg_price: Option<f64>,
}

/// Successful parse: the record set that replaces the sheet's previous
/// records, plus an optional constants update for the category.
#[derive(Debug, Default)]
pub struct SheetOutput {
    pub records: Vec<MetricRecord>,
    pub category_update: Option<CategoryConstantUpdate>,
}

/// Dispatch a raw sheet to its parser.
pub fn parse_sheet(
    kind: SheetKind,
    ctx: &ParseContext<'_>,
    sheet: &RawSheet,
) -> IngestResult<SheetOutput> {
    match kind {
        SheetKind::MarketAnalysis => market_analysis::parse(ctx, sheet),
        SheetKind::Fulfillment => fulfillment::parse(ctx, sheet),
        SheetKind::PublicationTime => publication_time::parse(ctx, sheet),
        SheetKind::SellerOrigin => seller_origin::parse(ctx, sheet),
        SheetKind::ListingConcentration => listing_concentration::parse(ctx, sheet),
        SheetKind::AdsMetrics => ads_metrics::parse(ctx, sheet),
        SheetKind::MarketResearch => weight_tier::parse(ctx, sheet),
    }
}

static EMPTY_CELL: RawCell = RawCell::Empty;

/// Cell at a resolved column, tolerating short rows.
pub(crate) fn cell(row: &[RawCell], index: usize) -> &RawCell {
    row.get(index).unwrap_or(&EMPTY_CELL)
}

/// Cell at an optional column.
pub(crate) fn opt_cell(row: &[RawCell], index: Option<usize>) -> Option<&RawCell> {
    index.map(|i| cell(row, i))
}
