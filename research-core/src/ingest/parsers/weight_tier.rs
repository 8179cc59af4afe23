// ingest/parsers/weight_tier.rs
// Market-research weight/volume sheet: dimensional weight, size tier
// and FBA fee estimation persisted as category constants

use research_common::data::types::{CategoryConstantUpdate, MetricRecord, MetricUnit};
use rust_decimal::prelude::ToPrimitive;

use super::{cell, ParseContext, SheetOutput};
use crate::fees::tiers::{fba_fee_for, normalize_tier_name, resolve_size_tier, PackageDims};
use crate::ingest::columns::{resolve_columns, ColumnPredicate, ColumnSpec};
use crate::ingest::errors::{IngestError, IngestResult};
use crate::ingest::header::detect_header_row;
use crate::ingest::month::is_month;
use crate::ingest::normalize::parse_positive;
use crate::ingest::workbook::{RawSheet, SheetKind};

/// Divisor of the volumetric (dimensional) weight formula, in³ per lb.
pub const DIMENSIONAL_WEIGHT_DIVISOR: f64 = 139.0;

static COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        label: "weight",
        required: true,
        predicates: &[ColumnPredicate::Contains("weight")],
    },
    ColumnSpec {
        label: "volume",
        required: true,
        predicates: &[ColumnPredicate::Contains("volume")],
    },
];

pub fn parse(ctx: &ParseContext<'_>, sheet: &RawSheet) -> IngestResult<SheetOutput> {
    let source = SheetKind::MarketResearch.source_sheet();
    let header_index = detect_header_row(sheet, SheetKind::MarketResearch.header_keywords());
    let cols = resolve_columns(sheet.header_row(header_index), COLUMNS)?;

    let weight_col = cols.get("weight").unwrap_or_default();
    let volume_col = cols.get("volume").unwrap_or_default();

    // First row carrying both weight and volume wins.
    let sample = sheet.body(header_index).iter().find_map(|row| {
        let weight = parse_positive(cell(row, weight_col))?;
        let volume = parse_positive(cell(row, volume_col))?;
        Some((weight, volume))
    });
    let Some((weight_lb, volume_in3)) = sample else {
        return Err(IngestError::NoValidRows(source.to_string()));
    };

    // Dimensions are assumed cubic: one side from the volume, girth
    // from two side pairs.
    let side = volume_in3.cbrt();
    let dimensional_weight = volume_in3 / DIMENSIONAL_WEIGHT_DIVISOR;
    let shipping_weight = weight_lb.max(dimensional_weight);
    let dims = PackageDims {
        longest: side,
        median: side,
        shortest: side,
        length_girth: side + 2.0 * (side + side),
        shipping_weight_lb: shipping_weight,
    };

    let tier_rule = resolve_size_tier(&ctx.rules.size_tiers, &dims).ok_or_else(|| {
        IngestError::NoMatchingTier(format!(
            "{:.3} in sides at {:.4} lb shipping weight",
            side, shipping_weight
        ))
    })?;
    let tier = normalize_tier_name(&tier_rule.tier);
    let fba_fee = fba_fee_for(&ctx.rules.fba_fees, &tier, shipping_weight)?
        .to_f64()
        .unwrap_or(0.0);

    // Monthly record set only when the dataset carries a real month.
    let mut records = Vec::new();
    if is_month(ctx.default_bucket) {
        let make = |metric: &str, value: f64, unit: MetricUnit| {
            MetricRecord::new(
                ctx.dataset_id,
                ctx.category_id,
                metric,
                ctx.default_bucket,
                value,
                unit,
                source,
            )
        };
        records.push(make("avg_weight_lb", weight_lb, MetricUnit::Count));
        records.push(make("avg_volume_in3", volume_in3, MetricUnit::Count));
        records.push(make("fba_fee", fba_fee, MetricUnit::Usd));
    }

    let category_update = CategoryConstantUpdate {
        fba_fee_usd: Some(fba_fee),
        size_tier_estimate: Some(tier),
        avg_weight_lb: Some(weight_lb),
        avg_volume_in3: Some(volume_in3),
        ..Default::default()
    };

    Ok(SheetOutput {
        records,
        category_update: Some(category_update),
    })
}
