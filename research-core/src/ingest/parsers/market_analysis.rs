// ingest/parsers/market_analysis.rs
// Per-cohort sales/revenue/price/rating metrics plus fee and
// profitability enrichment

use research_common::data::types::{MetricRecord, MetricUnit};

use super::{cell, opt_cell, ParseContext, SheetOutput};
use crate::fees::{derived, matcher};
use crate::ingest::columns::{resolve_columns, ColumnPredicate, ColumnSpec};
use crate::ingest::errors::{IngestError, IngestResult};
use crate::ingest::header::detect_header_row;
use crate::ingest::month::parse_month_cell;
use crate::ingest::normalize::{cell_text, parse_positive};
use crate::ingest::workbook::{RawSheet, SheetKind};

/// The panel reports monthly revenue in hundreds of dollars.
pub const REVENUE_MULTIPLIER: f64 = 100.0;

static COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        label: "sample_type",
        required: true,
        predicates: &[
            ColumnPredicate::Contains("sample type"),
            ColumnPredicate::Contains("cohort"),
        ],
    },
    ColumnSpec {
        label: "sample_size",
        required: true,
        predicates: &[ColumnPredicate::Contains("sample size")],
    },
    ColumnSpec {
        label: "unit_sales",
        required: true,
        predicates: &[
            ColumnPredicate::Contains("unit sales"),
            ColumnPredicate::Contains("monthly sales"),
        ],
    },
    ColumnSpec {
        label: "revenue",
        required: true,
        predicates: &[ColumnPredicate::Contains("revenue")],
    },
    ColumnSpec {
        label: "price",
        required: true,
        predicates: &[ColumnPredicate::Contains("price")],
    },
    ColumnSpec {
        label: "ratings",
        required: false,
        predicates: &[
            ColumnPredicate::Contains("ratings"),
            ColumnPredicate::Contains("reviews"),
        ],
    },
    ColumnSpec {
        label: "rating",
        required: false,
        predicates: &[ColumnPredicate::ContainsExcluding {
            needle: "rating",
            exclude: &["ratings"],
        }],
    },
    ColumnSpec {
        label: "month",
        required: false,
        predicates: &[
            ColumnPredicate::Contains("month"),
            ColumnPredicate::Contains("date"),
        ],
    },
];

pub fn parse(ctx: &ParseContext<'_>, sheet: &RawSheet) -> IngestResult<SheetOutput> {
    let source = SheetKind::MarketAnalysis.source_sheet();
    let header_index = detect_header_row(sheet, SheetKind::MarketAnalysis.header_keywords());
    let cols = resolve_columns(sheet.header_row(header_index), COLUMNS)?;

    let sample_type_col = cols.get("sample_type").unwrap_or_default();
    let sample_size_col = cols.get("sample_size").unwrap_or_default();
    let unit_sales_col = cols.get("unit_sales").unwrap_or_default();
    let revenue_col = cols.get("revenue").unwrap_or_default();
    let price_col = cols.get("price").unwrap_or_default();

    let mut records = Vec::new();
    let mut valid_rows = 0usize;

    for row in sheet.body(header_index) {
        let Some(sample_type) = cell_text(cell(row, sample_type_col)) else {
            continue;
        };
        let Some(sample_size) = parse_positive(cell(row, sample_size_col)) else {
            continue;
        };
        let Some(unit_sales) = parse_positive(cell(row, unit_sales_col)) else {
            continue;
        };
        let Some(revenue) = parse_positive(cell(row, revenue_col)) else {
            continue;
        };
        let Some(price) = parse_positive(cell(row, price_col)) else {
            continue;
        };

        let bucket = opt_cell(row, cols.get("month"))
            .and_then(parse_month_cell)
            .unwrap_or_else(|| ctx.default_bucket.to_string());
        valid_rows += 1;

        let make = |metric: &str, value: f64, unit: MetricUnit| {
            MetricRecord::new(
                ctx.dataset_id,
                ctx.category_id,
                metric,
                &bucket,
                value,
                unit,
                source,
            )
            .with_sample(&sample_type, sample_size)
        };

        records.push(make("sales_units", unit_sales * sample_size, MetricUnit::Units));
        records.push(make("revenue", revenue * REVENUE_MULTIPLIER, MetricUnit::Usd));
        records.push(make("avg_price", price, MetricUnit::Usd));

        if let Some(ratings) = opt_cell(row, cols.get("ratings")).and_then(parse_positive) {
            records.push(make("avg_ratings", ratings, MetricUnit::Count));
        }
        if let Some(rating) = opt_cell(row, cols.get("rating")).and_then(parse_positive) {
            records.push(make("avg_rating", rating, MetricUnit::Count));
        }

        // Fee and profitability enrichment. A missing referral fee is
        // not an error; derived metrics then run with fee 0.
        let referral = matcher::referral_fee(
            &ctx.rules.referral,
            &ctx.category.name,
            price,
            ctx.category.referral_fee_percent_default,
            ctx.category.referral_min_fee_usd,
        );
        if let Some(referral) = referral {
            records.push(
                make("referral_fee", referral.amount, MetricUnit::Usd)
                    .with_fee_basis(referral.percent, price),
            );
        }

        let fba_fee = ctx.category.fba_fee_usd.unwrap_or(0.0);
        let referral_amount = referral.map(|f| f.amount).unwrap_or(0.0);
        let costs = derived::derive_costs(price, referral_amount, fba_fee);
        records.push(make("cogs_cap", costs.cogs_cap, MetricUnit::Usd));
        records.push(make("profit", costs.profit, MetricUnit::Usd));
        records.push(make("margin", costs.margin_pct, MetricUnit::Pct));
        records.push(make("roi", costs.roi_pct, MetricUnit::Pct));
    }

    if valid_rows == 0 {
        return Err(IngestError::NoValidRows(source.to_string()));
    }

    Ok(SheetOutput {
        records,
        category_update: None,
    })
}
