// ingest/parsers/listing_concentration.rs
// Sales share captured by the top-10 ranked listings

use once_cell::sync::Lazy;
use regex::Regex;

use research_common::data::types::{MetricRecord, MetricUnit, BUCKET_TOP10};

use super::{cell, ParseContext, SheetOutput};
use crate::ingest::columns::{resolve_columns, ColumnPredicate, ColumnSpec};
use crate::ingest::errors::{IngestError, IngestResult};
use crate::ingest::header::detect_header_row;
use crate::ingest::normalize::{parse_number, parse_percent};
use crate::ingest::workbook::{RawSheet, SheetKind};

/// Highest rank (inclusive) counted into the concentration aggregate.
pub const TOP_RANK_CUTOFF: f64 = 10.0;

static RANK_SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(#|no\.?)\s*$").unwrap());

static COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        label: "rank",
        required: true,
        predicates: &[
            ColumnPredicate::Contains("rank"),
            ColumnPredicate::Pattern(&RANK_SYMBOL_RE),
        ],
    },
    ColumnSpec {
        label: "proportion",
        required: true,
        predicates: &[
            ColumnPredicate::Contains("proportion"),
            ColumnPredicate::Contains("percentage"),
            ColumnPredicate::Contains("share"),
        ],
    },
];

pub fn parse(ctx: &ParseContext<'_>, sheet: &RawSheet) -> IngestResult<SheetOutput> {
    let source = SheetKind::ListingConcentration.source_sheet();
    let header_index =
        detect_header_row(sheet, SheetKind::ListingConcentration.header_keywords());
    let cols = resolve_columns(sheet.header_row(header_index), COLUMNS)?;

    let rank_col = cols.get("rank").unwrap_or_default();
    let proportion_col = cols.get("proportion").unwrap_or_default();

    let mut valid_rows = 0usize;
    let mut top_share = 0.0;
    for row in sheet.body(header_index) {
        let Some(rank) = parse_number(cell(row, rank_col)) else {
            continue;
        };
        let Some(share) = parse_percent(cell(row, proportion_col)) else {
            continue;
        };
        valid_rows += 1;
        if (1.0..=TOP_RANK_CUTOFF).contains(&rank) {
            top_share += share;
        }
    }

    if valid_rows == 0 {
        return Err(IngestError::NoValidRows(source.to_string()));
    }

    let record = MetricRecord::new(
        ctx.dataset_id,
        ctx.category_id,
        "listing_concentration",
        BUCKET_TOP10,
        top_share,
        MetricUnit::Pct,
        source,
    );

    Ok(SheetOutput {
        records: vec![record],
        category_update: None,
    })
}
