// ingest/parsers/seller_origin.rs
// One metric per distinct seller origin label

use std::collections::BTreeMap;

use research_common::data::types::{MetricRecord, MetricUnit, BUCKET_OVERALL};

use super::{cell, ParseContext, SheetOutput};
use crate::ingest::columns::{resolve_columns, ColumnPredicate, ColumnSpec};
use crate::ingest::errors::{IngestError, IngestResult};
use crate::ingest::header::detect_header_row;
use crate::ingest::normalize::{cell_text, parse_percent};
use crate::ingest::workbook::{RawSheet, SheetKind};

static COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        label: "origin",
        required: true,
        predicates: &[
            ColumnPredicate::Contains("origin"),
            ColumnPredicate::Contains("seller"),
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

/// Lower-case the label and collapse every non-letter run into a single
/// underscore: "United States" -> "united_states".
fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    let mut last_underscore = true;
    for ch in label.to_lowercase().chars() {
        if ch.is_alphabetic() {
            slug.push(ch);
            last_underscore = false;
        } else if !last_underscore {
            slug.push('_');
            last_underscore = true;
        }
    }
    slug.trim_end_matches('_').to_string()
}

pub fn parse(ctx: &ParseContext<'_>, sheet: &RawSheet) -> IngestResult<SheetOutput> {
    let source = SheetKind::SellerOrigin.source_sheet();
    let header_index = detect_header_row(sheet, SheetKind::SellerOrigin.header_keywords());
    let cols = resolve_columns(sheet.header_row(header_index), COLUMNS)?;

    let origin_col = cols.get("origin").unwrap_or_default();
    let proportion_col = cols.get("proportion").unwrap_or_default();

    let mut shares: BTreeMap<String, f64> = BTreeMap::new();
    for row in sheet.body(header_index) {
        let Some(label) = cell_text(cell(row, origin_col)) else {
            continue;
        };
        let Some(share) = parse_percent(cell(row, proportion_col)) else {
            continue;
        };
        let slug = slugify(&label);
        if slug.is_empty() {
            continue;
        }
        *shares.entry(slug).or_insert(0.0) += share;
    }

    if shares.is_empty() {
        return Err(IngestError::NoValidRows(source.to_string()));
    }

    let records = shares
        .into_iter()
        .map(|(slug, share)| {
            MetricRecord::new(
                ctx.dataset_id,
                ctx.category_id,
                &format!("seller_origin_{}", slug),
                BUCKET_OVERALL,
                share,
                MetricUnit::Pct,
                source,
            )
        })
        .collect();

    Ok(SheetOutput {
        records,
        category_update: None,
    })
}
