// ingest/parsers/fulfillment.rs
// Fulfillment mix snapshot: free-text type classified into fba/fbm/amz/na

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
        label: "type",
        required: true,
        predicates: &[
            ColumnPredicate::Contains("fulfillment"),
            ColumnPredicate::Contains("fulfilment"),
            ColumnPredicate::Contains("type"),
        ],
    },
    ColumnSpec {
        label: "percentage",
        required: true,
        predicates: &[
            ColumnPredicate::Contains("percentage"),
            ColumnPredicate::Contains("proportion"),
            ColumnPredicate::Contains("share"),
        ],
    },
];

fn classify(label: &str) -> &'static str {
    let lower = label.to_lowercase();
    if lower.contains("fba") {
        "fba"
    } else if lower.contains("fbm") {
        "fbm"
    } else if lower.contains("amazon") || lower.contains("amz") {
        "amz"
    } else {
        "na"
    }
}

pub fn parse(ctx: &ParseContext<'_>, sheet: &RawSheet) -> IngestResult<SheetOutput> {
    let source = SheetKind::Fulfillment.source_sheet();
    let header_index = detect_header_row(sheet, SheetKind::Fulfillment.header_keywords());
    let cols = resolve_columns(sheet.header_row(header_index), COLUMNS)?;

    let type_col = cols.get("type").unwrap_or_default();
    let percentage_col = cols.get("percentage").unwrap_or_default();

    let mut shares: BTreeMap<&'static str, f64> = BTreeMap::new();
    for row in sheet.body(header_index) {
        let Some(label) = cell_text(cell(row, type_col)) else {
            continue;
        };
        let Some(share) = parse_percent(cell(row, percentage_col)) else {
            continue;
        };
        *shares.entry(classify(&label)).or_insert(0.0) += share;
    }

    if shares.is_empty() {
        return Err(IngestError::NoValidRows(source.to_string()));
    }

    let records = shares
        .into_iter()
        .map(|(class, share)| {
            MetricRecord::new(
                ctx.dataset_id,
                ctx.category_id,
                &format!("fulfillment_{}", class),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::parsers::RuleSet;
    use crate::ingest::workbook::RawCell;
    use research_common::data::types::Category;

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    #[test]
    fn test_classification_and_normalization() {
        let sheet = RawSheet::new(
            "Fulfillment",
            vec![
                vec![text("Fulfillment Type"), text("Percentage")],
                vec![text("FBA sellers"), RawCell::Number(0.625)],
                vec![text("Merchant (FBM)"), text("30%")],
                vec![text("Sold by Amazon"), RawCell::Number(5.0)],
                vec![text("Unknown"), RawCell::Number(0.025)],
            ],
        );
        let category = Category {
            id: "cat-1".into(),
            name: "Kitchen".into(),
            ..Default::default()
        };
        let rules = RuleSet::default();
        let ctx = ParseContext {
            dataset_id: "ds-1",
            category_id: "cat-1",
            category: &category,
            rules: &rules,
            default_bucket: "2024-05",
            fallback_avg_price: None,
        };

        let output = parse(&ctx, &sheet).unwrap();
        let value = |metric: &str| {
            output
                .records
                .iter()
                .find(|r| r.metric == metric)
                .map(|r| r.value)
                .unwrap()
        };

        assert_eq!(value("fulfillment_fba"), 62.5);
        assert_eq!(value("fulfillment_fbm"), 30.0);
        assert_eq!(value("fulfillment_amz"), 5.0);
        assert_eq!(value("fulfillment_na"), 2.5);
        // Snapshot data is never monthly.
        assert!(output.records.iter().all(|r| r.bucket == BUCKET_OVERALL));
    }
}
