// ingest/parsers/publication_time.rs
// Share of sales attributed to recently published listings

use research_common::data::types::{MetricRecord, MetricUnit, BUCKET_OVERALL};

use super::{cell, ParseContext, SheetOutput};
use crate::ingest::columns::{resolve_columns, ColumnPredicate, ColumnSpec};
use crate::ingest::errors::{IngestError, IngestResult};
use crate::ingest::header::detect_header_row;
use crate::ingest::month::is_month_granularity;
use crate::ingest::normalize::{cell_text, parse_percent};
use crate::ingest::workbook::{RawSheet, SheetKind};

static COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        label: "period",
        required: true,
        predicates: &[
            ColumnPredicate::Contains("publication"),
            ColumnPredicate::Contains("time"),
            ColumnPredicate::Contains("age"),
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
    let source = SheetKind::PublicationTime.source_sheet();
    let header_index = detect_header_row(sheet, SheetKind::PublicationTime.header_keywords());
    let cols = resolve_columns(sheet.header_row(header_index), COLUMNS)?;

    let period_col = cols.get("period").unwrap_or_default();
    let proportion_col = cols.get("proportion").unwrap_or_default();

    let mut valid_rows = 0usize;
    let mut new_share = 0.0;
    for row in sheet.body(header_index) {
        let Some(label) = cell_text(cell(row, period_col)) else {
            continue;
        };
        let Some(share) = parse_percent(cell(row, proportion_col)) else {
            continue;
        };
        valid_rows += 1;
        if is_month_granularity(&label) {
            new_share += share;
        }
    }

    if valid_rows == 0 {
        return Err(IngestError::NoValidRows(source.to_string()));
    }

    let record = MetricRecord::new(
        ctx.dataset_id,
        ctx.category_id,
        "new_product_ratio",
        BUCKET_OVERALL,
        new_share,
        MetricUnit::Pct,
        source,
    );

    Ok(SheetOutput {
        records: vec![record],
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
    fn test_new_share_sums_month_buckets_only() {
        let sheet = RawSheet::new(
            "Publication Time",
            vec![
                vec![text("Publication Time"), text("Sales Proportion")],
                vec![text("Within 3 months"), text("12%")],
                vec![text("3-6 months"), RawCell::Number(0.08)],
                vec![text("6-12 months"), RawCell::Number(15.0)],
                vec![text("1-2 years"), text("40%")],
                vec![text("Over 2 years"), text("25%")],
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
        assert_eq!(output.records.len(), 1);
        let record = &output.records[0];
        assert_eq!(record.metric, "new_product_ratio");
        assert_eq!(record.bucket, BUCKET_OVERALL);
        // 12 + 8 + 15, the year rows contribute nothing.
        assert!((record.value - 35.0).abs() < 1e-9);
    }
}
