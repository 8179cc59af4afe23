// ingest/parsers/ads_metrics.rs
// Advertising efficiency metrics, either read directly from ratio
// columns or aggregated from raw click/impression/search counts

use once_cell::sync::Lazy;
use regex::Regex;

use research_common::data::types::{CategoryConstantUpdate, MetricRecord, MetricUnit};

use super::{cell, opt_cell, ParseContext, SheetOutput};
use crate::fees::derived;
use crate::ingest::columns::{resolve_columns, ColumnPredicate, ColumnSpec, ResolvedColumns};
use crate::ingest::errors::{IngestError, IngestResult};
use crate::ingest::header::detect_header_row;
use crate::ingest::month::parse_month_cell;
use crate::ingest::normalize::{parse_number, parse_percent, parse_positive};
use crate::ingest::workbook::{RawCell, RawSheet, SheetKind};

static CR_COLUMN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*cv?r\s*$").unwrap());

static COLUMNS: &[ColumnSpec] = &[
    // Raw aggregate columns.
    ColumnSpec {
        label: "clicks",
        required: false,
        predicates: &[ColumnPredicate::ContainsExcluding {
            needle: "click",
            exclude: &["share", "through", "rate"],
        }],
    },
    ColumnSpec {
        label: "impressions",
        required: false,
        predicates: &[ColumnPredicate::Contains("impression")],
    },
    ColumnSpec {
        label: "orders",
        required: false,
        predicates: &[
            ColumnPredicate::Contains("order"),
            ColumnPredicate::ContainsExcluding {
                needle: "sales",
                exclude: &["proportion", "share"],
            },
        ],
    },
    ColumnSpec {
        label: "searches",
        required: false,
        predicates: &[ColumnPredicate::Contains("search")],
    },
    ColumnSpec {
        label: "bid",
        required: false,
        predicates: &[ColumnPredicate::Contains("bid")],
    },
    ColumnSpec {
        label: "click_share",
        required: false,
        predicates: &[
            ColumnPredicate::Contains("click share"),
            ColumnPredicate::Contains("click-share"),
        ],
    },
    ColumnSpec {
        label: "price",
        required: false,
        predicates: &[ColumnPredicate::Contains("price")],
    },
    ColumnSpec {
        label: "month",
        required: false,
        predicates: &[
            ColumnPredicate::Contains("month"),
            ColumnPredicate::Contains("date"),
        ],
    },
    // Pre-computed ratio columns.
    ColumnSpec {
        label: "ctr",
        required: false,
        predicates: &[
            ColumnPredicate::Contains("ctr"),
            ColumnPredicate::Contains("click-through"),
            ColumnPredicate::Contains("click through"),
        ],
    },
    ColumnSpec {
        label: "cpc",
        required: false,
        predicates: &[
            ColumnPredicate::Contains("cpc"),
            ColumnPredicate::Contains("cost per click"),
        ],
    },
    ColumnSpec {
        label: "roas",
        required: false,
        predicates: &[ColumnPredicate::Contains("roas")],
    },
    ColumnSpec {
        label: "cr",
        required: false,
        predicates: &[
            ColumnPredicate::Contains("conversion"),
            ColumnPredicate::Pattern(&CR_COLUMN_RE),
        ],
    },
    ColumnSpec {
        label: "acos",
        required: false,
        predicates: &[ColumnPredicate::ContainsExcluding {
            needle: "acos",
            exclude: &["tacos"],
        }],
    },
    ColumnSpec {
        label: "tacos",
        required: false,
        predicates: &[ColumnPredicate::Contains("tacos")],
    },
    ColumnSpec {
        label: "cpp",
        required: false,
        predicates: &[
            ColumnPredicate::Contains("cpp"),
            ColumnPredicate::Contains("cost per purchase"),
        ],
    },
];

pub fn parse(ctx: &ParseContext<'_>, sheet: &RawSheet) -> IngestResult<SheetOutput> {
    let source = SheetKind::AdsMetrics.source_sheet();
    let header_index = detect_header_row(sheet, SheetKind::AdsMetrics.header_keywords());
    let cols = resolve_columns(sheet.header_row(header_index), COLUMNS)?;

    let bucket = sheet
        .body(header_index)
        .iter()
        .find_map(|row| opt_cell(row, cols.get("month")).and_then(parse_month_cell))
        .unwrap_or_else(|| ctx.default_bucket.to_string());

    if cols.contains("clicks") && cols.contains("impressions") {
        parse_aggregate(ctx, sheet, header_index, &cols, &bucket, source)
    } else if ["ctr", "cpc", "roas", "cr", "acos", "tacos", "cpp", "click_share"]
        .iter()
        .any(|label| cols.contains(label))
    {
        parse_direct(ctx, sheet, header_index, &cols, &bucket, source)
    } else {
        Err(IngestError::MissingColumn("ctr".to_string()))
    }
}

fn make_record(
    ctx: &ParseContext<'_>,
    metric: &str,
    bucket: &str,
    value: f64,
    unit: MetricUnit,
    source: &str,
) -> MetricRecord {
    MetricRecord::new(
        ctx.dataset_id,
        ctx.category_id,
        metric,
        bucket,
        value,
        unit,
        source,
    )
}

/// Path (a): each ratio column is read independently from the first row
/// that holds a parseable value.
fn parse_direct(
    ctx: &ParseContext<'_>,
    sheet: &RawSheet,
    header_index: usize,
    cols: &ResolvedColumns,
    bucket: &str,
    source: &str,
) -> IngestResult<SheetOutput> {
    let body = sheet.body(header_index);
    let first_value = |label: &str, percent: bool| -> Option<f64> {
        let index = cols.get(label)?;
        body.iter().find_map(|row| {
            let cell_ref = cell(row, index);
            if percent {
                parse_percent(cell_ref)
            } else {
                parse_positive(cell_ref)
            }
        })
    };

    let mut records = Vec::new();
    let mut push = |metric: &str, value: Option<f64>, unit: MetricUnit| {
        if let Some(value) = value {
            records.push(make_record(ctx, metric, bucket, value, unit, source));
        }
    };

    let ctr = first_value("ctr", true);
    let cpc = first_value("cpc", false);
    let cr = first_value("cr", true);
    push("ctr", ctr, MetricUnit::Pct);
    push("cpc", cpc, MetricUnit::Usd);
    push("roas", first_value("roas", false), MetricUnit::Ratio);
    push("cr", cr, MetricUnit::Pct);
    push("acos", first_value("acos", true), MetricUnit::Pct);
    push("tacos", first_value("tacos", true), MetricUnit::Pct);
    push("cpp", first_value("cpp", false), MetricUnit::Usd);
    push("click_share", first_value("click_share", true), MetricUnit::Pct);

    if records.is_empty() {
        return Err(IngestError::NoValidRows(source.to_string()));
    }

    Ok(SheetOutput {
        records,
        category_update: Some(ads_defaults(ctr, cpc, cr)),
    })
}

/// Path (b): aggregate raw counts across keyword rows, then derive the
/// ratio chain from the sums.
fn parse_aggregate(
    ctx: &ParseContext<'_>,
    sheet: &RawSheet,
    header_index: usize,
    cols: &ResolvedColumns,
    bucket: &str,
    source: &str,
) -> IngestResult<SheetOutput> {
    let clicks_col = cols.get("clicks").unwrap_or_default();

    let non_negative = |cell: &RawCell| parse_number(cell).filter(|v| *v >= 0.0);

    let mut valid_rows = 0usize;
    let mut sum_clicks = 0.0;
    let mut sum_impressions = 0.0;
    let mut sum_orders = 0.0;
    let mut sum_searches = 0.0;
    let mut sum_bid_clicks = 0.0;
    let mut sum_share_clicks = 0.0;
    let mut saw_share = false;
    let mut price_sum = 0.0;
    let mut price_count = 0usize;

    for row in sheet.body(header_index) {
        let Some(clicks) = non_negative(cell(row, clicks_col)) else {
            continue;
        };
        valid_rows += 1;
        sum_clicks += clicks;

        if let Some(impressions) = opt_cell(row, cols.get("impressions")).and_then(non_negative) {
            sum_impressions += impressions;
        }
        if let Some(orders) = opt_cell(row, cols.get("orders")).and_then(non_negative) {
            sum_orders += orders;
        }
        if let Some(searches) = opt_cell(row, cols.get("searches")).and_then(non_negative) {
            sum_searches += searches;
        }
        if let Some(bid) = opt_cell(row, cols.get("bid")).and_then(parse_positive) {
            sum_bid_clicks += bid * clicks;
        }
        if let Some(share) = opt_cell(row, cols.get("click_share")).and_then(parse_percent) {
            sum_share_clicks += share * clicks;
            saw_share = true;
        }
        if let Some(price) = opt_cell(row, cols.get("price")).and_then(parse_positive) {
            price_sum += price;
            price_count += 1;
        }
    }

    if valid_rows == 0 {
        return Err(IngestError::NoValidRows(source.to_string()));
    }

    let ctr = (sum_impressions > 0.0).then(|| sum_clicks / sum_impressions);
    let cr = (sum_searches > 0.0).then(|| sum_orders / sum_searches);
    let cpc = (sum_clicks > 0.0 && sum_bid_clicks > 0.0).then(|| sum_bid_clicks / sum_clicks);
    let click_share_pts =
        (saw_share && sum_clicks > 0.0).then(|| sum_share_clicks / sum_clicks);

    // Average price resolution: same-sheet column first, then the
    // store-backed fallback chain resolved by the caller.
    let avg_price = if price_count > 0 {
        Some(price_sum / price_count as f64)
    } else {
        ctx.fallback_avg_price
    };

    let roas = match (cr, avg_price, cpc) {
        (Some(cr), Some(price), Some(cpc)) => derived::roas(cr, price, cpc),
        _ => None,
    };
    let acos = roas.and_then(derived::acos);
    let tacos = match (acos, click_share_pts) {
        (Some(acos), Some(share)) => derived::tacos(acos, share / 100.0),
        _ => None,
    };
    let cpp = match (cpc, cr) {
        (Some(cpc), Some(cr)) => derived::cpp(cpc, cr),
        _ => None,
    };

    let mut records = Vec::new();
    let mut push = |metric: &str, value: Option<f64>, unit: MetricUnit| {
        if let Some(value) = value {
            records.push(make_record(ctx, metric, bucket, value, unit, source));
        }
    };

    let ctr_pts = ctr.map(|v| v * 100.0);
    let cr_pts = cr.map(|v| v * 100.0);
    push("ctr", ctr_pts, MetricUnit::Pct);
    push("cr", cr_pts, MetricUnit::Pct);
    push("cpc", cpc, MetricUnit::Usd);
    push("click_share", click_share_pts, MetricUnit::Pct);
    push("roas", roas, MetricUnit::Ratio);
    push("acos", acos.map(|v| v * 100.0), MetricUnit::Pct);
    push("tacos", tacos.map(|v| v * 100.0), MetricUnit::Pct);
    push("cpp", cpp, MetricUnit::Usd);

    Ok(SheetOutput {
        records,
        category_update: Some(ads_defaults(ctr_pts, cpc, cr_pts)),
    })
}

fn ads_defaults(
    ctr_pts: Option<f64>,
    cpc: Option<f64>,
    cr_pts: Option<f64>,
) -> CategoryConstantUpdate {
    CategoryConstantUpdate {
        default_ctr: ctr_pts,
        default_cpc: cpc,
        default_cr: cr_pts,
        ..Default::default()
    }
}
