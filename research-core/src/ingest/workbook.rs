// ingest/workbook.rs
// Workbook abstraction: raw sheets, cell values and tolerant sheet naming

use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use tracing::{debug, warn};

use super::errors::IngestResult;

/// A single raw cell as read from a vendor export. No implicit schema.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl RawCell {
    pub fn is_empty(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(t) => t.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&Data> for RawCell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => RawCell::Empty,
            Data::Int(i) => RawCell::Number(*i as f64),
            Data::Float(f) => RawCell::Number(*f),
            Data::String(s) => RawCell::Text(s.clone()),
            Data::Bool(b) => RawCell::Bool(*b),
            Data::DateTime(dt) => match dt.as_datetime() {
                Some(naive) => RawCell::Text(naive.format("%Y-%m-%d").to_string()),
                None => RawCell::Empty,
            },
            Data::DateTimeIso(s) => RawCell::Text(s.clone()),
            Data::DurationIso(s) => RawCell::Text(s.clone()),
            Data::Error(_) => RawCell::Empty,
        }
    }
}

/// Ordered rows of raw cells. Leading fully-empty rows are discarded on
/// construction so header detection starts at real content.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub rows: Vec<Vec<RawCell>>,
}

impl RawSheet {
    pub fn new(name: &str, rows: Vec<Vec<RawCell>>) -> Self {
        let rows = rows
            .into_iter()
            .skip_while(|row| row.iter().all(RawCell::is_empty))
            .collect();
        Self {
            name: name.to_string(),
            rows,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&RawCell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn header_row(&self, index: usize) -> &[RawCell] {
        self.rows.get(index).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Data rows below the header.
    pub fn body(&self, header_index: usize) -> &[Vec<RawCell>] {
        self.rows.get(header_index + 1..).unwrap_or(&[])
    }
}

/// The known sheet shapes of a category research workbook.
///
/// Matching order matters: "market-research" must win over
/// "market analysis" before the analysis token is tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetKind {
    MarketResearch,
    MarketAnalysis,
    Fulfillment,
    PublicationTime,
    SellerOrigin,
    ListingConcentration,
    AdsMetrics,
}

impl SheetKind {
    pub const ALL: [SheetKind; 7] = [
        SheetKind::MarketResearch,
        SheetKind::MarketAnalysis,
        SheetKind::Fulfillment,
        SheetKind::PublicationTime,
        SheetKind::SellerOrigin,
        SheetKind::ListingConcentration,
        SheetKind::AdsMetrics,
    ];

    /// Tolerant, case-insensitive sheet name matching. Hyphens and
    /// underscores count as spaces so "Market-Research" and
    /// "market_research" both resolve.
    pub fn match_name(sheet_name: &str) -> Option<SheetKind> {
        let name = sheet_name
            .to_lowercase()
            .replace(['-', '_'], " ");

        for kind in SheetKind::ALL {
            if kind.name_tokens().iter().any(|t| name.contains(t)) {
                return Some(kind);
            }
        }
        None
    }

    fn name_tokens(&self) -> &'static [&'static str] {
        match self {
            SheetKind::MarketResearch => &["market research"],
            SheetKind::MarketAnalysis => &["market analysis"],
            SheetKind::Fulfillment => &["fulfillment", "fulfilment"],
            SheetKind::PublicationTime => &["publication"],
            SheetKind::SellerOrigin => &["origin"],
            SheetKind::ListingConcentration => &["concentration", "listing"],
            SheetKind::AdsMetrics => &["ads", "advertising"],
        }
    }

    /// Canonical `source_sheet` identifier stored on every record.
    pub fn source_sheet(&self) -> &'static str {
        match self {
            SheetKind::MarketResearch => "market_research",
            SheetKind::MarketAnalysis => "market_analysis",
            SheetKind::Fulfillment => "fulfillment",
            SheetKind::PublicationTime => "publication_time",
            SheetKind::SellerOrigin => "seller_origin",
            SheetKind::ListingConcentration => "listing_concentration",
            SheetKind::AdsMetrics => "ads_metrics",
        }
    }

    /// Keywords expected somewhere in this sheet's header row; used to
    /// locate the true header below vendor title rows.
    pub fn header_keywords(&self) -> &'static [&'static str] {
        match self {
            SheetKind::MarketResearch => &["weight", "volume"],
            SheetKind::MarketAnalysis => &["sample", "sales", "revenue", "price", "rating"],
            SheetKind::Fulfillment => &["fulfillment", "fulfilment", "type", "percentage", "proportion"],
            SheetKind::PublicationTime => &["publication", "time", "proportion", "percentage"],
            SheetKind::SellerOrigin => &["origin", "seller", "proportion", "percentage"],
            SheetKind::ListingConcentration => &["rank", "proportion", "percentage", "sales"],
            SheetKind::AdsMetrics => &[
                "ctr",
                "cpc",
                "click",
                "impression",
                "search",
                "bid",
                "conversion",
            ],
        }
    }
}

/// Open a workbook file and return every sheet that matches a known
/// shape. Unrecognized sheets are logged and skipped.
pub fn open_recognized_sheets<P: AsRef<Path>>(
    path: P,
) -> IngestResult<Vec<(SheetKind, RawSheet)>> {
    let mut workbook = open_workbook_auto(path)?;
    let names = workbook.sheet_names().to_owned();

    let mut sheets = Vec::new();
    for name in names {
        let Some(kind) = SheetKind::match_name(&name) else {
            debug!("Skipping unrecognized sheet '{}'", name);
            continue;
        };

        match workbook.worksheet_range(&name) {
            Ok(range) => {
                let rows: Vec<Vec<RawCell>> = range
                    .rows()
                    .map(|row| row.iter().map(RawCell::from).collect())
                    .collect();
                sheets.push((kind, RawSheet::new(&name, rows)));
            }
            Err(e) => {
                warn!("Failed to read sheet '{}': {}", name, e);
            }
        }
    }

    Ok(sheets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sheet_name_matching() {
        assert_eq!(
            SheetKind::match_name("2024-05 Market Analysis"),
            Some(SheetKind::MarketAnalysis)
        );
        assert_eq!(
            SheetKind::match_name("market-research"),
            Some(SheetKind::MarketResearch)
        );
        assert_eq!(
            SheetKind::match_name("Origin of Seller"),
            Some(SheetKind::SellerOrigin)
        );
        assert_eq!(
            SheetKind::match_name("Listing Concentration"),
            Some(SheetKind::ListingConcentration)
        );
        assert_eq!(SheetKind::match_name("Notes"), None);
    }

    #[test]
    fn test_market_research_wins_over_analysis() {
        // A market-research sheet must never fall into the analysis parser.
        assert_eq!(
            SheetKind::match_name("Market-Research Weight"),
            Some(SheetKind::MarketResearch)
        );
    }

    #[test]
    fn test_leading_empty_rows_discarded() {
        let sheet = RawSheet::new(
            "Fulfillment",
            vec![
                vec![RawCell::Empty, RawCell::Text("  ".into())],
                vec![RawCell::Text("Type".into()), RawCell::Text("Percentage".into())],
                vec![RawCell::Text("FBA".into()), RawCell::Number(62.5)],
            ],
        );
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(
            sheet.cell(0, 0),
            Some(&RawCell::Text("Type".into()))
        );
    }
}
