// ingest/header.rs
// Header row detection for exports with title/metadata rows on top

use super::normalize::cell_text;
use super::workbook::RawSheet;

/// How many leading rows are scanned for a header candidate.
pub const HEADER_SCAN_ROWS: usize = 10;

/// Score each of the first rows by how many cells contain an expected
/// keyword and pick the best one. First occurrence wins ties, including
/// the default index 0 when nothing scores.
pub fn detect_header_row(sheet: &RawSheet, keywords: &[&str]) -> usize {
    let mut best_index = 0;
    let mut best_score = 0;

    for (index, row) in sheet.rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let score = row
            .iter()
            .filter_map(cell_text)
            .filter(|text| {
                let lower = text.to_lowercase();
                keywords.iter().any(|k| lower.contains(k))
            })
            .count();

        if score > best_score {
            best_score = score;
            best_index = index;
        }
    }

    best_index
}
