// ingest/normalize.rs
// Cell value normalization: currency/thousands stripping, percent points

use super::workbook::RawCell;

/// Characters stripped before numeric parsing: currency symbols,
/// thousands separators and (non-breaking) spaces.
const STRIP_CHARS: &[char] = &['$', '€', '£', '¥', ',', ' ', '\u{a0}', '%'];

fn clean_numeric(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !STRIP_CHARS.contains(c))
        .collect()
}

/// Trimmed, non-empty text content of a cell. Numbers render without a
/// trailing `.0` so label columns holding numeric ranks still read.
pub fn cell_text(cell: &RawCell) -> Option<String> {
    match cell {
        RawCell::Text(t) => {
            let trimmed = t.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        RawCell::Number(n) if n.is_finite() => {
            if n.fract() == 0.0 {
                Some(format!("{}", *n as i64))
            } else {
                Some(n.to_string())
            }
        }
        _ => None,
    }
}

/// Parse a cell into a finite number, tolerating currency symbols and
/// thousands separators in text cells.
pub fn parse_number(cell: &RawCell) -> Option<f64> {
    let value = match cell {
        RawCell::Number(n) => *n,
        RawCell::Text(t) => clean_numeric(t).parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// Parse a cell that is inherently positive (sales, revenue, price,
/// sample size, ratings). Zero and negative values are rejected.
pub fn parse_positive(cell: &RawCell) -> Option<f64> {
    parse_number(cell).filter(|v| *v > 0.0)
}

/// Parse a percentage cell into percentage points (0-100 scale).
///
/// A literal `%` suffix means the number is already in points. A bare
/// value in [-1, 1] is treated as a fraction and scaled by 100; larger
/// bare values are taken as points.
pub fn parse_percent(cell: &RawCell) -> Option<f64> {
    match cell {
        RawCell::Number(n) => {
            if !n.is_finite() {
                return None;
            }
            if n.abs() <= 1.0 {
                Some(n * 100.0)
            } else {
                Some(*n)
            }
        }
        RawCell::Text(t) => {
            let has_percent_sign = t.contains('%');
            let value = clean_numeric(t).parse::<f64>().ok()?;
            if !value.is_finite() {
                return None;
            }
            if has_percent_sign {
                Some(value)
            } else if value.abs() <= 1.0 {
                Some(value * 100.0)
            } else {
                Some(value)
            }
        }
        _ => None,
    }
}
