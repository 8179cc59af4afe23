// ingest/month.rs
// Month bucket parsing and month-granularity text classification

use once_cell::sync::Lazy;
use regex::Regex;

use super::normalize::cell_text;
use super::workbook::RawCell;

static MONTH_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(20\d{2})[-/.](0[1-9]|1[0-2])").unwrap());

static MONTH_BUCKET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").unwrap());

/// Extract a `YYYY-MM` month from free text ("2024-05", "2024/05/13",
/// "report 2024.05"). Returns the first month-shaped token.
pub fn parse_month_text(text: &str) -> Option<String> {
    let caps = MONTH_TOKEN_RE.captures(text)?;
    Some(format!("{}-{}", &caps[1], &caps[2]))
}

pub fn parse_month_cell(cell: &RawCell) -> Option<String> {
    parse_month_text(&cell_text(cell)?)
}

/// Best-effort month inference from a workbook file name.
pub fn month_from_file_name(name: &str) -> Option<String> {
    parse_month_text(name)
}

/// Whether a bucket string is a month (as opposed to a fixed token such
/// as `overall` or `top10`).
pub fn is_month(bucket: &str) -> bool {
    MONTH_BUCKET_RE.is_match(bucket)
}

/// Publication-age labels count as "new" when they speak in months and
/// do not mention years ("within 3 months" yes, "1-2 years" no).
pub fn is_month_granularity(label: &str) -> bool {
    let lower = label.to_lowercase();
    lower.contains("month") && !lower.contains("year")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_extraction() {
        assert_eq!(parse_month_text("2024-05"), Some("2024-05".into()));
        assert_eq!(parse_month_text("2024/05/13"), Some("2024-05".into()));
        assert_eq!(
            month_from_file_name("kitchen_export_2024.05.xlsx"),
            Some("2024-05".into())
        );
        assert_eq!(parse_month_text("May report"), None);
        assert_eq!(parse_month_text("2024-13"), None);
    }

    #[test]
    fn test_bucket_classification() {
        assert!(is_month("2024-05"));
        assert!(!is_month("overall"));
        assert!(!is_month("top10"));
        assert!(!is_month("2024-5"));
    }

    #[test]
    fn test_month_granularity_labels() {
        assert!(is_month_granularity("Within 3 months"));
        assert!(is_month_granularity("3-6 Months"));
        assert!(!is_month_granularity("1-2 years"));
        assert!(!is_month_granularity("More than a year"));
        assert!(!is_month_granularity("Unknown"));
    }
}
