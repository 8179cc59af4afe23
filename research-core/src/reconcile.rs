// research-core/src/reconcile.rs
// Time bucket reconciliation across sample cohorts

use research_common::data::types::MetricRecord;
use std::cmp::Ordering;

/// Cohort label that is authoritative for category-level metrics.
pub const AUTHORITATIVE_SAMPLE_TYPE: &str = "all";

fn is_authoritative(record: &MetricRecord) -> bool {
    record
        .sample_type
        .as_deref()
        .map(|t| t.eq_ignore_ascii_case(AUTHORITATIVE_SAMPLE_TYPE))
        .unwrap_or(false)
}

fn sample_size(record: &MetricRecord) -> f64 {
    record.sample_size.unwrap_or(f64::NEG_INFINITY)
}

/// Select the authoritative record among candidates for one
/// `(metric, bucket)` pair: prefer the "All" cohort, then the larger
/// sample, then the most recent write. Selection happens at read time;
/// the per-cohort records stay stored for audit.
pub fn select_authoritative<'a>(candidates: &'a [MetricRecord]) -> Option<&'a MetricRecord> {
    candidates.iter().max_by(|a, b| {
        is_authoritative(a)
            .cmp(&is_authoritative(b))
            .then(
                sample_size(a)
                    .partial_cmp(&sample_size(b))
                    .unwrap_or(Ordering::Equal),
            )
            .then(a.created_at.cmp(&b.created_at))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use research_common::data::types::MetricUnit;

    fn record(sample_type: Option<&str>, sample_size: Option<f64>, value: f64) -> MetricRecord {
        let mut r = MetricRecord::new(
            "ds-1",
            "cat-1",
            "sales_units",
            "2024-05",
            value,
            MetricUnit::Units,
            "market_analysis",
        );
        r.sample_type = sample_type.map(str::to_string);
        r.sample_size = sample_size;
        r
    }

    #[test]
    fn test_all_cohort_beats_larger_sample() {
        let candidates = vec![
            record(Some("Top 50"), Some(5000.0), 90000.0),
            record(Some("All"), Some(500.0), 60000.0),
        ];
        let selected = select_authoritative(&candidates).unwrap();
        assert_eq!(selected.sample_type.as_deref(), Some("All"));
        assert_eq!(selected.value, 60000.0);
    }

    #[test]
    fn test_larger_sample_wins_without_all() {
        let candidates = vec![
            record(Some("Top 10"), Some(100.0), 1.0),
            record(Some("Top 50"), Some(900.0), 2.0),
        ];
        let selected = select_authoritative(&candidates).unwrap();
        assert_eq!(selected.value, 2.0);
    }

    #[test]
    fn test_recency_breaks_final_tie() {
        let mut old = record(Some("All"), Some(500.0), 1.0);
        old.created_at = Utc::now() - Duration::days(2);
        let new = record(Some("All"), Some(500.0), 2.0);
        let candidates = vec![new.clone(), old];
        let selected = select_authoritative(&candidates).unwrap();
        assert_eq!(selected.value, 2.0);
    }

    #[test]
    fn test_empty_candidates() {
        assert!(select_authoritative(&[]).is_none());
    }
}
