// fees/tiers.rs
// Size tier resolution and FBA fee band lookup

use once_cell::sync::Lazy;
use regex::Regex;
use research_common::data::types::{FbaFeeRule, SizeTierRule};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::ingest::errors::{IngestError, IngestResult};

/// Comparison slack for dimensional and weight bounds.
pub const DIMENSION_TOLERANCE: f64 = 1e-6;

static SMALL_STANDARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)small.*standard").unwrap());
static LARGE_STANDARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)large.*standard").unwrap());
static OVERSIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)over.*size").unwrap());

/// Package dimensions in inches plus shipping weight in pounds.
#[derive(Debug, Clone, Copy)]
pub struct PackageDims {
    pub longest: f64,
    pub median: f64,
    pub shortest: f64,
    pub length_girth: f64,
    pub shipping_weight_lb: f64,
}

fn within(limit: Option<f64>, value: f64) -> bool {
    match limit {
        Some(max) => value <= max + DIMENSION_TOLERANCE,
        None => true,
    }
}

/// Walk the ordered tier table and return the first rule whose defined
/// maxima accommodate the package. Rule bounds are converted to
/// inches/pounds before comparison.
pub fn resolve_size_tier<'a>(
    rules: &'a [SizeTierRule],
    dims: &PackageDims,
) -> Option<&'a SizeTierRule> {
    rules.iter().find(|rule| {
        within(rule.longest_max.map(|v| rule.unit_length.to_inches(v)), dims.longest)
            && within(rule.median_max.map(|v| rule.unit_length.to_inches(v)), dims.median)
            && within(
                rule.shortest_max.map(|v| rule.unit_length.to_inches(v)),
                dims.shortest,
            )
            && within(
                rule.length_girth_max.map(|v| rule.unit_length.to_inches(v)),
                dims.length_girth,
            )
            && within(
                rule.shipping_weight_max.map(|v| rule.unit_weight.to_pounds(v)),
                dims.shipping_weight_lb,
            )
    })
}

/// Map free-form tier labels onto the canonical names where they are
/// recognizable; anything else passes through verbatim.
pub fn normalize_tier_name(raw: &str) -> String {
    if SMALL_STANDARD_RE.is_match(raw) {
        "Small Standard".to_string()
    } else if LARGE_STANDARD_RE.is_match(raw) {
        "Large Standard".to_string()
    } else if OVERSIZE_RE.is_match(raw) {
        "Oversize".to_string()
    } else {
        raw.trim().to_string()
    }
}

fn weight_in_band(rule: &FbaFeeRule, shipping_weight_lb: f64) -> bool {
    let weight = rule.unit.from_pounds(shipping_weight_lb);
    let min_ok = match rule.weight_min {
        Some(min) => weight >= min - DIMENSION_TOLERANCE,
        None => true,
    };
    let max_ok = match rule.weight_max {
        Some(max) => weight <= max + DIMENSION_TOLERANCE,
        None => true,
    };
    min_ok && max_ok
}

fn band_fee(rule: &FbaFeeRule, shipping_weight_lb: f64) -> Decimal {
    if let Some(fee) = rule.fee_usd {
        return fee;
    }

    let mut fee = rule.base_usd.unwrap_or(Decimal::ZERO);
    for overage in &rule.overage_rules {
        if overage.step_value <= 0.0 {
            continue;
        }
        let weight = overage.over_threshold_unit.from_pounds(shipping_weight_lb);
        let over = weight - overage.over_threshold_value;
        if over > DIMENSION_TOLERANCE {
            let steps = (over / overage.step_value).ceil();
            let steps = Decimal::from_f64(steps).unwrap_or(Decimal::ZERO);
            fee += steps * overage.step_fee_usd;
        }
    }
    fee
}

/// Look up the FBA fulfillment fee for a tier and shipping weight.
///
/// Rules are first filtered by exact (case-insensitive) tier name, then
/// by canonical tier bucket when no exact name matches. Within the
/// matched tier the first weight band containing the shipping weight
/// decides the fee.
pub fn fba_fee_for(
    rules: &[FbaFeeRule],
    tier: &str,
    shipping_weight_lb: f64,
) -> IngestResult<Decimal> {
    let exact: Vec<&FbaFeeRule> = rules
        .iter()
        .filter(|r| r.tier.trim().eq_ignore_ascii_case(tier.trim()))
        .collect();

    let candidates = if exact.is_empty() {
        let target = normalize_tier_name(tier);
        rules
            .iter()
            .filter(|r| normalize_tier_name(&r.tier) == target)
            .collect()
    } else {
        exact
    };

    candidates
        .iter()
        .find(|rule| weight_in_band(rule, shipping_weight_lb))
        .map(|rule| band_fee(rule, shipping_weight_lb))
        .ok_or_else(|| {
            IngestError::NoMatchingFeeBand(format!(
                "tier '{}' at {:.4} lb",
                tier, shipping_weight_lb
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use research_common::data::types::{LengthUnit, OverageRule, WeightUnit};
    use rust_decimal_macros::dec;

    fn tier_rule(
        tier: &str,
        longest: Option<f64>,
        weight: Option<f64>,
        unit_length: LengthUnit,
        unit_weight: WeightUnit,
    ) -> SizeTierRule {
        SizeTierRule {
            tier: tier.to_string(),
            longest_max: longest,
            median_max: longest,
            shortest_max: longest,
            length_girth_max: None,
            shipping_weight_max: weight,
            unit_length,
            unit_weight,
        }
    }

    #[test]
    fn test_first_matching_tier_wins() {
        let rules = vec![
            tier_rule("small-standard", Some(15.0), Some(16.0), LengthUnit::In, WeightUnit::Oz),
            tier_rule("large-standard", Some(18.0), Some(20.0), LengthUnit::In, WeightUnit::Lb),
        ];
        let dims = PackageDims {
            longest: 4.0,
            median: 4.0,
            shortest: 4.0,
            length_girth: 12.0,
            shipping_weight_lb: 0.5,
        };
        let tier = resolve_size_tier(&rules, &dims).unwrap();
        assert_eq!(tier.tier, "small-standard");
    }

    #[test]
    fn test_tier_bounds_convert_units() {
        // 40 cm is ~15.7 in, so a 16 in package does not fit.
        let rules = vec![tier_rule(
            "small-standard",
            Some(40.0),
            None,
            LengthUnit::Cm,
            WeightUnit::Lb,
        )];
        let mut dims = PackageDims {
            longest: 16.0,
            median: 10.0,
            shortest: 2.0,
            length_girth: 40.0,
            shipping_weight_lb: 0.5,
        };
        assert!(resolve_size_tier(&rules, &dims).is_none());
        dims.longest = 15.0;
        assert!(resolve_size_tier(&rules, &dims).is_some());
    }

    #[test]
    fn test_tier_name_normalization() {
        assert_eq!(normalize_tier_name("small standard-size"), "Small Standard");
        assert_eq!(normalize_tier_name("LARGE  Standard"), "Large Standard");
        assert_eq!(normalize_tier_name("oversize"), "Oversize");
        assert_eq!(normalize_tier_name(" Special Tier "), "Special Tier");
    }

    #[test]
    fn test_fee_band_fixed_fee() {
        let rules = vec![FbaFeeRule {
            tier: "Small Standard".into(),
            unit: WeightUnit::Oz,
            weight_min: Some(0.0),
            weight_max: Some(8.0),
            fee_usd: Some(dec!(3.22)),
            base_usd: None,
            overage_rules: vec![],
        }];
        let fee = fba_fee_for(&rules, "small-standard size", 0.4643).unwrap();
        assert_eq!(fee, dec!(3.22));
    }

    #[test]
    fn test_fee_band_overage_ladder() {
        let rules = vec![FbaFeeRule {
            tier: "Oversize".into(),
            unit: WeightUnit::Lb,
            weight_min: Some(0.0),
            weight_max: Some(150.0),
            fee_usd: None,
            base_usd: Some(dec!(9.73)),
            overage_rules: vec![OverageRule {
                over_threshold_value: 1.0,
                over_threshold_unit: WeightUnit::Lb,
                step_value: 0.5,
                step_fee_usd: dec!(0.38),
            }],
        }];
        // 2.2 lb is 1.2 lb over, i.e. ceil(1.2 / 0.5) = 3 steps.
        let fee = fba_fee_for(&rules, "Oversize", 2.2).unwrap();
        assert_eq!(fee, dec!(9.73) + dec!(0.38) * dec!(3));
    }

    #[test]
    fn test_no_band_is_an_error() {
        let rules = vec![FbaFeeRule {
            tier: "Small Standard".into(),
            unit: WeightUnit::Oz,
            weight_min: Some(0.0),
            weight_max: Some(8.0),
            fee_usd: Some(dec!(3.22)),
            base_usd: None,
            overage_rules: vec![],
        }];
        assert!(matches!(
            fba_fee_for(&rules, "Small Standard", 40.0),
            Err(IngestError::NoMatchingFeeBand(_))
        ));
    }
}
