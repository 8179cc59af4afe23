// fees/matcher.rs
// Fuzzy category matching and referral fee computation

use research_common::data::types::{FeeApplyTo, ReferralFeeRule};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Minimum token-set similarity for two category names to match.
pub const JACCARD_THRESHOLD: f64 = 0.5;

/// Canonical form for category comparison: lower case, `&` expanded to
/// "and", everything non-alphanumeric collapsed to single spaces.
pub fn normalize_category(raw: &str) -> String {
    let expanded = raw.to_lowercase().replace('&', " and ");
    let mut out = String::with_capacity(expanded.len());
    let mut last_space = true;
    for ch in expanded.chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Token-level Jaccard similarity over whitespace-split words.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// A rule category matches a product category if either normalized name
/// contains the other, or their token sets are similar enough.
pub fn category_matches(rule_category: &str, product_category: &str) -> bool {
    let rule = normalize_category(rule_category);
    let product = normalize_category(product_category);
    if rule.is_empty() || product.is_empty() {
        return false;
    }
    if rule.contains(&product) || product.contains(&rule) {
        return true;
    }
    token_jaccard(&rule, &product) >= JACCARD_THRESHOLD
}

/// Resolved referral fee for one price point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferralFee {
    pub amount: f64,
    /// Effective fraction of price (amount / price).
    pub percent: f64,
}

fn price_in_band(rule: &ReferralFeeRule, price: Decimal) -> bool {
    let min = rule.price_min.unwrap_or(Decimal::ZERO);
    if price < min {
        return false;
    }
    match rule.price_max {
        Some(max) => price <= max,
        None => true,
    }
}

/// A `total` rule applies only when the price sits inside its band; a
/// `portion` rule applies whenever any slice of the price falls above
/// its lower bound, so lower bands keep contributing to the sum.
fn rule_applies(rule: &ReferralFeeRule, price: Decimal) -> bool {
    match rule.apply_to {
        FeeApplyTo::Total => price_in_band(rule, price),
        FeeApplyTo::Portion => price > rule.price_min.unwrap_or(Decimal::ZERO),
    }
}

/// Compute the referral fee for a category/price against the rule table.
///
/// All matching rules contribute: `total` rules take their percentage of
/// the whole price, `portion` rules only of the price slice inside their
/// band. The sum is clamped to the largest minimum fee among matching
/// rules. Without any match the category's persisted defaults apply;
/// without those either, there is no fee.
pub fn referral_fee(
    rules: &[ReferralFeeRule],
    category: &str,
    price: f64,
    default_percent: Option<f64>,
    default_min_fee: Option<f64>,
) -> Option<ReferralFee> {
    if price <= 0.0 || !price.is_finite() {
        return None;
    }
    let price_d = Decimal::from_f64(price)?;

    let matching: Vec<&ReferralFeeRule> = rules
        .iter()
        .filter(|rule| category_matches(&rule.category, category) && rule_applies(rule, price_d))
        .collect();

    let (mut fee, min_fee) = if matching.is_empty() {
        let percent = Decimal::from_f64(default_percent?)?;
        let min_fee = default_min_fee.and_then(Decimal::from_f64);
        (price_d * percent, min_fee)
    } else {
        let mut fee = Decimal::ZERO;
        for rule in &matching {
            let contribution = match rule.apply_to {
                FeeApplyTo::Total => price_d * rule.fee_percent,
                FeeApplyTo::Portion => {
                    let upper = match rule.price_max {
                        Some(max) => price_d.min(max),
                        None => price_d,
                    };
                    let lower = rule.price_min.unwrap_or(Decimal::ZERO).max(Decimal::ZERO);
                    (upper - lower).max(Decimal::ZERO) * rule.fee_percent
                }
            };
            fee += contribution;
        }
        let min_fee = matching.iter().filter_map(|r| r.min_fee_usd).max();
        (fee, min_fee)
    };

    if let Some(min_fee) = min_fee {
        if fee < min_fee {
            fee = min_fee;
        }
    }

    let amount = fee.to_f64().unwrap_or(0.0);
    Some(ReferralFee {
        amount,
        percent: amount / price,
    })
}
