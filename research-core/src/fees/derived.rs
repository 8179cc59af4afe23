// fees/derived.rs
// Chained profitability and advertising efficiency metrics

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Assumed advertising spend as a fraction of price.
pub const ADS_PCT: Decimal = dec!(0.20);
/// Target profit as a fraction of price.
pub const PROFIT_TARGET_PCT: Decimal = dec!(0.20);
/// Assumed cost of goods as a fraction of price.
pub const COGS_ASSUMED_PCT: Decimal = dec!(0.20);

/// Profitability chain computed from price and resolved fees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedCosts {
    pub ads: f64,
    pub fee: f64,
    pub cogs_cap: f64,
    pub profit: f64,
    pub margin_pct: f64,
    pub roi_pct: f64,
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Compute cost cap, profit, margin and ROI. Missing fees enter as 0.
pub fn derive_costs(price: f64, referral_fee: f64, fba_fee: f64) -> DerivedCosts {
    let price_d = to_decimal(price);
    let fee = to_decimal(referral_fee) + to_decimal(fba_fee);

    let ads = ADS_PCT * price_d;
    let profit_target = PROFIT_TARGET_PCT * price_d;
    let cogs_assumed = COGS_ASSUMED_PCT * price_d;

    let cogs_cap = price_d - (ads + fee + profit_target);
    let profit = price_d - (ads + fee + cogs_assumed);

    let margin_pct = if price_d > Decimal::ZERO {
        profit / price_d * dec!(100)
    } else {
        Decimal::ZERO
    };
    let roi_pct = if cogs_assumed > Decimal::ZERO {
        profit / cogs_assumed * dec!(100)
    } else {
        Decimal::ZERO
    };

    DerivedCosts {
        ads: ads.to_f64().unwrap_or(0.0),
        fee: fee.to_f64().unwrap_or(0.0),
        cogs_cap: cogs_cap.to_f64().unwrap_or(0.0),
        profit: profit.to_f64().unwrap_or(0.0),
        margin_pct: margin_pct.to_f64().unwrap_or(0.0),
        roi_pct: roi_pct.to_f64().unwrap_or(0.0),
    }
}

// Advertising efficiency chain. All rates are fractions here (not
// percentage points); callers convert stored point values down first.

pub fn roas(cr: f64, avg_price: f64, cpc: f64) -> Option<f64> {
    if cpc <= 0.0 || !cr.is_finite() || !avg_price.is_finite() {
        return None;
    }
    let value = cr * avg_price / cpc;
    value.is_finite().then_some(value)
}

pub fn acos(roas: f64) -> Option<f64> {
    (roas > 0.0 && roas.is_finite()).then(|| 1.0 / roas)
}

pub fn tacos(acos: f64, click_share: f64) -> Option<f64> {
    let value = acos * click_share;
    value.is_finite().then_some(value)
}

pub fn cpp(cpc: f64, cr: f64) -> Option<f64> {
    if cr <= 0.0 || !cpc.is_finite() {
        return None;
    }
    let value = cpc / cr;
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_chain() {
        // price 20, referral 3, fba 2: ads 4, target 4, cogs 4.
        let costs = derive_costs(20.0, 3.0, 2.0);
        assert!((costs.ads - 4.0).abs() < 1e-9);
        assert!((costs.fee - 5.0).abs() < 1e-9);
        assert!((costs.cogs_cap - 7.0).abs() < 1e-9);
        assert!((costs.profit - 7.0).abs() < 1e-9);
        assert!((costs.margin_pct - 35.0).abs() < 1e-9);
        assert!((costs.roi_pct - 175.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_price_guards() {
        let costs = derive_costs(0.0, 0.0, 0.0);
        assert_eq!(costs.margin_pct, 0.0);
        assert_eq!(costs.roi_pct, 0.0);
    }

    #[test]
    fn test_ads_chain() {
        let roas_value = roas(0.05, 20.0, 0.8).unwrap();
        assert!((roas_value - 1.25).abs() < 1e-9);
        let acos_value = acos(roas_value).unwrap();
        assert!((acos_value - 0.8).abs() < 1e-9);
        let tacos_value = tacos(acos_value, 0.4).unwrap();
        assert!((tacos_value - 0.32).abs() < 1e-9);
        let cpp_value = cpp(0.8, 0.05).unwrap();
        assert!((cpp_value - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_ads_chain_missing_inputs() {
        assert_eq!(roas(0.05, 20.0, 0.0), None);
        assert_eq!(acos(0.0), None);
        assert_eq!(cpp(0.8, 0.0), None);
    }
}
