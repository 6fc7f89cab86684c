use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// `PRICE_FILTER` from the canonical symbol shape (§3). Mandatory on every
/// symbol; venues that omit ticks natively get one synthesized from their own
/// precision metadata by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceFilter {
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub tick_size: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotSize {
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub step_size: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinNotional {
    pub min_notional: Decimal,
    pub apply_to_market: bool,
    pub avg_price_mins: u32,
}

/// Unknown-to-venue filters may be omitted entirely; PRICE_FILTER, LOT_SIZE
/// and MIN_NOTIONAL are mandatory on every canonical symbol (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub price_filter: PriceFilter,
    pub lot_size: LotSize,
    pub min_notional: MinNotional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SymbolStatus {
    Trading,
    Break,
    Halt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub base_asset_precision: u32,
    pub filters: SymbolFilters,
    pub order_types: Vec<String>,
    pub permissions: Vec<String>,
    pub status: SymbolStatus,
}

impl Symbol {
    /// Truncates `price` down to a multiple of `tick_size`, toward zero, and
    /// strips trailing zeros (§8 scenario 1: tickSize=0.01, "12345.6789" ->
    /// "12345.67").
    pub fn refine_price(&self, price: Decimal) -> Decimal {
        refine_to_step(price, self.filters.price_filter.tick_size)
    }

    /// Truncates `qty` down to a multiple of `step_size`, toward zero (§8
    /// scenario 2: stepSize=0.001, "1.23456" -> "1.234").
    pub fn refine_qty(&self, qty: Decimal) -> Decimal {
        refine_to_step(qty, self.filters.lot_size.step_size)
    }
}

fn refine_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= dec!(0) {
        return value.normalize();
    }
    ((value / step).trunc() * step).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(dec!(12345.6789), dec!(0.01), dec!(12345.67))]
    #[case(dec!(1.23456), dec!(0.001), dec!(1.234))]
    #[case(dec!(100), dec!(1), dec!(100))]
    #[case(dec!(0.00009), dec!(0.0001), dec!(0))]
    fn refines_toward_zero_and_strips_zeros(
        #[case] value: Decimal,
        #[case] step: Decimal,
        #[case] expected: Decimal,
    ) {
        assert_eq!(refine_to_step(value, step), expected);
    }
}
