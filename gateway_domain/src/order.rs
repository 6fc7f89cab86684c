use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    StopLoss,
    StopLossLimit,
    TakeProfit,
    TakeProfitLimit,
    LimitMaker,
}

impl OrderType {
    /// LIMIT-like types require `timeInForce` + `price` (§4.5 createOrder).
    pub fn requires_time_in_force_and_price(&self) -> bool {
        matches!(
            self,
            OrderType::Limit
                | OrderType::StopLossLimit
                | OrderType::TakeProfitLimit
                | OrderType::LimitMaker
        )
    }

    /// STOP-like types require `stopPrice`.
    pub fn requires_stop_price(&self) -> bool {
        matches!(
            self,
            OrderType::StopLoss | OrderType::StopLossLimit | OrderType::TakeProfit | OrderType::TakeProfitLimit
        )
    }
}

/// Canonical order shape (§3). Numeric fields are kept as `Decimal` in-process
/// and serialized as decimal strings at every boundary — never binary floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    pub symbol: String,
    pub order_id: i64,
    /// Always -1: this gateway never forms OCO order lists (§3, §4.5).
    pub order_list_id: i64,
    pub client_order_id: String,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub cummulative_quote_qty: Decimal,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: OrderSide,
    pub stop_price: Option<Decimal>,
    pub iceberg_qty: Option<Decimal>,
    pub time: i64,
    pub update_time: i64,
    pub is_working: bool,
    pub orig_quote_order_qty: Decimal,
}

impl CanonicalOrder {
    pub const NO_ORDER_LIST: i64 = -1;

    /// `origQuoteOrderQty` derived as `origQty · price` when a venue omits it
    /// natively (§4.2 normalization rules).
    pub fn derive_orig_quote_order_qty(orig_qty: Decimal, price: Decimal) -> Decimal {
        orig_qty * price
    }
}

/// Request to cancel a resting order; carried internally between the venue
/// client and the per-venue REST adapters.
#[derive(Debug, Clone)]
pub struct OrderCancelling {
    pub symbol: String,
    pub order_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionType {
    New,
    Canceled,
    Rejected,
    Trade,
    Expired,
}

/// Mirrors the reference venue's `executionReport` (§3). `PARTIALLY_FILLED`
/// events must carry nonzero `last_executed_quantity`; `FILLED` must satisfy
/// `cumulative_filled_quantity == orig_qty` within tick-size rounding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReportEvent {
    pub symbol: String,
    pub order_id: i64,
    pub order_list_id: i64,
    pub client_order_id: String,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub cummulative_quote_qty: Decimal,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: OrderSide,
    pub stop_price: Option<Decimal>,
    pub iceberg_qty: Option<Decimal>,
    pub time: i64,
    pub update_time: i64,
    pub is_working: bool,
    pub orig_quote_order_qty: Decimal,
    pub execution_type: ExecutionType,
    pub last_executed_quantity: Decimal,
    pub last_executed_price: Decimal,
    pub transaction_time: i64,
    pub trade_id: Option<i64>,
    pub in_order_book: bool,
    pub is_maker_side: bool,
}

impl ExecutionReportEvent {
    /// §3 invariant: a FILLED report's cumulative quantity must match
    /// `origQty` to within rounding below `tick`.
    pub fn satisfies_fill_invariant(&self, tick: Decimal) -> bool {
        if self.status != OrderStatus::Filled {
            return true;
        }
        (self.executed_qty - self.orig_qty).abs() <= tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn filled_report_within_tick_satisfies_invariant() {
        let mut report = sample_report();
        report.status = OrderStatus::Filled;
        report.executed_qty = dec!(1.0001);
        report.orig_qty = dec!(1.0000);
        assert!(report.satisfies_fill_invariant(dec!(0.001)));
    }

    #[test]
    fn filled_report_outside_tick_violates_invariant() {
        let mut report = sample_report();
        report.status = OrderStatus::Filled;
        report.executed_qty = dec!(0.5);
        report.orig_qty = dec!(1.0);
        assert!(!report.satisfies_fill_invariant(dec!(0.001)));
    }

    fn sample_report() -> ExecutionReportEvent {
        ExecutionReportEvent {
            symbol: "BTCUSDT".into(),
            order_id: 1,
            order_list_id: CanonicalOrder::NO_ORDER_LIST,
            client_order_id: "abc".into(),
            price: dec!(1),
            orig_qty: dec!(1),
            executed_qty: dec!(1),
            cummulative_quote_qty: dec!(1),
            status: OrderStatus::New,
            time_in_force: TimeInForce::Gtc,
            order_type: OrderType::Limit,
            side: OrderSide::Buy,
            stop_price: None,
            iceberg_qty: None,
            time: 0,
            update_time: 0,
            is_working: true,
            orig_quote_order_qty: dec!(1),
            execution_type: ExecutionType::New,
            last_executed_quantity: dec!(0),
            last_executed_price: dec!(0),
            transaction_time: 0,
            trade_id: None,
            in_order_book: true,
            is_maker_side: false,
        }
    }
}
