use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::CanonicalOrder;

/// Canonical trade shape (§3). `quote_qty` is always `price * qty`;
/// `is_best_match` is always `true` — this gateway never synthesizes worse
/// fills than what the venue reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTrade {
    pub symbol: String,
    pub id: i64,
    pub order_id: i64,
    pub order_list_id: i64,
    pub price: Decimal,
    pub qty: Decimal,
    pub quote_qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
    pub time: i64,
    pub is_buyer: bool,
    pub is_maker: bool,
    pub is_best_match: bool,
}

impl CanonicalTrade {
    pub fn new(
        symbol: String,
        id: i64,
        order_id: i64,
        price: Decimal,
        qty: Decimal,
        commission: Decimal,
        commission_asset: String,
        time: i64,
        is_buyer: bool,
        is_maker: bool,
    ) -> Self {
        Self {
            symbol,
            id,
            order_id,
            order_list_id: CanonicalOrder::NO_ORDER_LIST,
            quote_qty: price * qty,
            price,
            qty,
            commission,
            commission_asset,
            time,
            is_buyer,
            is_maker,
            is_best_match: true,
        }
    }
}
