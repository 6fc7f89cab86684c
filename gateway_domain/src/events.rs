use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::interval::{Candle, Interval};
use crate::order::ExecutionReportEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Mirrors the reference venue's `outboundAccountPosition` (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundAccountPositionEvent {
    pub event_time: i64,
    pub update_time: i64,
    pub balances: Vec<Balance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiniTickerEvent {
    pub symbol: String,
    pub event_time: i64,
    pub close_price: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub base_volume: Decimal,
    pub quote_volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleEvent {
    pub symbol: String,
    pub interval: Interval,
    pub candle: Candle,
    pub is_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub qty: Decimal,
}

/// Top-5 order book snapshot/update (§3, §4.3). `bids` descending, `asks`
/// ascending, each trimmed to 5 entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookTopEvent {
    pub symbol: String,
    pub last_update_id: i64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Per §9's "dynamic field bags ... become tagged variants" redesign flag:
/// every decoded stream frame is one of these concrete kinds, validated at
/// parse time rather than carried as a string-keyed map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CanonicalEvent {
    ExecutionReport(ExecutionReportEvent),
    OutboundAccountPosition(OutboundAccountPositionEvent),
    MiniTicker(MiniTickerEvent),
    Candle(CandleEvent),
    OrderBookTop(OrderBookTopEvent),
}

impl CanonicalEvent {
    /// The event-bus dispatch key this event was produced for, e.g.
    /// `"executionReport"` or `"BTCUSDT@kline_1m"` (§4.7 `wrap`).
    pub fn event_key(&self, symbol_override: Option<&str>) -> String {
        match self {
            CanonicalEvent::ExecutionReport(_) => "executionReport".to_string(),
            CanonicalEvent::OutboundAccountPosition(_) => "outboundAccountPosition".to_string(),
            CanonicalEvent::MiniTicker(e) => {
                format!("{}@miniTicker", symbol_override.unwrap_or(&e.symbol))
            }
            CanonicalEvent::Candle(e) => format!(
                "{}@kline_{}",
                symbol_override.unwrap_or(&e.symbol),
                e.interval.canonical_str()
            ),
            CanonicalEvent::OrderBookTop(e) => {
                format!("{}@depth5", symbol_override.unwrap_or(&e.symbol))
            }
        }
    }
}
