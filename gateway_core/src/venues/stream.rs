//! Per-venue WebSocket data-frame decoding (§4.6 FRAME HANDLER): turns one
//! already-gunzipped text payload into a [`CanonicalEvent`] and fires it on
//! the session's event bus, returning the [`FrameOutcome`] the connection
//! engine needs to drive its state machine.
//!
//! Scope note (§9 open question): the reference venue's wire shape is what
//! the canonical model is modeled on, so its decode below is complete,
//! including `executionReport`/`outboundAccountPosition`. VenueB/C/D public
//! ticker (and, for B/D, order book / kline) frames are decoded the same
//! way; their private order-update streams are not decoded here yet, so
//! `OnOrderUpdate` for those three venues only reflects whatever the caller
//! polls via `fetchOrder`/`fetchAccountTradeList` elsewhere, not live push
//! updates. Extending this module with their private stream shapes doesn't
//! require touching the connection engine.

use std::collections::HashMap;
use std::str::FromStr;

use gateway_domain::events::CandleEvent;
use gateway_domain::{
    Balance, Candle, CanonicalEvent, ExecutionReportEvent, ExecutionType, Interval, MiniTickerEvent,
    OrderBookTopEvent, OrderSide, OrderType, OutboundAccountPositionEvent, PriceLevel, TimeInForce,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::connectivity::FrameOutcome;
use crate::eventbus::EventBus;
use crate::venues::reference::parse_order_status;
use crate::venues::venue_b::from_native_symbol;
use crate::venues::ActiveOrderEntry;

/// Latches `report` into `active_orders` (§3 invariant:
/// `activeOrders[id].executedQty ≤ origQty`; upon equality, `lastEvent` is
/// latched). Runs inside the same decode loop that fires the live event, so
/// there's no separate lock ordering to reason about.
fn latch_active_order(active_orders: &Mutex<HashMap<i64, ActiveOrderEntry>>, report: &ExecutionReportEvent) {
    let mut orders = active_orders.lock();
    let entry = orders.entry(report.order_id).or_insert_with(|| ActiveOrderEntry {
        orig_qty: report.orig_qty,
        ..Default::default()
    });
    entry.executed_qty = report.executed_qty;
    if entry.executed_qty >= entry.orig_qty {
        entry.filled_time.get_or_insert(report.transaction_time);
        entry.last_event = Some(report.clone());
    }
}

fn fire(bus: &EventBus, event: CanonicalEvent) -> FrameOutcome {
    match bus.fire(&event.event_key(None), event) {
        Ok(()) => FrameOutcome::DataReceived,
        Err(overflow) => FrameOutcome::TerminalError(format!("queue overflow on {}", overflow.event_key)),
    }
}

fn dec(value: &Value) -> Decimal {
    value.as_str().and_then(|s| Decimal::from_str(s).ok()).unwrap_or_default()
}

fn order_side(raw: &str) -> OrderSide {
    if raw.eq_ignore_ascii_case("SELL") {
        OrderSide::Sell
    } else {
        OrderSide::Buy
    }
}

fn order_type(raw: &str) -> OrderType {
    match raw {
        "MARKET" => OrderType::Market,
        "STOP_LOSS" => OrderType::StopLoss,
        "STOP_LOSS_LIMIT" => OrderType::StopLossLimit,
        "TAKE_PROFIT" => OrderType::TakeProfit,
        "TAKE_PROFIT_LIMIT" => OrderType::TakeProfitLimit,
        "LIMIT_MAKER" => OrderType::LimitMaker,
        _ => OrderType::Limit,
    }
}

fn execution_type(raw: &str) -> ExecutionType {
    match raw {
        "CANCELED" => ExecutionType::Canceled,
        "REJECTED" => ExecutionType::Rejected,
        "TRADE" => ExecutionType::Trade,
        "EXPIRED" => ExecutionType::Expired,
        _ => ExecutionType::New,
    }
}

/// Reference venue combined public/user-stream decode (§3, §4.2, §4.6).
pub fn reference_on_message(
    bus: &EventBus,
    active_orders: &Mutex<HashMap<i64, ActiveOrderEntry>>,
    text: &str,
) -> FrameOutcome {
    let Ok(json) = serde_json::from_str::<Value>(text) else {
        return FrameOutcome::Continue;
    };

    match json["e"].as_str() {
        Some("24hrMiniTicker") => fire(
            bus,
            CanonicalEvent::MiniTicker(MiniTickerEvent {
                symbol: json["s"].as_str().unwrap_or_default().to_string(),
                event_time: json["E"].as_i64().unwrap_or_default(),
                close_price: dec(&json["c"]),
                open_price: dec(&json["o"]),
                high_price: dec(&json["h"]),
                low_price: dec(&json["l"]),
                base_volume: dec(&json["v"]),
                quote_volume: dec(&json["q"]),
            }),
        ),
        Some("kline") => {
            let k = &json["k"];
            let Ok(interval) = k["i"].as_str().unwrap_or_default().parse::<Interval>() else {
                return FrameOutcome::Continue;
            };
            fire(
                bus,
                CanonicalEvent::Candle(CandleEvent {
                    symbol: json["s"].as_str().unwrap_or_default().to_string(),
                    interval,
                    candle: Candle {
                        open_time: k["t"].as_i64().unwrap_or_default(),
                        open: dec(&k["o"]),
                        high: dec(&k["h"]),
                        low: dec(&k["l"]),
                        close: dec(&k["c"]),
                        volume: dec(&k["v"]),
                        close_time: k["T"].as_i64().unwrap_or_default(),
                        quote_volume: dec(&k["q"]),
                        num_trades: k["n"].as_i64().unwrap_or_default(),
                        taker_buy_base_volume: dec(&k["V"]),
                        taker_buy_quote_volume: dec(&k["Q"]),
                    },
                    is_closed: k["x"].as_bool().unwrap_or(false),
                }),
            )
        }
        Some("depthUpdate") => {
            let levels = |raw: &Value| -> Vec<PriceLevel> {
                raw.as_array()
                    .unwrap_or(&Vec::new())
                    .iter()
                    .take(5)
                    .map(|level| PriceLevel {
                        price: dec(&level[0]),
                        qty: dec(&level[1]),
                    })
                    .collect()
            };
            fire(
                bus,
                CanonicalEvent::OrderBookTop(OrderBookTopEvent {
                    symbol: json["s"].as_str().unwrap_or_default().to_string(),
                    last_update_id: json["u"].as_i64().unwrap_or_default(),
                    bids: levels(&json["b"]),
                    asks: levels(&json["a"]),
                }),
            )
        }
        Some("executionReport") => {
            let report = ExecutionReportEvent {
                symbol: json["s"].as_str().unwrap_or_default().to_string(),
                order_id: json["i"].as_i64().unwrap_or_default(),
                order_list_id: json["g"].as_i64().unwrap_or(-1),
                client_order_id: json["c"].as_str().unwrap_or_default().to_string(),
                price: dec(&json["p"]),
                orig_qty: dec(&json["q"]),
                executed_qty: dec(&json["z"]),
                cummulative_quote_qty: dec(&json["Z"]),
                status: parse_order_status(json["X"].as_str().unwrap_or("NEW")),
                time_in_force: match json["f"].as_str() {
                    Some("IOC") => TimeInForce::Ioc,
                    Some("FOK") => TimeInForce::Fok,
                    _ => TimeInForce::Gtc,
                },
                order_type: order_type(json["o"].as_str().unwrap_or("LIMIT")),
                side: order_side(json["S"].as_str().unwrap_or("BUY")),
                stop_price: json.get("P").and_then(|v| v.as_str()).and_then(|v| Decimal::from_str(v).ok()),
                iceberg_qty: json.get("F").and_then(|v| v.as_str()).and_then(|v| Decimal::from_str(v).ok()),
                time: json["O"].as_i64().unwrap_or_default(),
                update_time: json["T"].as_i64().unwrap_or_default(),
                is_working: json["w"].as_bool().unwrap_or(true),
                orig_quote_order_qty: json.get("Q").map(dec).unwrap_or_default(),
                execution_type: execution_type(json["x"].as_str().unwrap_or("NEW")),
                last_executed_quantity: dec(&json["l"]),
                last_executed_price: dec(&json["L"]),
                transaction_time: json["T"].as_i64().unwrap_or_default(),
                trade_id: json["t"].as_i64().filter(|id| *id >= 0),
                in_order_book: json["w"].as_bool().unwrap_or(true),
                is_maker_side: json["m"].as_bool().unwrap_or(false),
            };
            latch_active_order(active_orders, &report);
            fire(bus, CanonicalEvent::ExecutionReport(report))
        }
        Some("outboundAccountPosition") => fire(
            bus,
            CanonicalEvent::OutboundAccountPosition(OutboundAccountPositionEvent {
                event_time: json["E"].as_i64().unwrap_or_default(),
                update_time: json["u"].as_i64().unwrap_or_default(),
                balances: json["B"]
                    .as_array()
                    .unwrap_or(&Vec::new())
                    .iter()
                    .map(|b| Balance {
                        asset: b["a"].as_str().unwrap_or_default().to_string(),
                        free: dec(&b["f"]),
                        locked: dec(&b["l"]),
                    })
                    .collect(),
            }),
        ),
        _ => FrameOutcome::Continue,
    }
}

fn kraken_levels(raw: Option<&Value>) -> Vec<PriceLevel> {
    raw.and_then(Value::as_array)
        .unwrap_or(&Vec::new())
        .iter()
        .take(5)
        .filter_map(|level| {
            let level = level.as_array()?;
            Some(PriceLevel {
                price: level.first().map(dec)?,
                qty: level.get(1).map(dec)?,
            })
        })
        .collect()
}

/// VenueB (Kraken-shaped) public stream decode. Frames are
/// `[channelId, data, channelName, pair]`; control/heartbeat frames arrive
/// as objects instead and are ignored here.
pub fn venue_b_on_message(bus: &EventBus, text: &str) -> FrameOutcome {
    let Ok(json) = serde_json::from_str::<Value>(text) else {
        return FrameOutcome::Continue;
    };
    let Some(arr) = json.as_array() else {
        return FrameOutcome::Continue;
    };
    if arr.len() < 4 {
        return FrameOutcome::Continue;
    }

    let data = &arr[1];
    let channel = arr[2].as_str().unwrap_or_default();
    let symbol = from_native_symbol(arr[3].as_str().unwrap_or_default());

    if channel == "ticker" {
        let f = |key: &str| data[key][0].as_str().and_then(|s| Decimal::from_str(s).ok()).unwrap_or_default();
        return fire(
            bus,
            CanonicalEvent::MiniTicker(MiniTickerEvent {
                symbol,
                event_time: 0,
                close_price: f("c"),
                open_price: data["o"][0].as_str().and_then(|s| Decimal::from_str(s).ok()).unwrap_or(f("c")),
                high_price: f("h"),
                low_price: f("l"),
                base_volume: f("v"),
                quote_volume: Decimal::ZERO,
            }),
        );
    }

    if let Some(minutes) = channel.strip_prefix("ohlc-") {
        let interval = match minutes {
            "1" => Some(Interval::OneMinute),
            "5" => Some(Interval::FiveMinutes),
            "15" => Some(Interval::FifteenMinutes),
            "30" => Some(Interval::ThirtyMinutes),
            "60" => Some(Interval::OneHour),
            "240" => Some(Interval::FourHours),
            "1440" => Some(Interval::OneDay),
            _ => None,
        };
        let (Some(interval), Some(row)) = (interval, data.as_array()) else {
            return FrameOutcome::Continue;
        };
        let f = |idx: usize| row.get(idx).map(dec).unwrap_or_default();
        return fire(
            bus,
            CanonicalEvent::Candle(CandleEvent {
                symbol,
                interval,
                candle: Candle {
                    open_time: row.first().and_then(|v| v.as_f64()).unwrap_or_default() as i64,
                    open: f(2),
                    high: f(3),
                    low: f(4),
                    close: f(5),
                    volume: f(7),
                    close_time: row.get(1).and_then(|v| v.as_f64()).unwrap_or_default() as i64,
                    quote_volume: Decimal::ZERO,
                    num_trades: row.get(8).and_then(|v| v.as_i64()).unwrap_or_default(),
                    taker_buy_base_volume: Decimal::ZERO,
                    taker_buy_quote_volume: Decimal::ZERO,
                },
                is_closed: false,
            }),
        );
    }

    if channel.starts_with("book-5") {
        let bids = kraken_levels(data.get("bs").or_else(|| data.get("b")));
        let asks = kraken_levels(data.get("as").or_else(|| data.get("a")));
        if bids.is_empty() && asks.is_empty() {
            return FrameOutcome::Continue;
        }
        return fire(
            bus,
            CanonicalEvent::OrderBookTop(OrderBookTopEvent {
                symbol,
                last_update_id: 0,
                bids,
                asks,
            }),
        );
    }

    FrameOutcome::Continue
}

/// VenueC (Bitfinex-shaped) public stream decode. This gateway subscribes
/// one channel per connection (§4.6 SUBSCRIBE), so a bare numeric-array
/// payload is unambiguously that connection's ticker; `"hb"` is the
/// heartbeat payload.
pub fn venue_c_on_message(bus: &EventBus, text: &str, symbol: &str) -> FrameOutcome {
    let Ok(json) = serde_json::from_str::<Value>(text) else {
        return FrameOutcome::Continue;
    };
    if crate::connectivity::frame::is_control_frame(&json) {
        return FrameOutcome::Continue;
    }
    let Some(arr) = json.as_array() else {
        return FrameOutcome::Continue;
    };
    if arr.len() < 2 {
        return FrameOutcome::Continue;
    }
    if arr[1].as_str() == Some("hb") {
        return FrameOutcome::Continue;
    }
    let Some(payload) = arr[1].as_array() else {
        return FrameOutcome::Continue;
    };
    if payload.len() < 10 {
        return FrameOutcome::Continue;
    }

    let f = |idx: usize| payload.get(idx).and_then(|v| v.as_f64()).map(|v| Decimal::from_str(&v.to_string()).unwrap_or_default()).unwrap_or_default();
    let last_price = f(6);
    let daily_change = f(4);
    fire(
        bus,
        CanonicalEvent::MiniTicker(MiniTickerEvent {
            symbol: symbol.to_string(),
            event_time: 0,
            close_price: last_price,
            open_price: last_price - daily_change,
            high_price: f(8),
            low_price: f(9),
            base_volume: f(7),
            quote_volume: Decimal::ZERO,
        }),
    )
}

/// VenueD (OKX-shaped) public stream decode: `{"arg":{"channel":...},"data":[...]}`.
pub fn venue_d_on_message(bus: &EventBus, text: &str) -> FrameOutcome {
    let Ok(json) = serde_json::from_str::<Value>(text) else {
        return FrameOutcome::Continue;
    };
    let channel = json["arg"]["channel"].as_str().unwrap_or_default();
    let Some(row) = json["data"].as_array().and_then(|rows| rows.first()) else {
        return FrameOutcome::Continue;
    };

    match channel {
        "tickers" => {
            let d = |key: &str| row.get(key).map(dec).unwrap_or_default();
            fire(
                bus,
                CanonicalEvent::MiniTicker(MiniTickerEvent {
                    symbol: row["instId"].as_str().unwrap_or_default().to_string(),
                    event_time: row["ts"].as_str().and_then(|v| v.parse().ok()).unwrap_or_default(),
                    close_price: d("last"),
                    open_price: d("open24h"),
                    high_price: d("high24h"),
                    low_price: d("low24h"),
                    base_volume: d("vol24h"),
                    quote_volume: d("volCcy24h"),
                }),
            )
        }
        "books5" => {
            let levels = |key: &str| -> Vec<PriceLevel> {
                row[key]
                    .as_array()
                    .unwrap_or(&Vec::new())
                    .iter()
                    .take(5)
                    .map(|level| PriceLevel {
                        price: dec(&level[0]),
                        qty: dec(&level[1]),
                    })
                    .collect()
            };
            fire(
                bus,
                CanonicalEvent::OrderBookTop(OrderBookTopEvent {
                    symbol: json["arg"]["instId"].as_str().unwrap_or_default().to_string(),
                    last_update_id: row["ts"].as_str().and_then(|v| v.parse().ok()).unwrap_or_default(),
                    bids: levels("bids"),
                    asks: levels("asks"),
                }),
            )
        }
        _ => FrameOutcome::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_domain::VenueTag;
    use tokio::sync::mpsc;

    fn bus_with_subscriber(event_key: &str) -> (EventBus, mpsc::Receiver<CanonicalEvent>) {
        let bus = EventBus::new();
        let (tx, rx) = mpsc::channel(8);
        bus.register_event("t1", tx, event_key, VenueTag::Reference);
        (bus, rx)
    }

    #[test]
    fn reference_mini_ticker_frame_fires_and_resets_try_count() {
        let (bus, mut rx) = bus_with_subscriber("BTCUSDT@miniTicker");
        let active_orders = Mutex::new(HashMap::new());
        let frame = serde_json::json!({
            "e": "24hrMiniTicker", "s": "BTCUSDT", "E": 1, "c": "1", "o": "1", "h": "1", "l": "1", "v": "1", "q": "1"
        })
        .to_string();
        assert!(matches!(reference_on_message(&bus, &active_orders, &frame), FrameOutcome::DataReceived));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn reference_unrecognized_event_is_a_continue() {
        let bus = EventBus::new();
        let active_orders = Mutex::new(HashMap::new());
        let frame = serde_json::json!({"e": "somethingUnknown"}).to_string();
        assert!(matches!(reference_on_message(&bus, &active_orders, &frame), FrameOutcome::Continue));
    }

    #[test]
    fn execution_report_latches_last_event_once_order_is_fully_filled() {
        let (bus, mut rx) = bus_with_subscriber("executionReport");
        let active_orders = Mutex::new(HashMap::new());
        let frame = serde_json::json!({
            "e": "executionReport", "s": "BTCUSDT", "i": 7, "g": -1, "c": "client-1",
            "p": "100", "q": "2", "z": "2", "Z": "200", "X": "FILLED", "f": "GTC",
            "o": "LIMIT", "S": "BUY", "O": 1, "T": 2, "w": false, "x": "TRADE",
            "l": "2", "L": "100", "t": 9, "m": true
        })
        .to_string();

        assert!(matches!(reference_on_message(&bus, &active_orders, &frame), FrameOutcome::DataReceived));
        assert!(rx.try_recv().is_ok());

        let orders = active_orders.lock();
        let entry = orders.get(&7).expect("order 7 should be latched");
        assert_eq!(entry.executed_qty, entry.orig_qty);
        assert!(entry.last_event.is_some());
    }

    #[test]
    fn execution_report_does_not_latch_a_partial_fill() {
        let (bus, mut rx) = bus_with_subscriber("executionReport");
        let active_orders = Mutex::new(HashMap::new());
        let frame = serde_json::json!({
            "e": "executionReport", "s": "BTCUSDT", "i": 8, "g": -1, "c": "client-2",
            "p": "100", "q": "2", "z": "1", "Z": "100", "X": "PARTIALLY_FILLED", "f": "GTC",
            "o": "LIMIT", "S": "BUY", "O": 1, "T": 2, "w": true, "x": "TRADE",
            "l": "1", "L": "100", "t": 10, "m": true
        })
        .to_string();

        assert!(matches!(reference_on_message(&bus, &active_orders, &frame), FrameOutcome::DataReceived));
        assert!(rx.try_recv().is_ok());

        let orders = active_orders.lock();
        let entry = orders.get(&8).expect("order 8 should be tracked");
        assert!(entry.last_event.is_none());
    }

    #[test]
    fn venue_b_ticker_array_frame_fires_mini_ticker() {
        let (bus, mut rx) = bus_with_subscriber("XBTUSD@miniTicker");
        let frame = serde_json::json!([
            42, {"c": ["100", "1"], "o": ["99"], "h": ["101"], "l": ["98"], "v": ["10"]}, "ticker", "XBT/USD"
        ])
        .to_string();
        assert!(matches!(venue_b_on_message(&bus, &frame), FrameOutcome::DataReceived));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn venue_c_heartbeat_is_a_continue() {
        let bus = EventBus::new();
        let frame = serde_json::json!([42, "hb"]).to_string();
        assert!(matches!(venue_c_on_message(&bus, &frame, "BTCUSD"), FrameOutcome::Continue));
    }

    #[test]
    fn venue_d_tickers_channel_fires_mini_ticker() {
        let (bus, mut rx) = bus_with_subscriber("BTC-USDT@miniTicker");
        let frame = serde_json::json!({
            "arg": {"channel": "tickers", "instId": "BTC-USDT"},
            "data": [{"instId": "BTC-USDT", "ts": "1", "last": "1", "open24h": "1", "high24h": "1", "low24h": "1", "vol24h": "1", "volCcy24h": "1"}]
        })
        .to_string();
        assert!(matches!(venue_d_on_message(&bus, &frame), FrameOutcome::DataReceived));
        assert!(rx.try_recv().is_ok());
    }
}
