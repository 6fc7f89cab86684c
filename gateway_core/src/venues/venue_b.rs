//! Venue B adapter. Symbol form is `<BASE>/<QUOTE>` (§4.2); auth signs
//! `"AUTH<ts>"` raw-bytes-to-base64 (§4.1, §4.6); order placement races the
//! private WSS stream, so newly placed orders are pre-registered in
//! `activeOrders` and any buffered trade frames are drained into the create
//! response (§4.5, §8 scenario 4).

use async_trait::async_trait;
use gateway_domain::{
    Balance, CanonicalOrder, CanonicalTrade, Candle, GatewayError, Interval, OrderCancelling,
    OrderSide, OrderStatus, OrderType, TimeInForce, VenueTag,
};
use gateway_utils::time::get_current_milliseconds;
use hyper::http::request::Builder;
use hyper::Uri;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

use crate::rest::{ErrorHandlerEmpty, RequestMethod, RestClient, RestHeaders, UriBuilder};
use crate::signer;
use crate::venues::{
    ActiveOrderEntry, LoadedVenueInfo, NewOrder, OrderBookTop, SymbolPriceTicker, TickerStatistics,
    VenueClient,
};

pub struct VenueBConfig {
    pub rest_host: String,
    pub api_key: String,
    pub api_secret: Vec<u8>,
}

pub struct VenueBHeaders {
    pub api_key: String,
}

impl RestHeaders for VenueBHeaders {
    fn add_specific_headers(&self, builder: Builder, _uri: &Uri, _method: RequestMethod) -> Builder {
        builder.header("API-Key", &self.api_key)
    }
}

pub struct VenueB {
    config: VenueBConfig,
    rest: RestClient<ErrorHandlerEmpty, VenueBHeaders>,
    /// Mirrors the session's `activeOrders`/`wssBuffer` for the race window
    /// between placing an order and its first WSS trade frame (§3 invariants).
    active_orders: Mutex<HashMap<i64, ActiveOrderEntry>>,
    wss_buffer: Mutex<HashMap<i64, Vec<CanonicalTrade>>>,
}

/// Symbol form `<BASE>/<QUOTE>` (§4.2).
pub fn to_native_symbol(canonical: &str) -> Option<String> {
    // Canonical symbols carry no separator (e.g. "BTCUSDT"); venue B needs one.
    // Adapters configured with a known quote-asset suffix list resolve this;
    // here we accept an already-slashed symbol as a pass-through for callers
    // that pre-split base/quote.
    if canonical.contains('/') {
        Some(canonical.to_string())
    } else {
        None
    }
}

pub fn from_native_symbol(native: &str) -> String {
    native.replace('/', "")
}

impl VenueB {
    pub fn new(config: VenueBConfig) -> Self {
        let rest = RestClient::new(
            "venue_b",
            false,
            ErrorHandlerEmpty,
            VenueBHeaders {
                api_key: config.api_key.clone(),
            },
        );
        Self {
            config,
            rest,
            active_orders: Mutex::new(HashMap::new()),
            wss_buffer: Mutex::new(HashMap::new()),
        }
    }

    /// Called by the private WSS decode loop (§4.6) when a trade frame
    /// arrives whose parent order isn't registered yet; buffers it for the
    /// in-flight `create_order` call to drain (§8 scenario 4).
    pub fn buffer_trade_frame(&self, order_id: i64, trade: CanonicalTrade) {
        self.wss_buffer.lock().entry(order_id).or_default().push(trade);
    }

    fn drain_buffered_trades(&self, order_id: i64) -> Vec<CanonicalTrade> {
        self.wss_buffer.lock().remove(&order_id).unwrap_or_default()
    }

    fn signed_builder(&self, path: &str) -> UriBuilder {
        let mut builder = UriBuilder::from_path(path);
        builder.add_kv("nonce", get_current_milliseconds());
        builder
    }

    fn sign(&self, payload: &[u8]) -> String {
        signer::sign(VenueTag::VenueB, &self.config.api_secret, payload)
    }

    fn parse_body(&self, body: &str) -> Result<Value, GatewayError> {
        serde_json::from_str(body)
            .map_err(|e| GatewayError::upstream(format!("invalid JSON from venue B: {e}")))
    }
}

#[async_trait]
impl VenueClient for VenueB {
    fn venue_tag(&self) -> VenueTag {
        VenueTag::VenueB
    }

    async fn load(&self) -> Result<LoadedVenueInfo, GatewayError> {
        let uri = UriBuilder::from_path("/0/public/AssetPairs").build_uri(&self.config.rest_host, false);
        let response = self.rest.get(uri, "exchangeInfo").await?;
        let body = self.parse_body(&response.content)?;

        let mut symbols = std::collections::HashMap::new();
        let mut highest_precision = 8u32;
        if let Some(pairs) = body.get("result").and_then(|v| v.as_object()) {
            for (native_symbol, raw) in pairs {
                let symbol = parse_asset_pair(native_symbol, raw)?;
                highest_precision = highest_precision.max(symbol.base_asset_precision);
                symbols.insert(symbol.symbol.clone(), symbol);
            }
        }

        Ok(LoadedVenueInfo {
            symbols,
            highest_precision,
            spot_account_id: None,
        })
    }

    async fn fetch_server_time(&self) -> Result<i64, GatewayError> {
        let uri = UriBuilder::from_path("/0/public/Time").build_uri(&self.config.rest_host, false);
        let response = self.rest.get(uri, "serverTime").await?;
        let body = self.parse_body(&response.content)?;
        body["result"]["unixtime"]
            .as_i64()
            .map(|secs| secs * 1000)
            .ok_or_else(|| GatewayError::upstream("missing unixtime"))
    }

    async fn fetch_order_book(&self, symbol: &str, limit: u32) -> Result<OrderBookTop, GatewayError> {
        const ALLOWED: [u32; 6] = [1, 5, 10, 25, 100, 500];
        if !ALLOWED.contains(&limit) {
            return Err(GatewayError::validation(format!(
                "limit {limit} is not one of venue B's allowed depths"
            )));
        }
        let mut builder = UriBuilder::from_path("/0/public/Depth");
        builder.add_kv("pair", symbol);
        builder.add_kv("count", limit);
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self.rest.get(uri, "orderBook").await?;
        let body = self.parse_body(&response.content)?;
        let inner = body["result"]
            .as_object()
            .and_then(|m| m.values().next())
            .ok_or_else(|| GatewayError::upstream("missing order book result"))?;
        Ok(OrderBookTop {
            last_update_id: get_current_milliseconds() as i64,
            bids: parse_levels(&inner["bids"])?,
            asks: parse_levels(&inner["asks"])?,
        })
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
        _start: Option<i64>,
        _end: Option<i64>,
    ) -> Result<Vec<Candle>, GatewayError> {
        let mut builder = UriBuilder::from_path("/0/public/OHLC");
        builder.add_kv("pair", symbol);
        builder.add_kv("interval", native_interval_minutes(interval));
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self.rest.get(uri, "klines").await?;
        let body = self.parse_body(&response.content)?;
        let rows = body["result"]
            .as_object()
            .and_then(|m| m.values().next())
            .and_then(|v| v.as_array())
            .ok_or_else(|| GatewayError::upstream("missing OHLC rows"))?;
        rows.iter().take(limit as usize).map(parse_ohlc_row).collect()
    }

    async fn create_order(&self, order: NewOrder) -> Result<CanonicalOrder, GatewayError> {
        let mut builder = self.signed_builder("/0/private/AddOrder");
        builder.add_kv("pair", &order.symbol);
        builder.add_kv("type", order_side_str(order.side));
        builder.add_kv("ordertype", order_type_str(order.order_type));
        if let Some(qty) = order.qty {
            builder.add_kv("volume", qty);
        }
        if let Some(price) = order.price {
            builder.add_kv("price", price);
        }

        let payload = builder.query().to_vec();
        let signature = self.sign(&payload);
        let uri = builder.build_uri(&self.config.rest_host, true);

        let response = self
            .rest
            .post_signed(uri, Some(payload), &[("API-Sign", signature)], "createOrder")
            .await?;
        let body = self.parse_body(&response.content)?;
        let mut canonical = parse_add_order_response(&body, &order)?;

        // Pre-register so a racing private WSS trade frame has somewhere to
        // land, then immediately drain whatever already arrived (§8 scenario 4).
        self.active_orders.lock().insert(
            canonical.order_id,
            ActiveOrderEntry {
                orig_qty: canonical.orig_qty,
                executed_qty: Decimal::ZERO,
                filled_time: None,
                cancelled: false,
            },
        );
        let buffered = self.drain_buffered_trades(canonical.order_id);
        if let Some(last) = buffered.last() {
            canonical.executed_qty += buffered.iter().map(|t| t.qty).sum::<Decimal>();
            canonical.cummulative_quote_qty += buffered.iter().map(|t| t.quote_qty).sum::<Decimal>();
            canonical.update_time = last.time;
        }

        Ok(canonical)
    }

    async fn fetch_order(&self, _symbol: &str, order_id: i64) -> Result<CanonicalOrder, GatewayError> {
        let mut builder = self.signed_builder("/0/private/QueryOrders");
        builder.add_kv("txid", order_id);
        let payload = builder.query().to_vec();
        let signature = self.sign(&payload);
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self
            .rest
            .post_signed(uri, Some(payload), &[("API-Sign", signature)], "fetchOrder")
            .await?;
        let body = self.parse_body(&response.content)?;
        let raw = body["result"][order_id.to_string()]
            .as_object()
            .ok_or_else(|| GatewayError::upstream("order not found"))?;
        parse_query_order(order_id, raw)
    }

    async fn cancel_order(&self, order: OrderCancelling) -> Result<CanonicalOrder, GatewayError> {
        let mut builder = self.signed_builder("/0/private/CancelOrder");
        builder.add_kv("txid", order.order_id);
        let payload = builder.query().to_vec();
        let signature = self.sign(&payload);
        let uri = builder.build_uri(&self.config.rest_host, true);
        self.rest
            .post_signed(uri, Some(payload), &[("API-Sign", signature)], "cancelOrder")
            .await?;

        if let Some(entry) = self.active_orders.lock().get_mut(&order.order_id) {
            entry.cancelled = true;
        }

        // No synchronous cancel confirmation; poll fetchOrder until CANCELED
        // (§4.5). The façade owns the STATUS_TIMEOUT budget and retries this.
        self.fetch_order(&order.symbol, order.order_id).await
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        let open = self.fetch_open_orders_for(symbol).await?;
        let mut builder = self.signed_builder("/0/private/CancelAll");
        let payload = builder.query().to_vec();
        let signature = self.sign(&payload);
        let uri = builder.build_uri(&self.config.rest_host, true);
        self.rest
            .post_signed(uri, Some(payload), &[("API-Sign", signature)], "cancelAllOrders")
            .await?;
        Ok(open)
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        self.fetch_open_orders_for(symbol).await
    }

    async fn fetch_account_information(&self) -> Result<Vec<Balance>, GatewayError> {
        let mut builder = self.signed_builder("/0/private/Balance");
        let payload = builder.query().to_vec();
        let signature = self.sign(&payload);
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self
            .rest
            .post_signed(uri, Some(payload), &[("API-Sign", signature)], "accountInformation")
            .await?;
        let body = self.parse_body(&response.content)?;
        let balances = body["result"]
            .as_object()
            .ok_or_else(|| GatewayError::upstream("missing balance result"))?;
        balances
            .iter()
            .map(|(asset, amount)| {
                let free = amount
                    .as_str()
                    .and_then(|v| Decimal::from_str(v).ok())
                    .ok_or_else(|| GatewayError::upstream("bad balance amount"))?;
                Ok(Balance {
                    asset: asset.clone(),
                    free,
                    locked: Decimal::ZERO,
                })
            })
            .collect()
    }

    async fn fetch_funding_wallet(
        &self,
        _asset: Option<&str>,
        _need_btc_valuation: bool,
    ) -> Result<Vec<Balance>, GatewayError> {
        self.fetch_account_information().await
    }

    async fn fetch_account_trade_list(
        &self,
        symbol: &str,
        start_time: Option<i64>,
        _limit: u32,
    ) -> Result<Vec<CanonicalTrade>, GatewayError> {
        let mut builder = self.signed_builder("/0/private/TradesHistory");
        if let Some(start_time) = start_time {
            builder.add_kv("start", start_time / 1000);
        }
        let payload = builder.query().to_vec();
        let signature = self.sign(&payload);
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self
            .rest
            .post_signed(uri, Some(payload), &[("API-Sign", signature)], "accountTradeList")
            .await?;
        let body = self.parse_body(&response.content)?;
        let trades = body["result"]["trades"]
            .as_object()
            .ok_or_else(|| GatewayError::upstream("missing trades result"))?;
        trades
            .iter()
            .filter(|(_, raw)| raw["pair"].as_str() == Some(symbol))
            .map(|(id, raw)| parse_trade(id, raw))
            .collect()
    }

    async fn fetch_symbol_price_ticker(&self, symbol: &str) -> Result<SymbolPriceTicker, GatewayError> {
        let stats = self.fetch_ticker_price_change_statistics(symbol).await?;
        Ok(SymbolPriceTicker {
            symbol: stats.symbol,
            price: stats.last_price,
        })
    }

    async fn fetch_ticker_price_change_statistics(
        &self,
        symbol: &str,
    ) -> Result<TickerStatistics, GatewayError> {
        let mut builder = UriBuilder::from_path("/0/public/Ticker");
        builder.add_kv("pair", symbol);
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self.rest.get(uri, "tickerPriceChangeStatistics").await?;
        let body = self.parse_body(&response.content)?;
        let raw = body["result"]
            .as_object()
            .and_then(|m| m.values().next())
            .ok_or_else(|| GatewayError::upstream("missing ticker result"))?;
        let last_price = raw["c"][0]
            .as_str()
            .and_then(|v| Decimal::from_str(v).ok())
            .ok_or_else(|| GatewayError::upstream("bad last price"))?;
        let open_price = raw["o"]
            .as_str()
            .and_then(|v| Decimal::from_str(v).ok())
            .unwrap_or(last_price);
        Ok(TickerStatistics {
            symbol: symbol.to_string(),
            price_change: last_price - open_price,
            price_change_percent: if open_price.is_zero() {
                Decimal::ZERO
            } else {
                (last_price - open_price) / open_price * Decimal::from(100)
            },
            last_price,
            open_price,
            high_price: raw["h"][1].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
            low_price: raw["l"][1].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
            volume: raw["v"][1].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
        })
    }
}

impl VenueB {
    async fn fetch_open_orders_for(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        let mut builder = self.signed_builder("/0/private/OpenOrders");
        let payload = builder.query().to_vec();
        let signature = self.sign(&payload);
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self
            .rest
            .post_signed(uri, Some(payload), &[("API-Sign", signature)], "fetchOpenOrders")
            .await?;
        let body = self.parse_body(&response.content)?;
        let open = body["result"]["open"]
            .as_object()
            .ok_or_else(|| GatewayError::upstream("missing open orders"))?;
        open.iter()
            .filter(|(_, raw)| raw["descr"]["pair"].as_str() == Some(symbol))
            .map(|(txid, raw)| {
                let order_id = txid.parse::<i64>().unwrap_or_default();
                parse_query_order(order_id, raw.as_object().expect("checked above"))
            })
            .collect()
    }
}

fn order_side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

fn order_type_str(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "market",
        _ => "limit",
    }
}

fn native_interval_minutes(interval: Interval) -> u64 {
    (interval.seconds() / 60).max(1)
}

fn parse_levels(raw: &Value) -> Result<Vec<(Decimal, Decimal)>, GatewayError> {
    raw.as_array()
        .ok_or_else(|| GatewayError::upstream("order book side was not an array"))?
        .iter()
        .take(5)
        .map(|level| {
            let level = level.as_array().ok_or_else(|| GatewayError::upstream("bad level"))?;
            let price = level
                .first()
                .and_then(|v| v.as_str())
                .and_then(|v| Decimal::from_str(v).ok())
                .ok_or_else(|| GatewayError::upstream("bad price"))?;
            let qty = level
                .get(1)
                .and_then(|v| v.as_str())
                .and_then(|v| Decimal::from_str(v).ok())
                .ok_or_else(|| GatewayError::upstream("bad qty"))?;
            Ok((price, qty))
        })
        .collect()
}

fn parse_asset_pair(native_symbol: &str, raw: &Value) -> Result<gateway_domain::Symbol, GatewayError> {
    use gateway_domain::symbol::{LotSize, MinNotional, PriceFilter, SymbolFilters, SymbolStatus};

    let pair_decimals = raw["pair_decimals"].as_u64().unwrap_or(5) as u32;
    let lot_decimals = raw["lot_decimals"].as_u64().unwrap_or(8) as u32;
    let tick_size = Decimal::new(1, pair_decimals);
    let step_size = Decimal::new(1, lot_decimals);

    Ok(gateway_domain::Symbol {
        symbol: from_native_symbol(native_symbol),
        base_asset: raw["base"].as_str().unwrap_or_default().to_string(),
        quote_asset: raw["quote"].as_str().unwrap_or_default().to_string(),
        base_asset_precision: lot_decimals,
        filters: SymbolFilters {
            price_filter: PriceFilter {
                min_price: Decimal::ZERO,
                max_price: Decimal::new(i64::MAX, 0),
                tick_size,
            },
            lot_size: LotSize {
                min_qty: Decimal::ZERO,
                max_qty: Decimal::new(i64::MAX, 0),
                step_size,
            },
            min_notional: MinNotional {
                min_notional: Decimal::ZERO,
                apply_to_market: false,
                avg_price_mins: 0,
            },
        },
        order_types: vec!["LIMIT".to_string(), "MARKET".to_string()],
        permissions: vec!["SPOT".to_string()],
        status: SymbolStatus::Trading,
    })
}

fn parse_ohlc_row(raw: &Value) -> Result<Candle, GatewayError> {
    let row = raw.as_array().ok_or_else(|| GatewayError::upstream("bad OHLC row"))?;
    let as_decimal = |idx: usize| -> Decimal {
        row.get(idx)
            .and_then(|v| v.as_str())
            .and_then(|v| Decimal::from_str(v).ok())
            .unwrap_or_default()
    };
    let open_time = row.first().and_then(|v| v.as_i64()).unwrap_or_default() * 1000;
    Ok(Candle {
        open_time,
        open: as_decimal(1),
        high: as_decimal(2),
        low: as_decimal(3),
        close: as_decimal(4),
        volume: as_decimal(6),
        close_time: open_time,
        quote_volume: Decimal::ZERO,
        num_trades: row.get(7).and_then(|v| v.as_i64()).unwrap_or_default(),
        taker_buy_base_volume: Decimal::ZERO,
        taker_buy_quote_volume: Decimal::ZERO,
    })
}

fn parse_add_order_response(raw: &Value, order: &NewOrder) -> Result<CanonicalOrder, GatewayError> {
    let txid = raw["result"]["txid"][0]
        .as_str()
        .ok_or_else(|| GatewayError::upstream("missing txid"))?;
    let order_id = txid
        .bytes()
        .fold(0i64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as i64))
        .abs();

    let orig_qty = order.qty.unwrap_or_default();
    let price = order.price.unwrap_or_default();
    Ok(CanonicalOrder {
        symbol: order.symbol.clone(),
        order_id,
        order_list_id: CanonicalOrder::NO_ORDER_LIST,
        client_order_id: order.client_order_id.clone().unwrap_or_default(),
        price,
        orig_qty,
        executed_qty: Decimal::ZERO,
        cummulative_quote_qty: Decimal::ZERO,
        status: OrderStatus::New,
        time_in_force: TimeInForce::Gtc,
        order_type: order.order_type,
        side: order.side,
        stop_price: order.stop_price,
        iceberg_qty: None,
        time: get_current_milliseconds() as i64,
        update_time: get_current_milliseconds() as i64,
        is_working: true,
        orig_quote_order_qty: CanonicalOrder::derive_orig_quote_order_qty(orig_qty, price),
    })
}

fn parse_query_order(
    order_id: i64,
    raw: &serde_json::Map<String, Value>,
) -> Result<CanonicalOrder, GatewayError> {
    let descr = &raw["descr"];
    let orig_qty = raw["vol"]
        .as_str()
        .and_then(|v| Decimal::from_str(v).ok())
        .unwrap_or_default();
    let executed_qty = raw["vol_exec"]
        .as_str()
        .and_then(|v| Decimal::from_str(v).ok())
        .unwrap_or_default();
    let price = descr["price"]
        .as_str()
        .and_then(|v| Decimal::from_str(v).ok())
        .unwrap_or_default();
    let status = match raw["status"].as_str() {
        Some("canceled") | Some("expired") => OrderStatus::Canceled,
        Some("closed") if executed_qty < orig_qty => OrderStatus::PartiallyFilled,
        Some("closed") => OrderStatus::Filled,
        _ => OrderStatus::New,
    };

    Ok(CanonicalOrder {
        symbol: descr["pair"].as_str().unwrap_or_default().to_string(),
        order_id,
        order_list_id: CanonicalOrder::NO_ORDER_LIST,
        client_order_id: String::new(),
        price,
        orig_qty,
        executed_qty,
        cummulative_quote_qty: raw["cost"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
        status,
        time_in_force: TimeInForce::Gtc,
        order_type: if descr["ordertype"].as_str() == Some("market") {
            OrderType::Market
        } else {
            OrderType::Limit
        },
        side: if descr["type"].as_str() == Some("sell") {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        },
        stop_price: None,
        iceberg_qty: None,
        time: (raw["opentm"].as_f64().unwrap_or_default() * 1000.0) as i64,
        update_time: (raw["opentm"].as_f64().unwrap_or_default() * 1000.0) as i64,
        is_working: status == OrderStatus::New,
        orig_quote_order_qty: CanonicalOrder::derive_orig_quote_order_qty(orig_qty, price),
    })
}

fn parse_trade(id: &str, raw: &Value) -> Result<CanonicalTrade, GatewayError> {
    let order_id = raw["ordertxid"]
        .as_str()
        .map(|s| s.bytes().fold(0i64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as i64)).abs())
        .unwrap_or_default();
    Ok(CanonicalTrade::new(
        raw["pair"].as_str().unwrap_or_default().to_string(),
        id.bytes().fold(0i64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as i64)).abs(),
        order_id,
        raw["price"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
        raw["vol"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
        raw["fee"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
        String::new(),
        (raw["time"].as_f64().unwrap_or_default() * 1000.0) as i64,
        raw["type"].as_str() == Some("buy"),
        raw["ordertype"].as_str() == Some("limit"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_symbol_round_trips_through_slash_form() {
        assert_eq!(from_native_symbol("XBT/USD"), "XBTUSD");
        assert_eq!(to_native_symbol("XBT/USD"), Some("XBT/USD".to_string()));
    }

    #[test]
    fn buffered_trade_is_drained_exactly_once() {
        let config = VenueBConfig {
            rest_host: "https://example.invalid".to_string(),
            api_key: "key".into(),
            api_secret: b"secret".to_vec(),
        };
        let venue = VenueB::new(config);
        let trade = CanonicalTrade::new(
            "XBTUSD".into(),
            1,
            42,
            Decimal::from(100),
            Decimal::from(1),
            Decimal::ZERO,
            "USD".into(),
            0,
            true,
            true,
        );
        venue.buffer_trade_frame(42, trade);
        let drained = venue.drain_buffered_trades(42);
        assert_eq!(drained.len(), 1);
        assert!(venue.drain_buffered_trades(42).is_empty());
    }
}
