//! Venue C adapter. Symbol form is `t<BASE><QUOTE>` when both assets are
//! ≤3 characters, else `t<BASE>:<QUOTE>` (§4.2). Auth signs
//! `"<nonce>websocket_login"` (WSS) or the request path+nonce (REST) with
//! HMAC-SHA384 hex (§4.1). `load()` additionally resolves and caches the
//! spot-account id (§4.5). `createOrder` has no synchronous confirmation, so
//! it polls `fetchOrder` until the order becomes visible or `STATUS_TIMEOUT`
//! elapses (§4.5).

use async_trait::async_trait;
use gateway_domain::{
    Balance, CanonicalOrder, CanonicalTrade, Candle, GatewayError, Interval, OrderCancelling,
    OrderSide, OrderStatus, OrderType, TimeInForce, VenueTag,
};
use gateway_utils::time::get_current_milliseconds;
use hyper::http::request::Builder;
use hyper::Uri;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

use crate::rest::{ErrorHandlerEmpty, RequestMethod, RestClient, RestHeaders, UriBuilder};
use crate::signer;
use crate::venues::{LoadedVenueInfo, NewOrder, OrderBookTop, SymbolPriceTicker, TickerStatistics, VenueClient};

/// §5: 5-second bound on post-create/post-cancel polling loops.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Venue C hardcodes these in its exchangeInfo response; whether they ever
/// need to track venue-side changes is an open question (§9).
pub const BASE_COMMISSION_PRECISION: u32 = 8;
pub const QUOTE_COMMISSION_PRECISION: u32 = 8;

pub struct VenueCConfig {
    pub rest_host: String,
    pub api_key: String,
    pub api_secret: Vec<u8>,
}

pub struct VenueCHeaders {
    pub api_key: String,
}

impl RestHeaders for VenueCHeaders {
    fn add_specific_headers(&self, builder: Builder, _uri: &Uri, _method: RequestMethod) -> Builder {
        builder.header("bfx-apikey", &self.api_key)
    }
}

pub struct VenueC {
    config: VenueCConfig,
    rest: RestClient<ErrorHandlerEmpty, VenueCHeaders>,
}

/// `t<BASE><QUOTE>` if both assets are ≤3 chars, else `t<BASE>:<QUOTE>` (§4.2).
pub fn to_native_symbol(base: &str, quote: &str) -> String {
    if base.len() <= 3 && quote.len() <= 3 {
        format!("t{base}{quote}")
    } else {
        format!("t{base}:{quote}")
    }
}

pub fn from_native_symbol(native: &str) -> Option<(String, String)> {
    let body = native.strip_prefix('t')?;
    if let Some((base, quote)) = body.split_once(':') {
        Some((base.to_string(), quote.to_string()))
    } else if body.len() == 6 {
        Some((body[..3].to_string(), body[3..].to_string()))
    } else {
        None
    }
}

impl VenueC {
    pub fn new(config: VenueCConfig) -> Self {
        let rest = RestClient::new(
            "venue_c",
            false,
            ErrorHandlerEmpty,
            VenueCHeaders {
                api_key: config.api_key.clone(),
            },
        );
        Self { config, rest }
    }

    fn sign_payload(&self, path: &str, nonce: i64, body: &str) -> String {
        let payload = format!("/api/{path}{nonce}{body}");
        signer::sign(VenueTag::VenueC, &self.config.api_secret, payload.as_bytes())
    }

    async fn signed_post(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        let nonce = get_current_milliseconds() as i64;
        let body_str = body.to_string();
        let signature = self.sign_payload(path, nonce, &body_str);
        let uri = UriBuilder::from_path(path).build_uri(&self.config.rest_host, false);
        let response = self
            .rest
            .post_signed(
                uri,
                Some(body_str.into_bytes()),
                &[("bfx-signature", signature), ("bfx-nonce", nonce.to_string())],
                "venueCSignedPost",
            )
            .await?;
        self.parse_body(&response.content)
    }

    fn parse_body(&self, body: &str) -> Result<Value, GatewayError> {
        serde_json::from_str(body)
            .map_err(|e| GatewayError::upstream(format!("invalid JSON from venue C: {e}")))
    }

    /// Polls `fetchOrder` until the order id becomes visible or
    /// `STATUS_TIMEOUT` elapses (§4.5 createOrder at venue C).
    async fn poll_until_visible(&self, symbol: &str, order_id: i64) -> Result<CanonicalOrder, GatewayError> {
        let deadline = tokio::time::Instant::now() + STATUS_TIMEOUT;
        loop {
            match self.fetch_order(symbol, order_id).await {
                Ok(order) => return Ok(order),
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl VenueClient for VenueC {
    fn venue_tag(&self) -> VenueTag {
        VenueTag::VenueC
    }

    async fn load(&self) -> Result<LoadedVenueInfo, GatewayError> {
        let uri = UriBuilder::from_path("/v2/conf/pub:info:pair")
            .build_uri(&self.config.rest_host, false);
        let response = self.rest.get(uri, "exchangeInfo").await?;
        let body = self.parse_body(&response.content)?;

        let mut symbols = std::collections::HashMap::new();
        if let Some(rows) = body.as_array().and_then(|v| v.first()).and_then(|v| v.as_array()) {
            for row in rows {
                if let Some(pair) = row.as_array().and_then(|r| r.first()).and_then(|v| v.as_str()) {
                    if let Some((base, quote)) = from_native_symbol(&format!("t{pair}")) {
                        let symbol = synthesize_symbol(&base, &quote);
                        symbols.insert(symbol.symbol.clone(), symbol);
                    }
                }
            }
        }

        let account_id = self.resolve_spot_account_id().await?;

        Ok(LoadedVenueInfo {
            symbols,
            highest_precision: BASE_COMMISSION_PRECISION.max(8),
            spot_account_id: Some(account_id),
        })
    }

    async fn fetch_server_time(&self) -> Result<i64, GatewayError> {
        Ok(get_current_milliseconds() as i64)
    }

    async fn fetch_order_book(&self, symbol: &str, limit: u32) -> Result<OrderBookTop, GatewayError> {
        const ALLOWED: [u32; 4] = [1, 25, 100, 250];
        if !ALLOWED.contains(&limit) {
            return Err(GatewayError::validation(format!(
                "limit {limit} is not one of venue C's allowed depths"
            )));
        }
        let path = format!("/v2/book/{symbol}/P0");
        let mut builder = UriBuilder::from_path(&path);
        builder.add_kv("len", limit);
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self.rest.get(uri, "orderBook").await?;
        let body = self.parse_body(&response.content)?;
        parse_book_rows(&body)
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Candle>, GatewayError> {
        const ALLOWED: [Interval; 6] = [
            Interval::OneMinute,
            Interval::FiveMinutes,
            Interval::FifteenMinutes,
            Interval::OneHour,
            Interval::OneDay,
            Interval::OneWeek,
        ];
        if !ALLOWED.contains(&interval) {
            return Err(GatewayError::validation(
                "interval is not in venue C's further allow-list",
            ));
        }

        let path = format!("/v2/candles/trade:{}:{symbol}/hist", native_interval_str(interval));
        let mut builder = UriBuilder::from_path(&path);
        builder.add_kv("limit", limit);
        if let Some(start) = start {
            builder.add_kv("start", start);
        }
        if let Some(end) = end {
            builder.add_kv("end", end);
        }
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self.rest.get(uri, "klines").await?;
        let body = self.parse_body(&response.content)?;
        body.as_array()
            .ok_or_else(|| GatewayError::upstream("candles response was not an array"))?
            .iter()
            .map(parse_candle_row)
            .collect()
    }

    async fn create_order(&self, order: NewOrder) -> Result<CanonicalOrder, GatewayError> {
        let amount = match order.side {
            OrderSide::Buy => order.qty.unwrap_or_default(),
            OrderSide::Sell => -order.qty.unwrap_or_default(),
        };
        let body = serde_json::json!({
            "type": native_order_type(order.order_type),
            "symbol": order.symbol,
            "amount": amount.to_string(),
            "price": order.price.map(|p| p.to_string()).unwrap_or_default(),
        });
        let response = self.signed_post("/v2/auth/w/order/submit", body).await?;
        let order_id = response[4][0][0]
            .as_i64()
            .ok_or_else(|| GatewayError::upstream("missing order id in submit response"))?;

        self.poll_until_visible(&order.symbol, order_id).await
    }

    async fn fetch_order(&self, _symbol: &str, order_id: i64) -> Result<CanonicalOrder, GatewayError> {
        // History endpoint first, live endpoint second (§4.5 fetchOrder at venue C).
        let history = self
            .signed_post(
                "/v2/auth/r/orders/hist",
                serde_json::json!({ "id": [order_id] }),
            )
            .await?;
        if let Some(row) = history.as_array().and_then(|rows| rows.first()) {
            return parse_order_row(row);
        }

        let live = self.signed_post("/v2/auth/r/orders", serde_json::json!({ "id": [order_id] })).await?;
        let row = live
            .as_array()
            .and_then(|rows| rows.first())
            .ok_or_else(|| GatewayError::upstream("order not found in history or live endpoint"))?;
        parse_order_row(row)
    }

    async fn cancel_order(&self, order: OrderCancelling) -> Result<CanonicalOrder, GatewayError> {
        self.signed_post(
            "/v2/auth/w/order/cancel",
            serde_json::json!({ "id": order.order_id }),
        )
        .await?;

        let deadline = tokio::time::Instant::now() + STATUS_TIMEOUT;
        loop {
            let fetched = self.fetch_order(&order.symbol, order.order_id).await?;
            if fetched.status == OrderStatus::Canceled {
                return Ok(fetched);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(GatewayError::upstream("cancel not confirmed within STATUS_TIMEOUT"));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        let open_orders = self.fetch_open_orders_for(symbol).await?;

        let ids: Vec<i64> = open_orders.iter().map(|o| o.order_id).collect();
        self.signed_post("/v2/auth/w/order/cancel/multi", serde_json::json!({ "id": ids }))
            .await?;

        Ok(open_orders)
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        self.fetch_open_orders_for(symbol).await
    }

    async fn fetch_account_information(&self) -> Result<Vec<Balance>, GatewayError> {
        let body = self.signed_post("/v2/auth/r/wallets", serde_json::json!({})).await?;
        body.as_array()
            .ok_or_else(|| GatewayError::upstream("wallets response was not an array"))?
            .iter()
            .filter(|row| row[0].as_str() == Some("exchange"))
            .map(|row| {
                Ok(Balance {
                    asset: row[1].as_str().unwrap_or_default().to_string(),
                    free: row[4].as_f64().map(decimal_from_f64).unwrap_or_default(),
                    locked: Decimal::ZERO,
                })
            })
            .collect()
    }

    async fn fetch_funding_wallet(
        &self,
        asset: Option<&str>,
        _need_btc_valuation: bool,
    ) -> Result<Vec<Balance>, GatewayError> {
        let body = self.signed_post("/v2/auth/r/wallets", serde_json::json!({})).await?;
        body.as_array()
            .ok_or_else(|| GatewayError::upstream("wallets response was not an array"))?
            .iter()
            .filter(|row| row[0].as_str() == Some("funding"))
            .filter(|row| asset.map(|a| row[1].as_str() == Some(a)).unwrap_or(true))
            .map(|row| {
                Ok(Balance {
                    asset: row[1].as_str().unwrap_or_default().to_string(),
                    free: row[4].as_f64().map(decimal_from_f64).unwrap_or_default(),
                    locked: Decimal::ZERO,
                })
            })
            .collect()
    }

    async fn fetch_account_trade_list(
        &self,
        symbol: &str,
        start_time: Option<i64>,
        limit: u32,
    ) -> Result<Vec<CanonicalTrade>, GatewayError> {
        let path = format!("/v2/auth/r/trades/{symbol}/hist");
        let mut body = serde_json::json!({ "limit": limit });
        if let Some(start_time) = start_time {
            body["start"] = serde_json::json!(start_time);
        }
        let response = self.signed_post(&path, body).await?;
        response
            .as_array()
            .ok_or_else(|| GatewayError::upstream("trades response was not an array"))?
            .iter()
            .map(|row| parse_trade_row(symbol, row))
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
        let path = format!("/v2/ticker/{symbol}");
        let uri = UriBuilder::from_path(&path).build_uri(&self.config.rest_host, false);
        let response = self.rest.get(uri, "tickerPriceChangeStatistics").await?;
        let body = self.parse_body(&response.content)?;
        let row = body
            .as_array()
            .ok_or_else(|| GatewayError::upstream("ticker response was not an array"))?;
        let f = |idx: usize| row.get(idx).and_then(|v| v.as_f64()).map(decimal_from_f64).unwrap_or_default();
        Ok(TickerStatistics {
            symbol: symbol.to_string(),
            price_change: f(4),
            price_change_percent: f(5) * Decimal::from(100),
            last_price: f(6),
            open_price: f(6) - f(4),
            high_price: f(8),
            low_price: f(9),
            volume: f(7),
        })
    }
}

impl VenueC {
    async fn resolve_spot_account_id(&self) -> Result<String, GatewayError> {
        let body = self.signed_post("/v2/auth/r/info/user", serde_json::json!({})).await?;
        body[0]
            .as_i64()
            .map(|id| id.to_string())
            .ok_or_else(|| GatewayError::upstream("missing account id in user info response"))
    }

    async fn fetch_open_orders_for(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        let open = self
            .signed_post("/v2/auth/r/orders", serde_json::json!({}))
            .await?;
        open.as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .filter(|row| row[3].as_str() == Some(symbol))
            .map(parse_order_row)
            .collect()
    }
}

fn decimal_from_f64(value: f64) -> Decimal {
    Decimal::from_str(&format!("{value}")).unwrap_or_default()
}

fn native_order_type(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "EXCHANGE MARKET",
        _ => "EXCHANGE LIMIT",
    }
}

fn native_interval_str(interval: Interval) -> &'static str {
    match interval {
        Interval::OneMinute => "1m",
        Interval::FiveMinutes => "5m",
        Interval::FifteenMinutes => "15m",
        Interval::OneHour => "1h",
        Interval::OneDay => "1D",
        Interval::OneWeek => "7D",
        _ => "1h",
    }
}

fn synthesize_symbol(base: &str, quote: &str) -> gateway_domain::Symbol {
    use gateway_domain::symbol::{LotSize, MinNotional, PriceFilter, SymbolFilters, SymbolStatus};
    gateway_domain::Symbol {
        symbol: format!("{base}{quote}"),
        base_asset: base.to_string(),
        quote_asset: quote.to_string(),
        base_asset_precision: BASE_COMMISSION_PRECISION,
        filters: SymbolFilters {
            price_filter: PriceFilter {
                min_price: Decimal::ZERO,
                max_price: Decimal::new(i64::MAX, 0),
                tick_size: Decimal::new(1, 5),
            },
            lot_size: LotSize {
                min_qty: Decimal::ZERO,
                max_qty: Decimal::new(i64::MAX, 0),
                step_size: Decimal::new(1, 8),
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
    }
}

fn parse_book_rows(body: &Value) -> Result<OrderBookTop, GatewayError> {
    let rows = body.as_array().ok_or_else(|| GatewayError::upstream("order book was not an array"))?;
    let mut bids = Vec::new();
    let mut asks = Vec::new();
    for row in rows {
        let price = row[0].as_f64().map(decimal_from_f64).unwrap_or_default();
        let count = row[1].as_i64().unwrap_or_default();
        let amount = row[2].as_f64().map(decimal_from_f64).unwrap_or_default();
        if count == 0 {
            continue;
        }
        if amount > Decimal::ZERO {
            bids.push((price, amount));
        } else {
            asks.push((price, -amount));
        }
    }
    bids.sort_by(|a, b| b.0.cmp(&a.0));
    asks.sort_by(|a, b| a.0.cmp(&b.0));
    bids.truncate(5);
    asks.truncate(5);
    Ok(OrderBookTop {
        last_update_id: get_current_milliseconds() as i64,
        bids,
        asks,
    })
}

fn parse_candle_row(raw: &Value) -> Result<Candle, GatewayError> {
    let row = raw.as_array().ok_or_else(|| GatewayError::upstream("bad candle row"))?;
    let f = |idx: usize| row.get(idx).and_then(|v| v.as_f64()).map(decimal_from_f64).unwrap_or_default();
    let open_time = row.first().and_then(|v| v.as_i64()).unwrap_or_default();
    Ok(Candle {
        open_time,
        open: f(1),
        close: f(2),
        high: f(3),
        low: f(4),
        volume: f(5),
        close_time: open_time,
        quote_volume: Decimal::ZERO,
        num_trades: 0,
        taker_buy_base_volume: Decimal::ZERO,
        taker_buy_quote_volume: Decimal::ZERO,
    })
}

fn parse_order_row(row: &Value) -> Result<CanonicalOrder, GatewayError> {
    let orig_qty = row[7].as_f64().map(decimal_from_f64).unwrap_or_default().abs();
    let remaining = row[6].as_f64().map(decimal_from_f64).unwrap_or_default().abs();
    let executed_qty = orig_qty - remaining;
    let status_str = row[13].as_str().unwrap_or("ACTIVE");
    let status = if status_str.starts_with("EXECUTED") {
        OrderStatus::Filled
    } else if status_str.starts_with("PARTIALLY FILLED") {
        OrderStatus::PartiallyFilled
    } else if status_str.starts_with("CANCELED") {
        OrderStatus::Canceled
    } else {
        OrderStatus::New
    };
    let price = row[16].as_f64().map(decimal_from_f64).unwrap_or_default();

    Ok(CanonicalOrder {
        symbol: row[3].as_str().unwrap_or_default().to_string(),
        order_id: row[0].as_i64().unwrap_or_default(),
        order_list_id: CanonicalOrder::NO_ORDER_LIST,
        client_order_id: row[2].as_i64().map(|v| v.to_string()).unwrap_or_default(),
        price,
        orig_qty,
        executed_qty,
        cummulative_quote_qty: executed_qty * price,
        status,
        time_in_force: TimeInForce::Gtc,
        order_type: if row[8].as_str().unwrap_or_default().contains("MARKET") {
            OrderType::Market
        } else {
            OrderType::Limit
        },
        side: if row[7].as_f64().unwrap_or_default() >= 0.0 {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        },
        stop_price: None,
        iceberg_qty: None,
        time: row[4].as_i64().unwrap_or_default(),
        update_time: row[5].as_i64().unwrap_or_default(),
        is_working: status == OrderStatus::New || status == OrderStatus::PartiallyFilled,
        orig_quote_order_qty: CanonicalOrder::derive_orig_quote_order_qty(orig_qty, price),
    })
}

fn parse_trade_row(symbol: &str, row: &Value) -> Result<CanonicalTrade, GatewayError> {
    let qty = row[4].as_f64().map(decimal_from_f64).unwrap_or_default();
    Ok(CanonicalTrade::new(
        symbol.to_string(),
        row[0].as_i64().unwrap_or_default(),
        row[3].as_i64().unwrap_or_default(),
        row[5].as_f64().map(decimal_from_f64).unwrap_or_default(),
        qty.abs(),
        row[9].as_f64().map(decimal_from_f64).unwrap_or_default().abs(),
        row[10].as_str().unwrap_or_default().to_string(),
        row[2].as_i64().unwrap_or_default(),
        qty > Decimal::ZERO,
        row[8].as_i64().unwrap_or_default() == 1,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_symbol_uses_colon_form_for_long_assets() {
        assert_eq!(to_native_symbol("BTC", "USDT"), "tBTC:USDT");
        assert_eq!(to_native_symbol("BTC", "USD"), "tBTCUSD");
    }

    #[test]
    fn native_symbol_round_trips() {
        let (base, quote) = from_native_symbol("tBTCUSD").unwrap();
        assert_eq!((base.as_str(), quote.as_str()), ("BTC", "USD"));
        let (base, quote) = from_native_symbol("tBTC:USDT").unwrap();
        assert_eq!((base.as_str(), quote.as_str()), ("BTC", "USDT"));
    }

    #[test]
    fn order_book_delta_separates_bids_and_asks_by_amount_sign() {
        let raw = serde_json::json!([
            [100.0, 1, 1.5],
            [99.0, 1, 2.0],
            [101.0, 1, -1.0],
            [102.0, 0, 0.0],
        ]);
        let top = parse_book_rows(&raw).unwrap();
        assert_eq!(top.bids.len(), 2);
        assert_eq!(top.asks.len(), 1);
        assert_eq!(top.bids[0].0, Decimal::from(100));
    }
}
