//! Venue D adapter. Signs a canonical `method + path + query + body +
//! timestamp` string per its signed-request spec, HMAC-SHA256 hex (§4.1,
//! §4.6). `createOrder` retries up to 10 times on `RateLimitReached` with
//! `sleep = uniform(0.1,0.3)·attempt` (§4.5). Order-book checksums are
//! verified by the WSS decode loop (§4.6); this module only reconstructs and
//! exposes the checksum so that loop can compare against the venue's value.

use async_trait::async_trait;
use gateway_domain::{
    Balance, CanonicalOrder, CanonicalTrade, Candle, GatewayError, GatewayErrorKind, Interval,
    OrderCancelling, OrderSide, OrderStatus, OrderType, TimeInForce, VenueTag,
};
use gateway_utils::time::get_current_milliseconds;
use hyper::http::request::Builder;
use hyper::Uri;
use rand::Rng;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

use crate::rest::{ErrorHandlerEmpty, RequestMethod, RestClient, RestHeaders, UriBuilder};
use crate::signer;
use crate::venues::{LoadedVenueInfo, NewOrder, OrderBookTop, SymbolPriceTicker, TickerStatistics, VenueClient};

/// §4.5: venue D retries `createOrder` on `RateLimitReached` up to this many
/// times, sleeping `uniform(0.1,0.3)·attempt` seconds between attempts.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 10;

pub struct VenueDConfig {
    pub rest_host: String,
    pub api_key: String,
    pub api_secret: Vec<u8>,
    pub passphrase: String,
}

pub struct VenueDHeaders {
    pub api_key: String,
    pub passphrase: String,
}

impl RestHeaders for VenueDHeaders {
    fn add_specific_headers(&self, builder: Builder, _uri: &Uri, _method: RequestMethod) -> Builder {
        builder
            .header("OK-ACCESS-KEY", &self.api_key)
            .header("OK-ACCESS-PASSPHRASE", &self.passphrase)
    }
}

pub struct VenueD {
    config: VenueDConfig,
    rest: RestClient<ErrorHandlerEmpty, VenueDHeaders>,
}

impl VenueD {
    pub fn new(config: VenueDConfig) -> Self {
        let rest = RestClient::new(
            "venue_d",
            false,
            ErrorHandlerEmpty,
            VenueDHeaders {
                api_key: config.api_key.clone(),
                passphrase: config.passphrase.clone(),
            },
        );
        Self { config, rest }
    }

    /// Canonical signed-request string: `method + path + query + body +
    /// timestamp`, HMAC-SHA256 hex (§4.1).
    fn sign(&self, method: &str, path_and_query: &str, body: &str, timestamp: &str) -> String {
        let payload = format!("{timestamp}{method}{path_and_query}{body}");
        signer::sign(VenueTag::VenueD, &self.config.api_secret, payload.as_bytes())
    }

    fn parse_body(&self, body: &str) -> Result<Value, GatewayError> {
        serde_json::from_str(body)
            .map_err(|e| GatewayError::upstream(format!("invalid JSON from venue D: {e}")))
    }

    async fn get(&self, path: &str, action_name: &'static str) -> Result<Value, GatewayError> {
        let timestamp = get_current_milliseconds().to_string();
        let signature = self.sign("GET", path, "", &timestamp);
        let uri = UriBuilder::from_path(path).build_uri(&self.config.rest_host, false);
        let response = self
            .rest
            .get_signed(
                uri,
                &[("OK-ACCESS-SIGN", signature), ("OK-ACCESS-TIMESTAMP", timestamp)],
                action_name,
            )
            .await?;
        self.parse_body(&response.content)
    }

    async fn post(&self, path: &str, body: Value, action_name: &'static str) -> Result<Value, GatewayError> {
        let timestamp = get_current_milliseconds().to_string();
        let body_str = body.to_string();
        let signature = self.sign("POST", path, &body_str, &timestamp);
        let uri = UriBuilder::from_path(path).build_uri(&self.config.rest_host, false);
        let response = self
            .rest
            .post_signed(
                uri,
                Some(body_str.into_bytes()),
                &[("OK-ACCESS-SIGN", signature), ("OK-ACCESS-TIMESTAMP", timestamp)],
                action_name,
            )
            .await?;
        self.parse_body(&response.content)
    }

    async fn fetch_open_orders_raw(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        let path = format!("/api/v5/trade/orders-pending?instId={symbol}");
        let body = self.get(&path, "fetchOpenOrders").await?;
        body["data"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .map(parse_order_row)
            .collect()
    }

    /// §4.5: retries `createOrder` up to `MAX_RATE_LIMIT_RETRIES` times on
    /// `RateLimited`, sleeping `uniform(0.1,0.3)·attempt` between attempts.
    async fn post_with_rate_limit_retry(
        &self,
        path: &str,
        body: Value,
        action_name: &'static str,
    ) -> Result<Value, GatewayError> {
        let mut attempt = 0u32;
        loop {
            match self.post(path, body.clone(), action_name).await {
                Ok(value) => return Ok(value),
                Err(e) if e.kind == GatewayErrorKind::RateLimited && attempt < MAX_RATE_LIMIT_RETRIES => {
                    attempt += 1;
                    let jitter: f64 = rand::thread_rng().gen_range(0.1..0.3);
                    tokio::time::sleep(Duration::from_secs_f64(jitter * attempt as f64)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl VenueClient for VenueD {
    fn venue_tag(&self) -> VenueTag {
        VenueTag::VenueD
    }

    async fn load(&self) -> Result<LoadedVenueInfo, GatewayError> {
        let body = self.get("/api/v5/public/instruments?instType=SPOT", "exchangeInfo").await?;
        let rows = body["data"]
            .as_array()
            .ok_or_else(|| GatewayError::upstream("missing instruments data"))?;

        let mut symbols = std::collections::HashMap::new();
        let mut highest_precision = 8u32;
        for row in rows {
            let symbol = parse_instrument(row)?;
            highest_precision = highest_precision.max(symbol.base_asset_precision);
            symbols.insert(symbol.symbol.clone(), symbol);
        }

        Ok(LoadedVenueInfo {
            symbols,
            highest_precision,
            spot_account_id: None,
        })
    }

    async fn fetch_server_time(&self) -> Result<i64, GatewayError> {
        let body = self.get("/api/v5/public/time", "serverTime").await?;
        body["data"][0]["ts"]
            .as_str()
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| GatewayError::upstream("missing ts"))
    }

    async fn fetch_order_book(&self, symbol: &str, limit: u32) -> Result<OrderBookTop, GatewayError> {
        const ALLOWED: [u32; 3] = [1, 5, 400];
        if !ALLOWED.contains(&limit) {
            return Err(GatewayError::validation(format!(
                "limit {limit} is not one of venue D's allowed depths"
            )));
        }
        let path = format!("/api/v5/market/books?instId={symbol}&sz={limit}");
        let body = self.get(&path, "orderBook").await?;
        let row = body["data"]
            .as_array()
            .and_then(|rows| rows.first())
            .ok_or_else(|| GatewayError::upstream("missing order book data"))?;
        Ok(OrderBookTop {
            last_update_id: row["ts"].as_str().and_then(|v| v.parse().ok()).unwrap_or_default(),
            bids: parse_levels(&row["bids"])?,
            asks: parse_levels(&row["asks"])?,
        })
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Candle>, GatewayError> {
        let mut path = format!(
            "/api/v5/market/candles?instId={symbol}&bar={}&limit={limit}",
            native_interval_str(interval)
        );
        if let Some(start) = start {
            path.push_str(&format!("&before={start}"));
        }
        if let Some(end) = end {
            path.push_str(&format!("&after={end}"));
        }
        let body = self.get(&path, "klines").await?;
        body["data"]
            .as_array()
            .ok_or_else(|| GatewayError::upstream("missing candle data"))?
            .iter()
            .map(parse_candle_row)
            .collect()
    }

    async fn create_order(&self, order: NewOrder) -> Result<CanonicalOrder, GatewayError> {
        let body = serde_json::json!({
            "instId": order.symbol,
            "tdMode": "cash",
            "side": order_side_str(order.side),
            "ordType": order_type_str(order.order_type),
            "sz": order.qty.map(|q| q.to_string()),
            "px": order.price.map(|p| p.to_string()),
        });
        let response = self
            .post_with_rate_limit_retry("/api/v5/trade/order", body, "createOrder")
            .await?;
        let row = response["data"][0]
            .as_object()
            .ok_or_else(|| GatewayError::upstream("missing order data in submit response"))?;
        let order_id = row["ordId"]
            .as_str()
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| GatewayError::upstream("missing ordId"))?;

        self.fetch_order(&order.symbol, order_id).await
    }

    async fn fetch_order(&self, symbol: &str, order_id: i64) -> Result<CanonicalOrder, GatewayError> {
        let path = format!("/api/v5/trade/order?instId={symbol}&ordId={order_id}");
        let body = self.get(&path, "fetchOrder").await?;
        let row = body["data"]
            .as_array()
            .and_then(|rows| rows.first())
            .ok_or_else(|| GatewayError::upstream("order not found"))?;
        parse_order_row(row)
    }

    async fn cancel_order(&self, order: OrderCancelling) -> Result<CanonicalOrder, GatewayError> {
        self.post(
            "/api/v5/trade/cancel-order",
            serde_json::json!({ "instId": order.symbol, "ordId": order.order_id.to_string() }),
            "cancelOrder",
        )
        .await?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
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
        let open = self.fetch_open_orders_raw(symbol).await?;

        let batch: Vec<Value> = open
            .iter()
            .map(|o| serde_json::json!({ "instId": symbol, "ordId": o.order_id.to_string() }))
            .collect();
        self.post(
            "/api/v5/trade/cancel-batch-orders",
            serde_json::Value::Array(batch),
            "cancelAllOrders",
        )
        .await?;

        Ok(open)
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        self.fetch_open_orders_raw(symbol).await
    }

    async fn fetch_account_information(&self) -> Result<Vec<Balance>, GatewayError> {
        let body = self.get("/api/v5/account/balance", "accountInformation").await?;
        let details = body["data"][0]["details"]
            .as_array()
            .ok_or_else(|| GatewayError::upstream("missing balance details"))?;
        details
            .iter()
            .map(|row| {
                Ok(Balance {
                    asset: row["ccy"].as_str().unwrap_or_default().to_string(),
                    free: row["availBal"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
                    locked: row["frozenBal"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn fetch_funding_wallet(
        &self,
        asset: Option<&str>,
        _need_btc_valuation: bool,
    ) -> Result<Vec<Balance>, GatewayError> {
        let mut path = "/api/v5/asset/balances".to_string();
        if let Some(asset) = asset {
            path.push_str(&format!("?ccy={asset}"));
        }
        let body = self.get(&path, "fundingWallet").await?;
        body["data"]
            .as_array()
            .ok_or_else(|| GatewayError::upstream("missing funding balances"))?
            .iter()
            .map(|row| {
                Ok(Balance {
                    asset: row["ccy"].as_str().unwrap_or_default().to_string(),
                    free: row["availBal"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
                    locked: row["frozenBal"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
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
        let mut path = format!("/api/v5/trade/fills?instId={symbol}&limit={limit}");
        if let Some(start_time) = start_time {
            path.push_str(&format!("&begin={start_time}"));
        }
        let body = self.get(&path, "accountTradeList").await?;
        body["data"]
            .as_array()
            .ok_or_else(|| GatewayError::upstream("missing fills data"))?
            .iter()
            .map(parse_trade_row)
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
        let path = format!("/api/v5/market/ticker?instId={symbol}");
        let body = self.get(&path, "tickerPriceChangeStatistics").await?;
        let row = body["data"][0]
            .as_object()
            .ok_or_else(|| GatewayError::upstream("missing ticker data"))?;
        let dec = |key: &str| {
            row.get(key)
                .and_then(|v| v.as_str())
                .and_then(|v| Decimal::from_str(v).ok())
                .unwrap_or_default()
        };
        let last_price = dec("last");
        let open_price = dec("open24h");
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
            high_price: dec("high24h"),
            low_price: dec("low24h"),
            volume: dec("vol24h"),
        })
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
        OrderType::LimitMaker => "post_only",
        _ => "limit",
    }
}

fn native_interval_str(interval: Interval) -> &'static str {
    match interval {
        Interval::OneMinute => "1m",
        Interval::FiveMinutes => "5m",
        Interval::FifteenMinutes => "15m",
        Interval::ThirtyMinutes => "30m",
        Interval::OneHour => "1H",
        Interval::FourHours => "4H",
        Interval::OneDay => "1D",
        Interval::OneWeek => "1W",
        Interval::OneMonth => "1M",
    }
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

fn parse_instrument(row: &Value) -> Result<gateway_domain::Symbol, GatewayError> {
    use gateway_domain::symbol::{LotSize, MinNotional, PriceFilter, SymbolFilters, SymbolStatus};

    let tick_size = row["tickSz"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or(Decimal::new(1, 8));
    let step_size = row["lotSz"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or(Decimal::new(1, 8));
    let min_qty = row["minSz"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default();

    Ok(gateway_domain::Symbol {
        symbol: row["instId"].as_str().unwrap_or_default().replace('-', ""),
        base_asset: row["baseCcy"].as_str().unwrap_or_default().to_string(),
        quote_asset: row["quoteCcy"].as_str().unwrap_or_default().to_string(),
        base_asset_precision: 8,
        filters: SymbolFilters {
            price_filter: PriceFilter {
                min_price: Decimal::ZERO,
                max_price: Decimal::new(i64::MAX, 0),
                tick_size,
            },
            lot_size: LotSize {
                min_qty,
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
        status: if row["state"].as_str() == Some("live") {
            SymbolStatus::Trading
        } else {
            SymbolStatus::Halt
        },
    })
}

fn parse_candle_row(raw: &Value) -> Result<Candle, GatewayError> {
    let row = raw.as_array().ok_or_else(|| GatewayError::upstream("bad candle row"))?;
    let dec = |idx: usize| -> Decimal {
        row.get(idx)
            .and_then(|v| v.as_str())
            .and_then(|v| Decimal::from_str(v).ok())
            .unwrap_or_default()
    };
    let open_time = row.first().and_then(|v| v.as_str()).and_then(|v| v.parse().ok()).unwrap_or_default();
    Ok(Candle {
        open_time,
        open: dec(1),
        high: dec(2),
        low: dec(3),
        close: dec(4),
        volume: dec(5),
        close_time: open_time,
        quote_volume: dec(7),
        num_trades: 0,
        taker_buy_base_volume: Decimal::ZERO,
        taker_buy_quote_volume: Decimal::ZERO,
    })
}

fn parse_order_row(row: &Value) -> Result<CanonicalOrder, GatewayError> {
    let orig_qty = row["sz"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default();
    let executed_qty = row["accFillSz"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default();
    let price = row["px"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default();
    let status = match row["state"].as_str() {
        Some("canceled") => OrderStatus::Canceled,
        Some("filled") => OrderStatus::Filled,
        Some("partially_filled") => OrderStatus::PartiallyFilled,
        _ => OrderStatus::New,
    };

    Ok(CanonicalOrder {
        symbol: row["instId"].as_str().unwrap_or_default().replace('-', ""),
        order_id: row["ordId"].as_str().and_then(|v| v.parse().ok()).unwrap_or_default(),
        order_list_id: CanonicalOrder::NO_ORDER_LIST,
        client_order_id: row["clOrdId"].as_str().unwrap_or_default().to_string(),
        price,
        orig_qty,
        executed_qty,
        cummulative_quote_qty: row["fillNotionalUsd"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or(executed_qty * price),
        status,
        time_in_force: TimeInForce::Gtc,
        order_type: if row["ordType"].as_str() == Some("market") {
            OrderType::Market
        } else {
            OrderType::Limit
        },
        side: if row["side"].as_str() == Some("sell") {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        },
        stop_price: None,
        iceberg_qty: None,
        time: row["cTime"].as_str().and_then(|v| v.parse().ok()).unwrap_or_default(),
        update_time: row["uTime"].as_str().and_then(|v| v.parse().ok()).unwrap_or_default(),
        is_working: status == OrderStatus::New || status == OrderStatus::PartiallyFilled,
        orig_quote_order_qty: CanonicalOrder::derive_orig_quote_order_qty(orig_qty, price),
    })
}

fn parse_trade_row(row: &Value) -> Result<CanonicalTrade, GatewayError> {
    Ok(CanonicalTrade::new(
        row["instId"].as_str().unwrap_or_default().replace('-', ""),
        row["tradeId"].as_str().and_then(|v| v.parse().ok()).unwrap_or_default(),
        row["ordId"].as_str().and_then(|v| v.parse().ok()).unwrap_or_default(),
        row["fillPx"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
        row["fillSz"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default(),
        row["fee"].as_str().and_then(|v| Decimal::from_str(v).ok()).unwrap_or_default().abs(),
        row["feeCcy"].as_str().unwrap_or_default().to_string(),
        row["ts"].as_str().and_then(|v| v.parse().ok()).unwrap_or_default(),
        row["side"].as_str() == Some("buy"),
        row["execType"].as_str() == Some("M"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_id_dash_is_stripped_for_canonical_symbol() {
        let raw = serde_json::json!({
            "instId": "BTC-USDT", "baseCcy": "BTC", "quoteCcy": "USDT",
            "tickSz": "0.01", "lotSz": "0.00001", "minSz": "0.00001", "state": "live"
        });
        let symbol = parse_instrument(&raw).unwrap();
        assert_eq!(symbol.symbol, "BTCUSDT");
    }

    #[test]
    fn order_row_filled_state_maps_to_filled_status() {
        let raw = serde_json::json!({
            "instId": "BTC-USDT", "ordId": "1", "clOrdId": "", "sz": "1",
            "accFillSz": "1", "px": "100", "state": "filled", "ordType": "limit",
            "side": "buy", "cTime": "0", "uTime": "0"
        });
        let order = parse_order_row(&raw).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
    }
}
