//! The reference venue adapter. Every other venue's parser is judged against
//! this one's shapes (§4.2): it is close to an identity transform, since the
//! canonical model is modeled directly on this venue's own API.

use async_trait::async_trait;
use gateway_domain::{
    Balance, CanonicalOrder, CanonicalTrade, Candle, GatewayError, Interval, OrderCancelling,
    OrderSide, OrderStatus, OrderType, Symbol, TimeInForce, VenueTag,
};
use gateway_utils::time::get_current_milliseconds;
use hyper::http::request::Builder;
use hyper::Uri;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::rest::{ErrorHandlerEmpty, RequestMethod, RestClient, RestHeaders, UriBuilder};
use crate::signer;
use crate::venues::{
    LoadedVenueInfo, NewOrder, OrderBookTop, SymbolPriceTicker, TickerStatistics, VenueClient,
};

pub struct ReferenceVenueConfig {
    pub rest_host: String,
    pub api_key: String,
    pub api_secret: Vec<u8>,
}

pub struct ReferenceVenueHeaders {
    pub api_key: String,
}

impl RestHeaders for ReferenceVenueHeaders {
    fn add_specific_headers(&self, builder: Builder, _uri: &Uri, _method: RequestMethod) -> Builder {
        builder.header("X-MBX-APIKEY", &self.api_key)
    }
}

pub struct ReferenceVenue {
    config: ReferenceVenueConfig,
    rest: RestClient<ErrorHandlerEmpty, ReferenceVenueHeaders>,
}

impl ReferenceVenue {
    pub fn new(config: ReferenceVenueConfig) -> Self {
        let rest = RestClient::new(
            "reference",
            false,
            ErrorHandlerEmpty,
            ReferenceVenueHeaders {
                api_key: config.api_key.clone(),
            },
        );
        Self { config, rest }
    }

    fn signed_builder(&self, path: &str) -> UriBuilder {
        let mut builder = UriBuilder::from_path(path);
        builder.add_kv("timestamp", get_current_milliseconds());
        builder.add_kv("recvWindow", 5000);
        builder
    }

    fn sign(&self, builder: &mut UriBuilder) -> String {
        let query = builder.query().to_vec();
        signer::sign(VenueTag::Reference, &self.config.api_secret, &query)
    }

    fn build_signed_uri(&self, mut builder: UriBuilder) -> Uri {
        let signature = self.sign(&mut builder);
        builder.add_kv("signature", signature);
        builder.build_uri(&self.config.rest_host, true)
    }

    fn parse_error_or(&self, body: &str) -> Result<Value, GatewayError> {
        serde_json::from_str(body)
            .map_err(|e| GatewayError::upstream(format!("invalid JSON from reference venue: {e}")))
    }
}

#[async_trait]
impl VenueClient for ReferenceVenue {
    fn venue_tag(&self) -> VenueTag {
        VenueTag::Reference
    }

    async fn load(&self) -> Result<LoadedVenueInfo, GatewayError> {
        let uri = UriBuilder::from_path("/api/v3/exchangeInfo").build_uri(&self.config.rest_host, false);
        let response = self.rest.get(uri, "exchangeInfo").await?;
        let body = self.parse_error_or(&response.content)?;

        let mut symbols = std::collections::HashMap::new();
        let mut highest_base_precision = 0u32;
        for raw in body["symbols"].as_array().unwrap_or(&Vec::new()) {
            let symbol = parse_symbol(raw)?;
            highest_base_precision = highest_base_precision.max(symbol.base_asset_precision);
            symbols.insert(symbol.symbol.clone(), symbol);
        }

        Ok(LoadedVenueInfo {
            symbols,
            highest_precision: highest_base_precision.max(8),
            spot_account_id: None,
        })
    }

    async fn fetch_server_time(&self) -> Result<i64, GatewayError> {
        let uri = UriBuilder::from_path("/api/v3/time").build_uri(&self.config.rest_host, false);
        let response = self.rest.get(uri, "serverTime").await?;
        let body = self.parse_error_or(&response.content)?;
        body["serverTime"]
            .as_i64()
            .ok_or_else(|| GatewayError::upstream("missing serverTime"))
    }

    async fn fetch_order_book(&self, symbol: &str, limit: u32) -> Result<OrderBookTop, GatewayError> {
        const ALLOWED: [u32; 7] = [5, 10, 20, 50, 100, 500, 1000];
        if !ALLOWED.contains(&limit) {
            return Err(GatewayError::validation(format!(
                "limit {limit} is not one of the venue's allowed depths"
            )));
        }

        let mut builder = UriBuilder::from_path("/api/v3/depth");
        builder.add_kv("symbol", symbol);
        builder.add_kv("limit", limit);
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self.rest.get(uri, "orderBook").await?;
        let body = self.parse_error_or(&response.content)?;
        parse_order_book_top(&body)
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Candle>, GatewayError> {
        let mut builder = UriBuilder::from_path("/api/v3/klines");
        builder.add_kv("symbol", symbol);
        builder.add_kv("interval", interval.canonical_str());
        builder.add_kv("limit", limit);
        if let Some(start) = start {
            builder.add_kv("startTime", start);
        }
        if let Some(end) = end {
            builder.add_kv("endTime", end);
        }
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self.rest.get(uri, "klines").await?;
        let body = self.parse_error_or(&response.content)?;
        let rows = body
            .as_array()
            .ok_or_else(|| GatewayError::upstream("klines response was not an array"))?;
        rows.iter().map(parse_kline_row).collect()
    }

    async fn create_order(&self, order: NewOrder) -> Result<CanonicalOrder, GatewayError> {
        validate_new_order(&order)?;

        let mut builder = self.signed_builder("/api/v3/order");
        builder.add_kv("symbol", &order.symbol);
        builder.add_kv("side", order_side_str(order.side));
        builder.add_kv("type", order_type_str(order.order_type));
        if let Some(qty) = order.qty {
            builder.add_kv("quantity", qty);
        }
        if let Some(quote_qty) = order.quote_order_qty {
            builder.add_kv("quoteOrderQty", quote_qty);
        }
        if order.order_type.requires_time_in_force_and_price() {
            builder.add_kv("timeInForce", "GTC");
            if let Some(price) = order.price {
                builder.add_kv("price", price);
            }
        }
        if let Some(stop_price) = order.stop_price {
            builder.add_kv("stopPrice", stop_price);
        }
        if let Some(client_order_id) = &order.client_order_id {
            builder.add_kv("newClientOrderId", client_order_id);
        }

        let uri = self.build_signed_uri(builder);
        let response = self.rest.post(uri, None, "createOrder").await?;
        let body = self.parse_error_or(&response.content)?;
        parse_canonical_order(&body)
    }

    async fn fetch_order(&self, symbol: &str, order_id: i64) -> Result<CanonicalOrder, GatewayError> {
        let mut builder = self.signed_builder("/api/v3/order");
        builder.add_kv("symbol", symbol);
        builder.add_kv("orderId", order_id);
        let uri = self.build_signed_uri(builder);
        let response = self.rest.get(uri, "fetchOrder").await?;
        let body = self.parse_error_or(&response.content)?;
        parse_canonical_order(&body)
    }

    async fn cancel_order(&self, order: OrderCancelling) -> Result<CanonicalOrder, GatewayError> {
        let mut builder = self.signed_builder("/api/v3/order");
        builder.add_kv("symbol", &order.symbol);
        builder.add_kv("orderId", order.order_id);
        let uri = self.build_signed_uri(builder);
        let response = self.rest.delete(uri, "cancelOrder").await?;
        let body = self.parse_error_or(&response.content)?;
        parse_canonical_order(&body)
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        let mut builder = self.signed_builder("/api/v3/openOrders");
        builder.add_kv("symbol", symbol);
        let uri = self.build_signed_uri(builder);
        let response = self.rest.delete(uri, "cancelAllOrders").await?;
        let body = self.parse_error_or(&response.content)?;
        let rows = body
            .as_array()
            .ok_or_else(|| GatewayError::upstream("cancelAllOrders response was not an array"))?;
        rows.iter().map(parse_canonical_order).collect()
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        let mut builder = self.signed_builder("/api/v3/openOrders");
        builder.add_kv("symbol", symbol);
        let uri = self.build_signed_uri(builder);
        let response = self.rest.get(uri, "fetchOpenOrders").await?;
        let body = self.parse_error_or(&response.content)?;
        let rows = body
            .as_array()
            .ok_or_else(|| GatewayError::upstream("fetchOpenOrders response was not an array"))?;
        rows.iter().map(parse_canonical_order).collect()
    }

    async fn fetch_account_information(&self) -> Result<Vec<Balance>, GatewayError> {
        let builder = self.signed_builder("/api/v3/account");
        let uri = self.build_signed_uri(builder);
        let response = self.rest.get(uri, "accountInformation").await?;
        let body = self.parse_error_or(&response.content)?;
        parse_balances(&body["balances"])
    }

    async fn fetch_funding_wallet(
        &self,
        asset: Option<&str>,
        _need_btc_valuation: bool,
    ) -> Result<Vec<Balance>, GatewayError> {
        let mut builder = self.signed_builder("/sapi/v1/asset/get-funding-asset");
        if let Some(asset) = asset {
            builder.add_kv("asset", asset);
        }
        let uri = self.build_signed_uri(builder);
        let response = self.rest.post(uri, None, "fundingWallet").await?;
        let body = self.parse_error_or(&response.content)?;
        let rows = body
            .as_array()
            .ok_or_else(|| GatewayError::upstream("fundingWallet response was not an array"))?;
        rows.iter()
            .map(|row| {
                Ok(Balance {
                    asset: row["asset"].as_str().unwrap_or_default().to_string(),
                    free: decimal_field(row, "free")?,
                    locked: decimal_field(row, "locked").unwrap_or(Decimal::ZERO),
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
        let mut builder = self.signed_builder("/api/v3/myTrades");
        builder.add_kv("symbol", symbol);
        builder.add_kv("limit", limit);
        if let Some(start_time) = start_time {
            builder.add_kv("startTime", start_time);
        }
        let uri = self.build_signed_uri(builder);
        let response = self.rest.get(uri, "accountTradeList").await?;
        let body = self.parse_error_or(&response.content)?;
        let rows = body
            .as_array()
            .ok_or_else(|| GatewayError::upstream("myTrades response was not an array"))?;
        rows.iter().map(parse_trade).collect()
    }

    async fn fetch_symbol_price_ticker(&self, symbol: &str) -> Result<SymbolPriceTicker, GatewayError> {
        let mut builder = UriBuilder::from_path("/api/v3/ticker/price");
        builder.add_kv("symbol", symbol);
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self.rest.get(uri, "symbolPriceTicker").await?;
        let body = self.parse_error_or(&response.content)?;
        Ok(SymbolPriceTicker {
            symbol: body["symbol"].as_str().unwrap_or(symbol).to_string(),
            price: decimal_field(&body, "price")?,
        })
    }

    async fn fetch_ticker_price_change_statistics(
        &self,
        symbol: &str,
    ) -> Result<TickerStatistics, GatewayError> {
        let mut builder = UriBuilder::from_path("/api/v3/ticker/24hr");
        builder.add_kv("symbol", symbol);
        let uri = builder.build_uri(&self.config.rest_host, true);
        let response = self.rest.get(uri, "tickerPriceChangeStatistics").await?;
        let body = self.parse_error_or(&response.content)?;
        Ok(TickerStatistics {
            symbol: body["symbol"].as_str().unwrap_or(symbol).to_string(),
            price_change: decimal_field(&body, "priceChange")?,
            price_change_percent: decimal_field(&body, "priceChangePercent")?,
            last_price: decimal_field(&body, "lastPrice")?,
            open_price: decimal_field(&body, "openPrice")?,
            high_price: decimal_field(&body, "highPrice")?,
            low_price: decimal_field(&body, "lowPrice")?,
            volume: decimal_field(&body, "volume")?,
        })
    }

    async fn obtain_listen_key(&self) -> Result<Option<String>, GatewayError> {
        let uri = UriBuilder::from_path("/api/v3/userDataStream").build_uri(&self.config.rest_host, false);
        let response = self.rest.post(uri, None, "createListenKey").await?;
        let body = self.parse_error_or(&response.content)?;
        let listen_key = body["listenKey"]
            .as_str()
            .ok_or_else(|| GatewayError::upstream("missing listenKey"))?;
        Ok(Some(listen_key.to_string()))
    }

    async fn keepalive_listen_key(&self, listen_key: &str) -> Result<(), GatewayError> {
        let mut builder = UriBuilder::from_path("/api/v3/userDataStream");
        builder.add_kv("listenKey", listen_key);
        let uri = builder.build_uri(&self.config.rest_host, true);
        self.rest.put(uri, "renewListenKey").await?;
        Ok(())
    }
}

fn validate_new_order(order: &NewOrder) -> Result<(), GatewayError> {
    if order.order_type.requires_time_in_force_and_price() && order.price.is_none() {
        return Err(GatewayError::validation("LIMIT-like order requires a price"));
    }
    if order.order_type.requires_stop_price() && order.stop_price.is_none() {
        return Err(GatewayError::validation("STOP-like order requires a stopPrice"));
    }
    if order.qty.is_none() && order.quote_order_qty.is_none() {
        return Err(GatewayError::validation("order requires qty or quoteOrderQty"));
    }
    Ok(())
}

fn order_side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

fn order_type_str(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Limit => "LIMIT",
        OrderType::Market => "MARKET",
        OrderType::StopLoss => "STOP_LOSS",
        OrderType::StopLossLimit => "STOP_LOSS_LIMIT",
        OrderType::TakeProfit => "TAKE_PROFIT",
        OrderType::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
        OrderType::LimitMaker => "LIMIT_MAKER",
    }
}

fn parse_order_side(raw: &str) -> OrderSide {
    if raw.eq_ignore_ascii_case("SELL") {
        OrderSide::Sell
    } else {
        OrderSide::Buy
    }
}

fn parse_order_type(raw: &str) -> OrderType {
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

/// Status mapping (§4.2): `canceled|partial-canceled -> CANCELED`,
/// `partial-filled -> PARTIALLY_FILLED`, `filled -> FILLED`, else `NEW`.
pub(crate) fn parse_order_status(raw: &str) -> OrderStatus {
    match raw {
        "CANCELED" | "PENDING_CANCEL" => OrderStatus::Canceled,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "REJECTED" => OrderStatus::Rejected,
        "EXPIRED" => OrderStatus::Expired,
        _ => OrderStatus::New,
    }
}

fn decimal_field(value: &Value, key: &str) -> Result<Decimal, GatewayError> {
    let raw = value[key]
        .as_str()
        .ok_or_else(|| GatewayError::upstream(format!("missing or non-string field `{key}`")))?;
    Decimal::from_str(raw).map_err(|e| GatewayError::upstream(format!("bad decimal `{key}`: {e}")))
}

fn parse_symbol(raw: &Value) -> Result<Symbol, GatewayError> {
    use gateway_domain::symbol::{LotSize, MinNotional, PriceFilter, SymbolFilters, SymbolStatus};

    let mut price_filter = None;
    let mut lot_size = None;
    let mut min_notional = None;
    for filter in raw["filters"].as_array().unwrap_or(&Vec::new()) {
        match filter["filterType"].as_str() {
            Some("PRICE_FILTER") => {
                price_filter = Some(PriceFilter {
                    min_price: decimal_field(filter, "minPrice")?,
                    max_price: decimal_field(filter, "maxPrice")?,
                    tick_size: decimal_field(filter, "tickSize")?,
                })
            }
            Some("LOT_SIZE") => {
                lot_size = Some(LotSize {
                    min_qty: decimal_field(filter, "minQty")?,
                    max_qty: decimal_field(filter, "maxQty")?,
                    step_size: decimal_field(filter, "stepSize")?,
                })
            }
            Some("MIN_NOTIONAL") => {
                min_notional = Some(MinNotional {
                    min_notional: decimal_field(filter, "minNotional")?,
                    apply_to_market: filter["applyToMarket"].as_bool().unwrap_or(false),
                    avg_price_mins: filter["avgPriceMins"].as_u64().unwrap_or(0) as u32,
                })
            }
            _ => {}
        }
    }

    let status = match raw["status"].as_str() {
        Some("BREAK") => SymbolStatus::Break,
        Some("HALT") => SymbolStatus::Halt,
        _ => SymbolStatus::Trading,
    };

    Ok(Symbol {
        symbol: raw["symbol"].as_str().unwrap_or_default().to_string(),
        base_asset: raw["baseAsset"].as_str().unwrap_or_default().to_string(),
        quote_asset: raw["quoteAsset"].as_str().unwrap_or_default().to_string(),
        base_asset_precision: raw["baseAssetPrecision"].as_u64().unwrap_or(8) as u32,
        filters: SymbolFilters {
            price_filter: price_filter
                .ok_or_else(|| GatewayError::upstream("symbol missing mandatory PRICE_FILTER"))?,
            lot_size: lot_size
                .ok_or_else(|| GatewayError::upstream("symbol missing mandatory LOT_SIZE"))?,
            min_notional: min_notional
                .ok_or_else(|| GatewayError::upstream("symbol missing mandatory MIN_NOTIONAL"))?,
        },
        order_types: raw["orderTypes"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        permissions: raw["permissions"]
            .as_array()
            .unwrap_or(&Vec::new())
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        status,
    })
}

fn parse_canonical_order(raw: &Value) -> Result<CanonicalOrder, GatewayError> {
    let orig_qty = decimal_field(raw, "origQty")?;
    let price = decimal_field(raw, "price")?;
    let orig_quote_order_qty = match raw.get("origQuoteOrderQty").and_then(|v| v.as_str()) {
        Some(raw) => Decimal::from_str(raw)
            .map_err(|e| GatewayError::upstream(format!("bad decimal `origQuoteOrderQty`: {e}")))?,
        None => CanonicalOrder::derive_orig_quote_order_qty(orig_qty, price),
    };

    Ok(CanonicalOrder {
        symbol: raw["symbol"].as_str().unwrap_or_default().to_string(),
        order_id: raw["orderId"].as_i64().unwrap_or_default(),
        order_list_id: CanonicalOrder::NO_ORDER_LIST,
        client_order_id: raw["clientOrderId"].as_str().unwrap_or_default().to_string(),
        price,
        orig_qty,
        executed_qty: decimal_field(raw, "executedQty")?,
        cummulative_quote_qty: decimal_field(raw, "cummulativeQuoteQty")?,
        status: parse_order_status(raw["status"].as_str().unwrap_or("NEW")),
        time_in_force: match raw["timeInForce"].as_str() {
            Some("IOC") => TimeInForce::Ioc,
            Some("FOK") => TimeInForce::Fok,
            _ => TimeInForce::Gtc,
        },
        order_type: parse_order_type(raw["type"].as_str().unwrap_or("LIMIT")),
        side: parse_order_side(raw["side"].as_str().unwrap_or("BUY")),
        stop_price: raw.get("stopPrice").and_then(|v| v.as_str()).and_then(|v| Decimal::from_str(v).ok()),
        iceberg_qty: raw.get("icebergQty").and_then(|v| v.as_str()).and_then(|v| Decimal::from_str(v).ok()),
        time: raw["time"].as_i64().unwrap_or_default(),
        update_time: raw["updateTime"].as_i64().unwrap_or_default(),
        is_working: raw["isWorking"].as_bool().unwrap_or(true),
        orig_quote_order_qty,
    })
}

fn parse_trade(raw: &Value) -> Result<CanonicalTrade, GatewayError> {
    Ok(CanonicalTrade::new(
        raw["symbol"].as_str().unwrap_or_default().to_string(),
        raw["id"].as_i64().unwrap_or_default(),
        raw["orderId"].as_i64().unwrap_or_default(),
        decimal_field(raw, "price")?,
        decimal_field(raw, "qty")?,
        decimal_field(raw, "commission")?,
        raw["commissionAsset"].as_str().unwrap_or_default().to_string(),
        raw["time"].as_i64().unwrap_or_default(),
        raw["isBuyer"].as_bool().unwrap_or(false),
        raw["isMaker"].as_bool().unwrap_or(false),
    ))
}

fn parse_balances(raw: &Value) -> Result<Vec<Balance>, GatewayError> {
    raw.as_array()
        .ok_or_else(|| GatewayError::upstream("balances was not an array"))?
        .iter()
        .map(|row| {
            Ok(Balance {
                asset: row["asset"].as_str().unwrap_or_default().to_string(),
                free: decimal_field(row, "free")?,
                locked: decimal_field(row, "locked")?,
            })
        })
        .collect()
}

fn parse_order_book_top(raw: &Value) -> Result<OrderBookTop, GatewayError> {
    Ok(OrderBookTop {
        last_update_id: raw["lastUpdateId"].as_i64().unwrap_or_default(),
        bids: parse_levels(&raw["bids"])?,
        asks: parse_levels(&raw["asks"])?,
    })
}

fn parse_levels(raw: &Value) -> Result<Vec<(Decimal, Decimal)>, GatewayError> {
    raw.as_array()
        .ok_or_else(|| GatewayError::upstream("order book side was not an array"))?
        .iter()
        .take(5)
        .map(|level| {
            let level = level
                .as_array()
                .ok_or_else(|| GatewayError::upstream("order book level was not an array"))?;
            let price = level
                .first()
                .and_then(|v| v.as_str())
                .and_then(|v| Decimal::from_str(v).ok())
                .ok_or_else(|| GatewayError::upstream("bad order book price"))?;
            let qty = level
                .get(1)
                .and_then(|v| v.as_str())
                .and_then(|v| Decimal::from_str(v).ok())
                .ok_or_else(|| GatewayError::upstream("bad order book qty"))?;
            Ok((price, qty))
        })
        .collect()
}

/// Canonical kline positional array: `[openTime, open, high, low, close,
/// volume, closeTime, quoteVolume, numTrades, takerBuyBase, takerBuyQuote]`.
fn parse_kline_row(raw: &Value) -> Result<Candle, GatewayError> {
    let row = raw
        .as_array()
        .ok_or_else(|| GatewayError::upstream("kline row was not an array"))?;
    let field = |idx: usize| -> Result<&Value, GatewayError> {
        row.get(idx)
            .ok_or_else(|| GatewayError::upstream(format!("kline row missing field {idx}")))
    };
    let as_decimal = |idx: usize| -> Result<Decimal, GatewayError> {
        let v = field(idx)?;
        let raw = v.as_str().ok_or_else(|| GatewayError::upstream("kline field was not a string"))?;
        Decimal::from_str(raw).map_err(|e| GatewayError::upstream(format!("bad kline decimal: {e}")))
    };

    Ok(Candle {
        open_time: field(0)?.as_i64().unwrap_or_default(),
        open: as_decimal(1)?,
        high: as_decimal(2)?,
        low: as_decimal(3)?,
        close: as_decimal(4)?,
        volume: as_decimal(5)?,
        close_time: field(6)?.as_i64().unwrap_or_default(),
        quote_volume: as_decimal(7)?,
        num_trades: field(8)?.as_i64().unwrap_or_default(),
        taker_buy_base_volume: as_decimal(9)?,
        taker_buy_quote_volume: as_decimal(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_status_mapping_matches_normalization_rules() {
        assert_eq!(parse_order_status("CANCELED"), OrderStatus::Canceled);
        assert_eq!(parse_order_status("PARTIALLY_FILLED"), OrderStatus::PartiallyFilled);
        assert_eq!(parse_order_status("FILLED"), OrderStatus::Filled);
        assert_eq!(parse_order_status("NEW"), OrderStatus::New);
        assert_eq!(parse_order_status("SOMETHING_ELSE"), OrderStatus::New);
    }

    #[test]
    fn order_book_scenario_returns_five_descending_bids_and_ascending_asks() {
        let raw = json!({
            "lastUpdateId": 1,
            "bids": [["10","1"],["9","2"],["8","3"],["7","4"],["6","5"]],
            "asks": [["11","1"],["12","2"],["13","3"],["14","4"],["15","5"]],
        });
        let top = parse_order_book_top(&raw).unwrap();
        assert_eq!(top.bids.len(), 5);
        assert_eq!(top.asks.len(), 5);
        assert_eq!(top.bids[0].0, Decimal::from(10));
        assert_eq!(top.asks[0].0, Decimal::from(11));
    }

    #[test]
    fn kline_row_parses_into_eleven_field_candle() {
        let raw = json!([
            1_600_000_000_000i64, "1", "2", "0.5", "1.5", "100",
            1_600_000_060_000i64, "150", 42, "40", "60"
        ]);
        let candle = parse_kline_row(&raw).unwrap();
        assert_eq!(candle.open_time, 1_600_000_000_000);
        assert_eq!(candle.num_trades, 42);
    }

    #[test]
    fn origquoteorderqty_is_derived_when_absent() {
        let raw = json!({
            "symbol": "BTCUSDT", "orderId": 1, "clientOrderId": "c",
            "price": "10", "origQty": "2", "executedQty": "0",
            "cummulativeQuoteQty": "0", "status": "NEW", "timeInForce": "GTC",
            "type": "LIMIT", "side": "BUY", "time": 0, "updateTime": 0,
            "isWorking": true
        });
        let order = parse_canonical_order(&raw).unwrap();
        assert_eq!(order.orig_quote_order_qty, Decimal::from(20));
    }
}
