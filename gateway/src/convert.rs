//! Proto <-> canonical-domain conversions for the `Martin` RPC facade (§6).
//! Every numeric field crosses the wire as a decimal string, never a binary
//! float, matching the canonical model's own rule (§3).

use gateway_domain::{
    Balance, CandleEvent, CanonicalOrder, CanonicalTrade, ExecutionReportEvent, ExecutionType,
    GatewayError, GatewayErrorKind, MiniTickerEvent, OrderBookTopEvent, OrderSide, OrderStatus,
    OrderType, TimeInForce,
};
use gateway_proto::{
    Balance as ProtoBalance, Candle as ProtoCandle, CandleReply, ExecutionReportReply,
    LotSize as ProtoLotSize, MinNotional as ProtoMinNotional, MiniTickerReply, Order as ProtoOrder,
    OrderBookReply, PriceFilter as ProtoPriceFilter, PriceLevel as ProtoPriceLevel,
    SymbolInfoReply, Trade as ProtoTrade,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use tonic::Status;

use crate::streams::MarketChannel;

pub fn gateway_error_to_status(err: GatewayError) -> Status {
    match err.kind {
        GatewayErrorKind::Validation | GatewayErrorKind::AuthOrConfig => {
            Status::failed_precondition(err.message)
        }
        GatewayErrorKind::RateLimited => Status::resource_exhausted(err.message),
        GatewayErrorKind::Upstream | GatewayErrorKind::StreamTerminal => Status::unknown(err.message),
    }
}

pub fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, Status> {
    Decimal::from_str(raw).map_err(|_| Status::invalid_argument(format!("invalid decimal in {field}: {raw}")))
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

fn time_in_force_str(tif: TimeInForce) -> &'static str {
    match tif {
        TimeInForce::Gtc => "GTC",
        TimeInForce::Ioc => "IOC",
        TimeInForce::Fok => "FOK",
    }
}

fn order_status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::New => "NEW",
        OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
        OrderStatus::Filled => "FILLED",
        OrderStatus::Canceled => "CANCELED",
        OrderStatus::Rejected => "REJECTED",
        OrderStatus::Expired => "EXPIRED",
    }
}

fn execution_type_str(execution_type: ExecutionType) -> &'static str {
    match execution_type {
        ExecutionType::New => "NEW",
        ExecutionType::Canceled => "CANCELED",
        ExecutionType::Rejected => "REJECTED",
        ExecutionType::Trade => "TRADE",
        ExecutionType::Expired => "EXPIRED",
    }
}

pub fn order_to_proto(order: &CanonicalOrder) -> ProtoOrder {
    ProtoOrder {
        symbol: order.symbol.clone(),
        order_id: order.order_id,
        order_list_id: order.order_list_id,
        client_order_id: order.client_order_id.clone(),
        price: order.price.to_string(),
        orig_qty: order.orig_qty.to_string(),
        executed_qty: order.executed_qty.to_string(),
        cummulative_quote_qty: order.cummulative_quote_qty.to_string(),
        status: order_status_str(order.status).to_string(),
        time_in_force: time_in_force_str(order.time_in_force).to_string(),
        r#type: order_type_str(order.order_type).to_string(),
        side: order_side_str(order.side).to_string(),
        stop_price: order.stop_price.map(|p| p.to_string()),
        iceberg_qty: order.iceberg_qty.map(|q| q.to_string()),
        time: order.time,
        update_time: order.update_time,
        is_working: order.is_working,
        orig_quote_order_qty: order.orig_quote_order_qty.to_string(),
    }
}

pub fn trade_to_proto(trade: &CanonicalTrade) -> ProtoTrade {
    ProtoTrade {
        symbol: trade.symbol.clone(),
        id: trade.id,
        order_id: trade.order_id,
        order_list_id: trade.order_list_id,
        price: trade.price.to_string(),
        qty: trade.qty.to_string(),
        quote_qty: trade.quote_qty.to_string(),
        commission: trade.commission.to_string(),
        commission_asset: trade.commission_asset.clone(),
        time: trade.time,
        is_buyer: trade.is_buyer,
        is_maker: trade.is_maker,
        is_best_match: trade.is_best_match,
    }
}

pub fn balance_to_proto(balance: &Balance) -> ProtoBalance {
    ProtoBalance {
        asset: balance.asset.clone(),
        free: balance.free.to_string(),
        locked: balance.locked.to_string(),
    }
}

pub fn symbol_to_proto(symbol: &gateway_domain::Symbol) -> SymbolInfoReply {
    SymbolInfoReply {
        symbol: symbol.symbol.clone(),
        base_asset: symbol.base_asset.clone(),
        quote_asset: symbol.quote_asset.clone(),
        base_asset_precision: symbol.base_asset_precision as i32,
        price_filter: Some(ProtoPriceFilter {
            min_price: symbol.filters.price_filter.min_price.to_string(),
            max_price: symbol.filters.price_filter.max_price.to_string(),
            tick_size: symbol.filters.price_filter.tick_size.to_string(),
        }),
        lot_size: Some(ProtoLotSize {
            min_qty: symbol.filters.lot_size.min_qty.to_string(),
            max_qty: symbol.filters.lot_size.max_qty.to_string(),
            step_size: symbol.filters.lot_size.step_size.to_string(),
        }),
        min_notional: Some(ProtoMinNotional {
            min_notional: symbol.filters.min_notional.min_notional.to_string(),
            apply_to_market: symbol.filters.min_notional.apply_to_market,
            avg_price_mins: symbol.filters.min_notional.avg_price_mins as i32,
        }),
        order_types: symbol.order_types.clone(),
        permissions: symbol.permissions.clone(),
        status: format!("{:?}", symbol.status).to_uppercase(),
    }
}

pub fn candle_to_proto(candle: &gateway_domain::Candle) -> ProtoCandle {
    ProtoCandle {
        open_time: candle.open_time,
        open: candle.open.to_string(),
        high: candle.high.to_string(),
        low: candle.low.to_string(),
        close: candle.close.to_string(),
        volume: candle.volume.to_string(),
        close_time: candle.close_time,
        quote_volume: candle.quote_volume.to_string(),
        num_trades: candle.num_trades,
        taker_buy_base_volume: candle.taker_buy_base_volume.to_string(),
        taker_buy_quote_volume: candle.taker_buy_quote_volume.to_string(),
    }
}

pub fn candle_event_to_proto(event: &CandleEvent) -> CandleReply {
    CandleReply {
        symbol: event.symbol.clone(),
        interval: event.interval.canonical_str().to_string(),
        candle: Some(candle_to_proto(&event.candle)),
        is_closed: event.is_closed,
    }
}

pub fn mini_ticker_to_proto(event: &MiniTickerEvent) -> MiniTickerReply {
    MiniTickerReply {
        symbol: event.symbol.clone(),
        event_time: event.event_time,
        close_price: event.close_price.to_string(),
        open_price: event.open_price.to_string(),
        high_price: event.high_price.to_string(),
        low_price: event.low_price.to_string(),
        base_volume: event.base_volume.to_string(),
        quote_volume: event.quote_volume.to_string(),
    }
}

pub fn order_book_top_to_proto(event: &OrderBookTopEvent) -> OrderBookReply {
    OrderBookReply {
        symbol: event.symbol.clone(),
        last_update_id: event.last_update_id,
        bids: event.bids.iter().map(price_level_to_proto).collect(),
        asks: event.asks.iter().map(price_level_to_proto).collect(),
    }
}

fn price_level_to_proto(level: &gateway_domain::PriceLevel) -> ProtoPriceLevel {
    ProtoPriceLevel {
        price: level.price.to_string(),
        qty: level.qty.to_string(),
    }
}

pub fn execution_report_to_proto(event: &ExecutionReportEvent) -> ExecutionReportReply {
    let order = ProtoOrder {
        symbol: event.symbol.clone(),
        order_id: event.order_id,
        order_list_id: event.order_list_id,
        client_order_id: event.client_order_id.clone(),
        price: event.price.to_string(),
        orig_qty: event.orig_qty.to_string(),
        executed_qty: event.executed_qty.to_string(),
        cummulative_quote_qty: event.cummulative_quote_qty.to_string(),
        status: order_status_str(event.status).to_string(),
        time_in_force: time_in_force_str(event.time_in_force).to_string(),
        r#type: order_type_str(event.order_type).to_string(),
        side: order_side_str(event.side).to_string(),
        stop_price: event.stop_price.map(|p| p.to_string()),
        iceberg_qty: event.iceberg_qty.map(|q| q.to_string()),
        time: event.time,
        update_time: event.update_time,
        is_working: event.is_working,
        orig_quote_order_qty: event.orig_quote_order_qty.to_string(),
    };
    ExecutionReportReply {
        order: Some(order),
        execution_type: execution_type_str(event.execution_type).to_string(),
        last_executed_quantity: event.last_executed_quantity.to_string(),
        last_executed_price: event.last_executed_price.to_string(),
        transaction_time: event.transaction_time,
        trade_id: event.trade_id,
        in_order_book: event.in_order_book,
        is_maker_side: event.is_maker_side,
    }
}

/// Parses the comma-or-JSON-array interval list `OnKlinesUpdateRequest.interval`
/// carries (the proto field is a single string doing double duty, §6).
pub fn parse_kline_channels(raw: &str) -> Result<Vec<MarketChannel>, Status> {
    let trimmed = raw.trim();
    let inner = trimmed.trim_start_matches('[').trim_end_matches(']');
    inner
        .split(',')
        .map(str::trim)
        .map(|token| token.trim_matches('"'))
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<gateway_domain::Interval>()
                .map(MarketChannel::Kline)
                .map_err(|_| Status::invalid_argument(format!("unrecognized interval: {token}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_domain::Interval;

    #[test]
    fn rate_limited_maps_to_resource_exhausted() {
        let status = gateway_error_to_status(GatewayError::rate_limited("too fast"));
        assert_eq!(status.code(), tonic::Code::ResourceExhausted);
    }

    #[test]
    fn validation_maps_to_failed_precondition() {
        let status = gateway_error_to_status(GatewayError::validation("bad side"));
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);
    }

    #[test]
    fn upstream_maps_to_unknown() {
        let status = gateway_error_to_status(GatewayError::upstream("502"));
        assert_eq!(status.code(), tonic::Code::Unknown);
    }

    #[test]
    fn parse_kline_channels_accepts_a_json_array() {
        let channels = parse_kline_channels(r#"["1m","1h"]"#).unwrap();
        assert_eq!(channels.len(), 2);
        assert!(matches!(channels[0], MarketChannel::Kline(Interval::OneMinute)));
        assert!(matches!(channels[1], MarketChannel::Kline(Interval::OneHour)));
    }

    #[test]
    fn parse_kline_channels_rejects_unknown_interval() {
        assert!(parse_kline_channels("2m").is_err());
    }
}
