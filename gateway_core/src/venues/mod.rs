//! Venue client (C5): one capability set implemented per venue, replacing
//! the tag-dispatch a scripting-language port would reach for. The session
//! registry holds `Arc<dyn VenueClient>` and never matches on a venue tag
//! itself — only adapters know their own venue.

pub mod reference;
pub mod stream;
pub mod venue_b;
pub mod venue_c;
pub mod venue_d;

use async_trait::async_trait;
use gateway_domain::{
    Balance, CanonicalOrder, CanonicalTrade, Candle, ExecutionReportEvent, GatewayError, Interval,
    OrderCancelling, OrderSide, OrderType, Symbol, VenueTag,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Top-5 order book snapshot returned by `fetchOrderBook` (§3, §8 scenario 3).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookTop {
    pub last_update_id: i64,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolPriceTicker {
    pub symbol: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerStatistics {
    pub symbol: String,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub last_price: Decimal,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
}

/// Everything needed to place a new order, already validated by the caller
/// side of the RPC façade but refined (tickSize/stepSize) by the adapter.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub qty: Option<Decimal>,
    pub quote_order_qty: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub client_order_id: Option<String>,
}

/// Loaded venue state populated by `load()` (§4.5); held by the session and
/// consulted by adapters for refinement and precision decisions.
#[derive(Debug, Clone, Default)]
pub struct LoadedVenueInfo {
    pub symbols: HashMap<String, Symbol>,
    pub highest_precision: u32,
    pub spot_account_id: Option<String>,
}

/// The capability set every venue adapter implements. The façade (C8) holds
/// `Arc<dyn VenueClient>` and calls straight through; there is no tag switch
/// anywhere above this trait.
#[async_trait]
pub trait VenueClient: Send + Sync {
    fn venue_tag(&self) -> VenueTag;

    async fn load(&self) -> Result<LoadedVenueInfo, GatewayError>;

    async fn fetch_server_time(&self) -> Result<i64, GatewayError>;

    async fn fetch_order_book(&self, symbol: &str, limit: u32) -> Result<OrderBookTop, GatewayError>;

    async fn fetch_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Candle>, GatewayError>;

    async fn create_order(&self, order: NewOrder) -> Result<CanonicalOrder, GatewayError>;

    async fn fetch_order(&self, symbol: &str, order_id: i64) -> Result<CanonicalOrder, GatewayError>;

    async fn cancel_order(&self, order: OrderCancelling) -> Result<CanonicalOrder, GatewayError>;

    async fn cancel_all_orders(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError>;

    /// `FetchOpenOrders` (§6): every resting order for `symbol`, without
    /// cancelling anything — the read-only half of what `cancel_all_orders`
    /// already has to fetch internally.
    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError>;

    async fn fetch_account_information(&self) -> Result<Vec<Balance>, GatewayError>;

    async fn fetch_funding_wallet(
        &self,
        asset: Option<&str>,
        need_btc_valuation: bool,
    ) -> Result<Vec<Balance>, GatewayError>;

    async fn fetch_account_trade_list(
        &self,
        symbol: &str,
        start_time: Option<i64>,
        limit: u32,
    ) -> Result<Vec<CanonicalTrade>, GatewayError>;

    async fn fetch_symbol_price_ticker(&self, symbol: &str) -> Result<SymbolPriceTicker, GatewayError>;

    async fn fetch_ticker_price_change_statistics(
        &self,
        symbol: &str,
    ) -> Result<TickerStatistics, GatewayError>;

    /// Listen-key handshake for the private user stream (§4.6 Keepalive).
    /// Only the reference venue's private stream is keyed this way; every
    /// other venue authenticates its WSS connection directly and returns
    /// `Ok(None)` here.
    async fn obtain_listen_key(&self) -> Result<Option<String>, GatewayError> {
        Ok(None)
    }

    /// Renews a listen key obtained from [`Self::obtain_listen_key`] on the
    /// cadence in [`crate::connectivity::REFERENCE_LISTEN_KEY_RENEWAL_INTERVAL`].
    /// No-op for venues that don't use listen keys.
    async fn keepalive_listen_key(&self, _listen_key: &str) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Garbage-collects `activeOrders` entries (§4.5 helper). Entries absent
/// from `open_ids` get a 30-minute grace window (`now + 30m`) before they're
/// dropped, so late WSS frames for a just-filled order still have somewhere
/// to land; entries whose grace window has already elapsed are removed.
pub fn active_orders_clear(
    active_orders: &mut HashMap<i64, ActiveOrderEntry>,
    open_ids: &[i64],
    now_millis: i64,
) {
    const GRACE_MILLIS: i64 = 30 * 60 * 1000;

    for (&id, entry) in active_orders.iter_mut() {
        if !open_ids.contains(&id) && entry.filled_time.is_none() {
            entry.filled_time = Some(now_millis + GRACE_MILLIS);
        }
    }
    active_orders.retain(|_, entry| match entry.filled_time {
        Some(filled_time) => filled_time > now_millis,
        None => true,
    });
}

#[derive(Debug, Clone, Default)]
pub struct ActiveOrderEntry {
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub filled_time: Option<i64>,
    pub cancelled: bool,
    /// Latched once `executed_qty` reaches `orig_qty` (§3 invariant): the WSS
    /// decode loop stores the report that filled the order here so a late
    /// subscriber (one that opened its stream after the fill already
    /// happened) can still be handed the terminal report instead of nothing.
    pub last_event: Option<ExecutionReportEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_orders_clear_grants_grace_window_to_dropped_entries() {
        let mut active_orders = HashMap::new();
        active_orders.insert(1, ActiveOrderEntry::default());
        active_orders.insert(2, ActiveOrderEntry::default());

        active_orders_clear(&mut active_orders, &[1], 1_000);

        assert!(active_orders.contains_key(&1));
        assert!(active_orders.contains_key(&2));
        assert_eq!(
            active_orders.get(&2).unwrap().filled_time,
            Some(1_000 + 30 * 60 * 1000)
        );
    }

    #[test]
    fn active_orders_clear_drops_entries_past_grace_window() {
        let mut active_orders = HashMap::new();
        active_orders.insert(2, ActiveOrderEntry {
            filled_time: Some(500),
            ..Default::default()
        });

        active_orders_clear(&mut active_orders, &[], 1_000);

        assert!(!active_orders.contains_key(&2));
    }
}
