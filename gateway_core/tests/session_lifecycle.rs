//! End-to-end exercise of the session registry, event bus, and the
//! race-buffer healing path (§3, §4.5, §4.8, §8 scenario 4), the way
//! purefinance-mmb's own `tests/lifecycle.rs` drives its trading engine
//! top-to-bottom rather than unit-testing each piece in isolation.

use std::sync::Arc;

use async_trait::async_trait;
use gateway_core::venues::stream::reference_on_message;
use gateway_core::venues::{LoadedVenueInfo, NewOrder, OrderBookTop, SymbolPriceTicker, TickerStatistics, VenueClient};
use gateway_core::{EventBus, SessionRegistry};
use gateway_domain::{
    Balance, Candle, CanonicalEvent, CanonicalOrder, CanonicalTrade, GatewayError, Interval, OrderCancelling, VenueTag,
};

struct StubVenueClient;

#[async_trait]
impl VenueClient for StubVenueClient {
    fn venue_tag(&self) -> VenueTag {
        VenueTag::Reference
    }

    async fn load(&self) -> Result<LoadedVenueInfo, GatewayError> {
        Ok(LoadedVenueInfo::default())
    }

    async fn fetch_server_time(&self) -> Result<i64, GatewayError> {
        Ok(0)
    }

    async fn fetch_order_book(&self, _symbol: &str, _limit: u32) -> Result<OrderBookTop, GatewayError> {
        unimplemented!()
    }

    async fn fetch_klines(
        &self,
        _symbol: &str,
        _interval: Interval,
        _limit: u32,
        _start: Option<i64>,
        _end: Option<i64>,
    ) -> Result<Vec<Candle>, GatewayError> {
        unimplemented!()
    }

    async fn create_order(&self, _order: NewOrder) -> Result<CanonicalOrder, GatewayError> {
        unimplemented!()
    }

    async fn fetch_order(&self, _symbol: &str, _order_id: i64) -> Result<CanonicalOrder, GatewayError> {
        unimplemented!()
    }

    async fn cancel_order(&self, _order: OrderCancelling) -> Result<CanonicalOrder, GatewayError> {
        unimplemented!()
    }

    async fn cancel_all_orders(&self, _symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        unimplemented!()
    }

    async fn fetch_open_orders(&self, _symbol: &str) -> Result<Vec<CanonicalOrder>, GatewayError> {
        unimplemented!()
    }

    async fn fetch_account_information(&self) -> Result<Vec<Balance>, GatewayError> {
        unimplemented!()
    }

    async fn fetch_funding_wallet(&self, _asset: Option<&str>, _need_btc_valuation: bool) -> Result<Vec<Balance>, GatewayError> {
        unimplemented!()
    }

    async fn fetch_account_trade_list(&self, _symbol: &str, _start_time: Option<i64>, _limit: u32) -> Result<Vec<CanonicalTrade>, GatewayError> {
        unimplemented!()
    }

    async fn fetch_symbol_price_ticker(&self, _symbol: &str) -> Result<SymbolPriceTicker, GatewayError> {
        unimplemented!()
    }

    async fn fetch_ticker_price_change_statistics(&self, _symbol: &str) -> Result<TickerStatistics, GatewayError> {
        unimplemented!()
    }
}

fn stub_client() -> Arc<dyn VenueClient> {
    Arc::new(StubVenueClient)
}

/// Opens a session, subscribes a market stream handler through the real
/// `EventBus`, and confirms a fired event reaches the receiver end the RPC
/// stream handler would be holding — the same path `start_market_stream`
/// wires up, minus the actual WebSocket.
#[tokio::test]
async fn market_event_reaches_its_registered_subscriber() {
    let registry = SessionRegistry::new();
    let session = registry.open_session("acct-1", VenueTag::Reference, stub_client);
    session.ensure_loaded().await.expect("stub load always succeeds");

    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    session
        .event_bus
        .register_event("trade-1", tx, "BTCUSDT@miniTicker", VenueTag::Reference);
    session.await_market_stream_count("trade-1", 1).await;

    let frame = serde_json::json!({"e": "24hrMiniTicker", "s": "BTCUSDT", "c": "100", "v": "1"}).to_string();
    let outcome = reference_on_message(&session.event_bus, session.active_orders(), &frame);
    assert!(matches!(outcome, gateway_core::connectivity::FrameOutcome::DataReceived));

    let event = rx.try_recv().expect("subscriber should have received the fired event");
    assert!(matches!(event, CanonicalEvent::MiniTicker(_)));
}

/// `StopStream` (§4.8, §8 scenario 6): cancelling a tradeId's token and
/// unregistering it from the bus must close the receiver side without an
/// error, the way a gRPC stream handler blocked on `rx.recv()` observes it.
#[tokio::test]
async fn stop_stream_closes_the_subscribers_channel() {
    let registry = SessionRegistry::new();
    let session = registry.open_session("acct-1", VenueTag::Reference, stub_client);

    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    session
        .event_bus
        .register_event("trade-1", tx, "BTCUSDT@miniTicker", VenueTag::Reference);
    assert_eq!(session.event_bus.subscriber_count("BTCUSDT@miniTicker"), 1);

    session.stop_stream("trade-1");

    assert_eq!(session.event_bus.subscriber_count("BTCUSDT@miniTicker"), 0);
    assert!(rx.recv().await.is_none());
}

/// §3/§8 scenario 4's race-buffer healing: a fill that arrives over the
/// private WSS stream must latch `activeOrders[id].lastEvent` so a consumer
/// that only opens its own registration afterward still sees the terminal
/// report, by reading the session's `active_orders` table directly.
#[tokio::test]
async fn a_fully_filled_order_is_latched_for_late_subscribers() {
    let registry = SessionRegistry::new();
    let session = registry.open_session("acct-2", VenueTag::Reference, stub_client);

    let bus = EventBus::new();
    let frame = serde_json::json!({
        "e": "executionReport", "s": "BTCUSDT", "i": 42, "g": -1, "c": "client-1",
        "p": "100", "q": "2", "z": "2", "Z": "200", "X": "FILLED", "f": "GTC",
        "o": "LIMIT", "S": "BUY", "O": 1, "T": 2, "w": false, "x": "TRADE",
        "l": "2", "L": "100", "t": 9, "m": true
    })
    .to_string();

    reference_on_message(&bus, session.active_orders(), &frame);

    let orders = session.active_orders().lock();
    let entry = orders.get(&42).expect("order 42 should be tracked after the fill");
    assert_eq!(entry.executed_qty, entry.orig_qty);
    assert!(entry.last_event.is_some(), "a fully filled order must latch its terminal report");
}
