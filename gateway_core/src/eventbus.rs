//! Event bus (C7): registry of `eventKey -> handler set`, wrap + fire.
//! Handlers are bounded-queue senders; `fire` never blocks indefinitely on a
//! full queue, matching §5's back-pressure-by-disconnect policy.

use dashmap::DashMap;
use gateway_domain::{CanonicalEvent, VenueTag};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

pub type Handler = mpsc::Sender<CanonicalEvent>;

/// Raised by `fire` when a queue is full; the caller (the stream decode
/// loop, §4.6) tears down the whole tradeId's listeners on receipt (§5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOverflow {
    pub event_key: String,
}

pub struct EventBus {
    handlers: DashMap<String, Vec<(String, Handler)>>,
    registered_streams: DashMap<VenueTag, HashMap<String, HashSet<String>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            registered_streams: DashMap::new(),
        }
    }

    /// `registerEvent(handler, eventKey, venueTag, tradeId)` (§4.7):
    /// idempotent add — registering the same `(tradeId, handler)` under the
    /// same key twice still yields one entry.
    pub fn register_event(&self, trade_id: &str, handler: Handler, event_key: &str, venue: VenueTag) {
        let mut entry = self.handlers.entry(event_key.to_string()).or_default();
        if !entry.iter().any(|(existing_trade_id, _)| existing_trade_id == trade_id) {
            entry.push((trade_id.to_string(), handler));
        }
        drop(entry);

        self.registered_streams
            .entry(venue)
            .or_default()
            .entry(trade_id.to_string())
            .or_default()
            .insert(event_key.to_string());
    }

    /// `registerUserEvent(handler, eventKey)` (§4.7): same, venue-less.
    /// User-stream events (`executionReport`, `outboundAccountPosition`)
    /// aren't scoped to a single venue tag in the registry.
    pub fn register_user_event(&self, trade_id: &str, handler: Handler, event_key: &str) {
        let mut entry = self.handlers.entry(event_key.to_string()).or_default();
        if !entry.iter().any(|(existing_trade_id, _)| existing_trade_id == trade_id) {
            entry.push((trade_id.to_string(), handler));
        }
    }

    /// `wrap(content)` is implemented at the parser layer (each venue's
    /// frame decoder directly constructs a [`CanonicalEvent`]); this bus only
    /// dispatches already-wrapped events by their key.
    pub fn fire(&self, event_key: &str, event: CanonicalEvent) -> Result<(), QueueOverflow> {
        let Some(subscribers) = self.handlers.get(event_key) else {
            return Ok(());
        };

        for (_, handler) in subscribers.iter() {
            match handler.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    return Err(QueueOverflow {
                        event_key: event_key.to_string(),
                    });
                }
                // Late unregistration: a fired handler into a closed queue
                // drops silently (§4.7, §5).
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        Ok(())
    }

    /// `unregister(venueTag, tradeId)` (§4.7): remove all stream keys and
    /// handlers scoped to that tradeId.
    pub fn unregister(&self, venue: VenueTag, trade_id: &str) {
        if let Some((_, mut trade_map)) = self.registered_streams.remove(venue) {
            trade_map.remove(trade_id);
            if !trade_map.is_empty() {
                self.registered_streams.insert(venue, trade_map);
            }
        }
        self.unregister_key_entries(trade_id);
    }

    /// User-stream events have no venue scoping; removed by tradeId alone.
    pub fn unregister_user(&self, trade_id: &str) {
        self.unregister_key_entries(trade_id);
    }

    fn unregister_key_entries(&self, trade_id: &str) {
        self.handlers.retain(|_, subscribers| {
            subscribers.retain(|(existing_trade_id, _)| existing_trade_id != trade_id);
            !subscribers.is_empty()
        });
    }

    pub fn subscriber_count(&self, event_key: &str) -> usize {
        self.handlers.get(event_key).map(|v| v.len()).unwrap_or(0)
    }

    /// Number of market streams currently registered for `(venue, tradeId)`;
    /// backs `StartStream`'s busy-wait on `expectedMarketStreamCount` (§4.8).
    pub fn registered_stream_count(&self, venue: VenueTag, trade_id: &str) -> usize {
        self.registered_streams
            .get(&venue)
            .and_then(|m| m.get(trade_id).map(|s| s.len()))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_domain::{CanonicalEvent, MiniTickerEvent};
    use rust_decimal_macros::dec;

    fn sample_event() -> CanonicalEvent {
        CanonicalEvent::MiniTicker(MiniTickerEvent {
            symbol: "BTCUSDT".into(),
            event_time: 0,
            close_price: dec!(1),
            open_price: dec!(1),
            high_price: dec!(1),
            low_price: dec!(1),
            base_volume: dec!(1),
            quote_volume: dec!(1),
        })
    }

    #[tokio::test]
    async fn register_event_is_idempotent_for_the_same_trade_id() {
        let bus = EventBus::new();
        let (tx, _rx) = mpsc::channel(8);
        bus.register_event("trade-1", tx.clone(), "BTCUSDT@miniTicker", VenueTag::Reference);
        bus.register_event("trade-1", tx, "BTCUSDT@miniTicker", VenueTag::Reference);
        assert_eq!(bus.subscriber_count("BTCUSDT@miniTicker"), 1);
    }

    #[tokio::test]
    async fn fire_delivers_to_every_registered_handler() {
        let bus = EventBus::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        bus.register_event("t1", tx1, "BTCUSDT@miniTicker", VenueTag::Reference);
        bus.register_event("t2", tx2, "BTCUSDT@miniTicker", VenueTag::Reference);

        bus.fire("BTCUSDT@miniTicker", sample_event()).unwrap();

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn fire_reports_overflow_without_panicking() {
        let bus = EventBus::new();
        let (tx, _rx) = mpsc::channel(1);
        bus.register_event("t1", tx, "BTCUSDT@miniTicker", VenueTag::Reference);
        bus.fire("BTCUSDT@miniTicker", sample_event()).unwrap();
        let result = bus.fire("BTCUSDT@miniTicker", sample_event());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unregister_removes_all_handlers_for_trade_id() {
        let bus = EventBus::new();
        let (tx, _rx) = mpsc::channel(8);
        bus.register_event("t1", tx, "BTCUSDT@miniTicker", VenueTag::Reference);
        bus.unregister(VenueTag::Reference, "t1");
        assert_eq!(bus.subscriber_count("BTCUSDT@miniTicker"), 0);
        assert_eq!(bus.registered_stream_count(VenueTag::Reference, "t1"), 0);
    }

    #[tokio::test]
    async fn fire_on_unknown_key_is_a_silent_noop() {
        let bus = EventBus::new();
        assert!(bus.fire("nobody-subscribed", sample_event()).is_ok());
    }

}
