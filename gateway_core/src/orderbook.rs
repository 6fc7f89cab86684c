//! Order-book reconstructor (C3). Per §9's redesign flag this uses an
//! ordered container keyed by decimal price rather than a mutable sequence;
//! `BTreeMap` gives us that natively, with bids ordered by `Reverse(price)`
//! so the best bid is always the first entry.

use gateway_domain::VenueTag;
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookTop5 {
    pub last_update_id: i64,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

/// One delta-stream level record. Venue B's wire shape is literally
/// `[price, count, amount]` (§4.3); other venues' deltas are normalized into
/// this same shape by their parser before reaching the reconstructor.
#[derive(Debug, Clone, Copy)]
pub struct DeltaLevel {
    pub price: Decimal,
    pub count: u32,
    pub amount: Decimal,
}

pub struct OrderBookReconstructor {
    venue: VenueTag,
    symbol: String,
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
    last_update_id: i64,
}

impl OrderBookReconstructor {
    /// `constructor(snapshot, symbol)` (§4.3): seed bids/asks, descending bid
    /// ascending ask.
    pub fn new(venue: VenueTag, symbol: impl Into<String>, snapshot: OrderBookTop5) -> Self {
        let mut reconstructor = Self {
            venue,
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update_id: snapshot.last_update_id,
        };
        for (price, qty) in snapshot.bids {
            reconstructor.bids.insert(Reverse(price), qty);
        }
        for (price, qty) in snapshot.asks {
            reconstructor.asks.insert(price, qty);
        }
        reconstructor
    }

    pub fn venue(&self) -> VenueTag {
        self.venue
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// `update(delta)` for venue B's `[price, count, amount]` semantics
    /// (§4.3): `count==0` removes the level; else `amount>0` upserts a bid,
    /// `amount<0` upserts an ask at `|amount|`.
    pub fn apply_venue_b_delta(&mut self, delta: DeltaLevel, update_id: i64) {
        if delta.count == 0 {
            self.bids.remove(&Reverse(delta.price));
            self.asks.remove(&delta.price);
        } else if delta.amount > Decimal::ZERO {
            self.bids.insert(Reverse(delta.price), delta.amount);
        } else {
            self.asks.insert(delta.price, -delta.amount);
        }
        self.last_update_id = update_id;
    }

    /// Venue D re-seeds wholesale on a `partial` event.
    pub fn reseed(&mut self, snapshot: OrderBookTop5) {
        self.bids.clear();
        self.asks.clear();
        for (price, qty) in snapshot.bids {
            self.bids.insert(Reverse(price), qty);
        }
        for (price, qty) in snapshot.asks {
            self.asks.insert(price, qty);
        }
        self.last_update_id = snapshot.last_update_id;
    }

    /// Upsert/remove for venues (like D) whose deltas are plain
    /// `(price, qty)` pairs with `qty == 0` meaning removal.
    pub fn apply_level(&mut self, side: Side, price: Decimal, qty: Decimal, update_id: i64) {
        match side {
            Side::Bid if qty.is_zero() => {
                self.bids.remove(&Reverse(price));
            }
            Side::Bid => {
                self.bids.insert(Reverse(price), qty);
            }
            Side::Ask if qty.is_zero() => {
                self.asks.remove(&price);
            }
            Side::Ask => {
                self.asks.insert(price, qty);
            }
        }
        self.last_update_id = update_id;
    }

    /// `snapshotTop5()` (§4.3): `{lastUpdateId, bids, asks}` trimmed to top 5.
    pub fn snapshot_top5(&self) -> OrderBookTop5 {
        OrderBookTop5 {
            last_update_id: self.last_update_id,
            bids: self.bids.iter().take(5).map(|(Reverse(price), qty)| (*price, *qty)).collect(),
            asks: self.asks.iter().take(5).map(|(price, qty)| (*price, *qty)).collect(),
        }
    }

    /// Venue D's running checksum over the top-N levels (§4.3, §9 open
    /// question: the exact algorithm is venue-specified; CRC32 over
    /// `price:qty` pairs interleaved bid/ask is the documented convention
    /// this implementation follows).
    pub fn checksum(&self, depth: usize) -> u32 {
        let mut buffer = String::new();
        let bids: Vec<_> = self.bids.iter().take(depth).collect();
        let asks: Vec<_> = self.asks.iter().take(depth).collect();
        for i in 0..depth {
            if let Some((Reverse(price), qty)) = bids.get(i) {
                buffer.push_str(&format!("{price}:{qty}:"));
            }
            if let Some((price, qty)) = asks.get(i) {
                buffer.push_str(&format!("{price}:{qty}:"));
            }
        }
        crc32(buffer.as_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

fn crc32(bytes: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB88320;
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in bytes {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLY & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_snapshot() -> OrderBookTop5 {
        OrderBookTop5 {
            last_update_id: 1,
            bids: vec![(dec!(10), dec!(1)), (dec!(9), dec!(2)), (dec!(8), dec!(3)), (dec!(7), dec!(4)), (dec!(6), dec!(5))],
            asks: vec![(dec!(11), dec!(1)), (dec!(12), dec!(2)), (dec!(13), dec!(3)), (dec!(14), dec!(4)), (dec!(15), dec!(5))],
        }
    }

    #[test]
    fn snapshot_top5_matches_scenario_3_ordering() {
        let reconstructor = OrderBookReconstructor::new(VenueTag::Reference, "BTCUSDT", sample_snapshot());
        let top = reconstructor.snapshot_top5();
        assert_eq!(top.bids, vec![(dec!(10), dec!(1)), (dec!(9), dec!(2)), (dec!(8), dec!(3)), (dec!(7), dec!(4)), (dec!(6), dec!(5))]);
        assert_eq!(top.asks, vec![(dec!(11), dec!(1)), (dec!(12), dec!(2)), (dec!(13), dec!(3)), (dec!(14), dec!(4)), (dec!(15), dec!(5))]);
    }

    #[test]
    fn venue_b_delta_with_zero_count_removes_level() {
        let mut reconstructor = OrderBookReconstructor::new(VenueTag::VenueB, "XBTUSD", sample_snapshot());
        reconstructor.apply_venue_b_delta(DeltaLevel { price: dec!(10), count: 0, amount: dec!(0) }, 2);
        let top = reconstructor.snapshot_top5();
        assert!(!top.bids.iter().any(|(p, _)| *p == dec!(10)));
    }

    #[test]
    fn venue_b_delta_positive_amount_upserts_bid_negative_upserts_ask() {
        let mut reconstructor = OrderBookReconstructor::new(VenueTag::VenueB, "XBTUSD", sample_snapshot());
        reconstructor.apply_venue_b_delta(DeltaLevel { price: dec!(10.5), count: 1, amount: dec!(2) }, 2);
        reconstructor.apply_venue_b_delta(DeltaLevel { price: dec!(10.8), count: 1, amount: dec!(-3) }, 3);
        let top = reconstructor.snapshot_top5();
        assert!(top.bids.iter().any(|(p, q)| *p == dec!(10.5) && *q == dec!(2)));
        assert!(top.asks.iter().any(|(p, q)| *p == dec!(10.8) && *q == dec!(3)));
    }

    #[test]
    fn reseed_replaces_entire_book() {
        let mut reconstructor = OrderBookReconstructor::new(VenueTag::VenueD, "BTC-USDT", sample_snapshot());
        let fresh = OrderBookTop5 {
            last_update_id: 99,
            bids: vec![(dec!(1), dec!(1))],
            asks: vec![(dec!(2), dec!(1))],
        };
        reconstructor.reseed(fresh.clone());
        assert_eq!(reconstructor.snapshot_top5(), fresh);
    }

    #[test]
    fn checksum_is_deterministic_for_same_book_state() {
        let reconstructor = OrderBookReconstructor::new(VenueTag::VenueD, "BTC-USDT", sample_snapshot());
        assert_eq!(reconstructor.checksum(5), reconstructor.checksum(5));
    }

    #[test]
    fn checksum_changes_when_book_state_changes() {
        let mut reconstructor = OrderBookReconstructor::new(VenueTag::VenueD, "BTC-USDT", sample_snapshot());
        let before = reconstructor.checksum(5);
        reconstructor.apply_level(Side::Bid, dec!(10), dec!(999), 2);
        let after = reconstructor.checksum(5);
        assert_ne!(before, after);
    }
}
