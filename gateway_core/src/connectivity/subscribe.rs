//! SUBSCRIBE frame channel-name mapping (§4.6): `miniTicker → ticker`,
//! `depth5 → orderbook/book/depth.step0`, `kline_<tf> → candles_<tf>/
//! market.<sym>.kline.<tf-native>`. The spec names these conventions but
//! doesn't pin which literal string goes with which venue beyond the implied
//! B/C/D ordering used throughout §4; we follow that ordering here and record
//! it as a decision (see DESIGN.md), the same way the order-book checksum
//! algorithm is a documented-convention stand-in.

use gateway_domain::{Interval, VenueTag};

pub fn mini_ticker_channel(venue: VenueTag, symbol: &str) -> String {
    match venue {
        VenueTag::Reference => format!("{}@miniTicker", symbol.to_lowercase()),
        VenueTag::VenueB | VenueTag::VenueC | VenueTag::VenueD => "ticker".to_string(),
    }
}

pub fn depth5_channel(venue: VenueTag, symbol: &str) -> String {
    match venue {
        VenueTag::Reference => format!("{}@depth5", symbol.to_lowercase()),
        VenueTag::VenueB => "orderbook".to_string(),
        VenueTag::VenueC => "book".to_string(),
        VenueTag::VenueD => "depth.step0".to_string(),
    }
}

pub fn kline_channel(venue: VenueTag, symbol: &str, interval: Interval) -> String {
    let native = interval.canonical_str();
    match venue {
        VenueTag::Reference => format!("{}@kline_{native}", symbol.to_lowercase()),
        VenueTag::VenueB | VenueTag::VenueC => format!("candles_{native}"),
        VenueTag::VenueD => format!("market.{}.kline.{native}", symbol.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_channels_embed_the_lowercased_symbol() {
        assert_eq!(mini_ticker_channel(VenueTag::Reference, "BTCUSDT"), "btcusdt@miniTicker");
        assert_eq!(depth5_channel(VenueTag::Reference, "BTCUSDT"), "btcusdt@depth5");
    }

    #[test]
    fn alternate_venues_use_the_documented_depth_channel_names() {
        assert_eq!(depth5_channel(VenueTag::VenueB, "XBTUSD"), "orderbook");
        assert_eq!(depth5_channel(VenueTag::VenueC, "tBTCUSD"), "book");
        assert_eq!(depth5_channel(VenueTag::VenueD, "BTC-USDT"), "depth.step0");
    }

    #[test]
    fn kline_channel_threads_the_native_interval_string() {
        assert_eq!(kline_channel(VenueTag::VenueB, "XBTUSD", Interval::OneMinute), "candles_1m");
        assert_eq!(
            kline_channel(VenueTag::VenueD, "BTC-USDT", Interval::OneMinute),
            "market.btc-usdt.kline.1m"
        );
    }
}
