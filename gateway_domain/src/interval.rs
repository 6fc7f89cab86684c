use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The canonical kline interval set (§4.2). Every venue's native interval
/// strings round-trip through this set via its own parser table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    FourHours,
    OneDay,
    OneWeek,
    OneMonth,
}

impl Interval {
    pub const ALL: [Interval; 9] = [
        Interval::OneMinute,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::FourHours,
        Interval::OneDay,
        Interval::OneWeek,
        Interval::OneMonth,
    ];

    /// The reference venue's own interval string, e.g. `1h`, `1w`, `1M`.
    pub fn canonical_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
            Interval::OneWeek => "1w",
            Interval::OneMonth => "1M",
        }
    }

    pub fn seconds(&self) -> u64 {
        match self {
            Interval::OneMinute => 60,
            Interval::FiveMinutes => 300,
            Interval::FifteenMinutes => 900,
            Interval::ThirtyMinutes => 1_800,
            Interval::OneHour => 3_600,
            Interval::FourHours => 14_400,
            Interval::OneDay => 86_400,
            Interval::OneWeek => 604_800,
            Interval::OneMonth => 2_592_000,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalParseError(pub String);

impl fmt::Display for IntervalParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized canonical interval: {}", self.0)
    }
}
impl std::error::Error for IntervalParseError {}

impl FromStr for Interval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.canonical_str() == s)
            .ok_or_else(|| IntervalParseError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: rust_decimal::Decimal,
    pub high: rust_decimal::Decimal,
    pub low: rust_decimal::Decimal,
    pub close: rust_decimal::Decimal,
    pub volume: rust_decimal::Decimal,
    pub close_time: i64,
    pub quote_volume: rust_decimal::Decimal,
    pub num_trades: i64,
    pub taker_buy_base_volume: rust_decimal::Decimal,
    pub taker_buy_quote_volume: rust_decimal::Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_round_trips_through_canonical_str() {
        for interval in Interval::ALL {
            let parsed: Interval = interval.canonical_str().parse().expect("round trip");
            assert_eq!(parsed, interval);
        }
    }
}
