//! Stateful per-subscription filters applied by the frame handler before a
//! decoded event reaches the event bus (§4.6 DEDUPE / CANDLE ORDERING /
//! ORDERBOOK VERIFY).

use rand::Rng;
use rust_decimal::Decimal;
use std::time::Duration;

/// `sleep = rand(1..10)·tryCount` reconnect backoff (§4.6 CONNECT).
pub fn reconnect_backoff(try_count: u32) -> Duration {
    let jitter_secs: u64 = rand::thread_rng().gen_range(1..=10);
    Duration::from_secs(jitter_secs * try_count.max(1) as u64)
}

/// Ticker dedupe: only forward when `lastPrice` changed since the previous
/// forwarded value for this subscription.
#[derive(Debug, Default)]
pub struct TickerDedupe {
    last_price: Option<Decimal>,
}

impl TickerDedupe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` (forward) the first time, and whenever `price` differs
    /// from the previously forwarded price.
    pub fn should_forward(&mut self, price: Decimal) -> bool {
        if self.last_price == Some(price) {
            return false;
        }
        self.last_price = Some(price);
        true
    }
}

/// Venue B candle ordering: forward only if `start_time` is non-decreasing.
#[derive(Debug, Default)]
pub struct CandleOrderGuard {
    last_start_time: Option<i64>,
}

impl CandleOrderGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_forward(&mut self, start_time: i64) -> bool {
        if let Some(last) = self.last_start_time {
            if start_time < last {
                return false;
            }
        }
        self.last_start_time = Some(start_time);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ticker_dedupe_forwards_first_price_then_suppresses_repeats() {
        let mut dedupe = TickerDedupe::new();
        assert!(dedupe.should_forward(dec!(100)));
        assert!(!dedupe.should_forward(dec!(100)));
        assert!(dedupe.should_forward(dec!(101)));
    }

    #[test]
    fn candle_order_guard_rejects_out_of_order_start_times() {
        let mut guard = CandleOrderGuard::new();
        assert!(guard.should_forward(100));
        assert!(guard.should_forward(200));
        assert!(!guard.should_forward(150));
        assert!(guard.should_forward(200));
    }

    #[test]
    fn reconnect_backoff_scales_with_try_count_and_stays_in_range() {
        for try_count in 1..=5 {
            let backoff = reconnect_backoff(try_count);
            assert!(backoff.as_secs() >= 1 && backoff.as_secs() <= 10 * try_count as u64);
        }
    }
}
