use chrono::{DateTime, TimeZone, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

pub type GatewayTime = DateTime<Utc>;

/// Current wall-clock time in milliseconds since the Unix epoch, the shape every
/// venue's `timestamp` query parameter expects.
pub fn get_current_milliseconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}

pub fn u64_to_date_time(millis: u64) -> GatewayTime {
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .expect("millis out of range for a valid timestamp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_millis() {
        let now = get_current_milliseconds();
        let dt = u64_to_date_time(now);
        assert_eq!(dt.timestamp_millis() as u64, now);
    }
}
