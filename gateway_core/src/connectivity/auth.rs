//! AUTHENTICATE payload construction (§4.6). Each function returns the
//! string to be HMAC-signed by [`crate::signer::sign`]; the caller pairs it
//! with the venue's API key and sends the resulting signed frame.

/// Venue B: `"AUTH<ts>"`.
pub fn venue_b_auth_payload(timestamp_ms: i64) -> String {
    format!("AUTH{timestamp_ms}")
}

/// Venue C: `"<ts>websocket_login"`.
pub fn venue_c_auth_payload(timestamp_ms: i64) -> String {
    format!("{timestamp_ms}websocket_login")
}

/// Venue D: canonical `timestamp + method + path_and_query` string, the same
/// shape its REST signer uses (`venues::venue_d::sign`), just against the
/// fixed login path rather than a REST request.
pub fn venue_d_auth_payload(timestamp_secs: i64, method: &str, path_and_query: &str) -> String {
    format!("{timestamp_secs}{method}{path_and_query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_b_payload_prefixes_auth() {
        assert_eq!(venue_b_auth_payload(1_700_000_000_000), "AUTH1700000000000");
    }

    #[test]
    fn venue_c_payload_suffixes_websocket_login() {
        assert_eq!(venue_c_auth_payload(1_700_000_000), "1700000000websocket_login");
    }

    #[test]
    fn venue_d_payload_concatenates_canonical_parts() {
        let payload = venue_d_auth_payload(1_700_000_000, "GET", "/users/self/verify");
        assert_eq!(payload, "1700000000GET/users/self/verify");
    }
}
