//! Per-venue auth signatures (§4.1, C1). Pure function, no state: given a
//! venue tag, the account's secret, and the exact payload bytes that will be
//! sent, produce the signature string the venue expects back in the request.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use gateway_domain::VenueTag;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};

type HmacSha256 = Hmac<Sha256>;
type HmacSha384 = Hmac<Sha384>;

/// Computes the canonical signature for `payload` under `secret`, per venue:
/// - Reference venue & venue D: HMAC-SHA256, hex.
/// - Venue C: HMAC-SHA384, hex.
/// - Venue B: HMAC-SHA256, raw bytes base64-encoded.
pub fn sign(venue: VenueTag, secret: &[u8], payload: &[u8]) -> String {
    match venue {
        VenueTag::Reference | VenueTag::VenueD => hex::encode(hmac_sha256_bytes(secret, payload)),
        VenueTag::VenueC => hex::encode(hmac_sha384_bytes(secret, payload)),
        VenueTag::VenueB => BASE64_STANDARD.encode(hmac_sha256_bytes(secret, payload)),
    }
}

fn hmac_sha256_bytes(secret: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

fn hmac_sha384_bytes(secret: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha384::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vector taken from the reference venue's own API documentation example.
    #[test]
    fn reference_signature_matches_known_vector() {
        let secret = b"NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let payload = b"symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";

        let signature = sign(VenueTag::Reference, secret, payload);

        assert_eq!(
            signature,
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b1b"
        );
    }

    #[test]
    fn venue_d_uses_sha256_hex_like_reference() {
        let secret = b"secret";
        let payload = b"GET/api/v5/account/balance1620000000000";
        let a = sign(VenueTag::Reference, secret, payload);
        let b = sign(VenueTag::VenueD, secret, payload);
        assert_eq!(a, b);
    }

    #[test]
    fn venue_c_differs_from_reference_and_is_longer_sha384_hex() {
        let secret = b"secret";
        let payload = b"/api/v2/auth/r/wallets1620000000000";
        let signature = sign(VenueTag::VenueC, secret, payload);
        assert_eq!(signature.len(), 96); // 48 bytes hex-encoded
    }

    #[test]
    fn venue_b_is_base64_not_hex() {
        let secret = b"secret";
        let payload = b"AUTH1620000000000";
        let signature = sign(VenueTag::VenueB, secret, payload);
        assert!(base64::engine::general_purpose::STANDARD
            .decode(&signature)
            .is_ok());
    }
}
