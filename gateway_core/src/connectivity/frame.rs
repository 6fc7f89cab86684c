//! FRAME HANDLER helpers (§4.6): venue C's binary frames are gzip-compressed
//! JSON; everything else arrives as text.

use flate2::read::GzDecoder;
use std::io::Read;

pub fn gunzip_to_string(bytes: &[u8]) -> std::io::Result<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = String::new();
    decoder.read_to_string(&mut out)?;
    Ok(out)
}

/// A decoded dict frame is a control frame (carries `event`/status fields,
/// no `chanId`/array payload); a list frame is data. We only need to tell
/// them apart, not fully parse either shape here — that's the venue parser's
/// job once we know which path to take.
pub fn is_control_frame(json: &serde_json::Value) -> bool {
    json.is_object()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(input: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(input.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn gunzip_round_trips_text() {
        let compressed = gzip(r#"{"event":"subscribed"}"#);
        assert_eq!(gunzip_to_string(&compressed).unwrap(), r#"{"event":"subscribed"}"#);
    }

    #[test]
    fn dict_frames_are_control_list_frames_are_data() {
        let dict: serde_json::Value = serde_json::json!({"event": "subscribed"});
        let list: serde_json::Value = serde_json::json!([1, "te", [1, 2, 3]]);
        assert!(is_control_frame(&dict));
        assert!(!is_control_frame(&list));
    }
}
