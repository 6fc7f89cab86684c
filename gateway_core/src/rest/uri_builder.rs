//! Incremental query-string / URI assembly, shared by every REST-speaking
//! venue adapter so none of them hand-format `format!("{}={}&...")` strings.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use hyper::http::uri::{Parts, PathAndQuery};
use hyper::Uri;
use std::convert::TryInto;
use std::fmt::Display;

pub type QueryKey = &'static str;

pub struct UriBuilder {
    buffer: BytesMut,
    query_start: usize,
}

impl UriBuilder {
    pub fn new(capacity: usize, path: &str) -> Self {
        let mut buf = BytesMut::with_capacity(capacity);
        buf.extend_from_slice(path.as_bytes());
        buf.put_u8(b'?');
        let query_start = buf.len();
        Self {
            buffer: buf,
            query_start,
        }
    }

    pub fn from_path(path: &str) -> Self {
        Self::new(256, path)
    }

    fn add_static_part(&mut self, key: QueryKey) {
        let buf = &mut self.buffer;
        if buf.len() > self.query_start {
            buf.put_u8(b'&');
        }
        buf.extend_from_slice(key.as_bytes());
        buf.put_u8(b'=');
    }

    pub fn add_kv(&mut self, key: QueryKey, value: impl Display) {
        self.add_static_part(key);
        use std::fmt::Write;
        write!(self.buffer, "{value}").expect("writing to an in-memory buffer cannot fail");
    }

    pub fn query(&mut self) -> &[u8] {
        &self.buffer[self.query_start..]
    }

    pub fn build_uri_and_query(self, host: &str, add_query_to_uri: bool) -> (Uri, Bytes) {
        let buffer = self.buffer.freeze();
        let query = buffer.slice(self.query_start..);

        let path_and_query = match add_query_to_uri {
            false => buffer.slice(..self.query_start - 1),
            true if buffer.len() == self.query_start => buffer.slice(..self.query_start - 1),
            true => buffer,
        };
        let path_and_query = PathAndQuery::from_maybe_shared(path_and_query)
            .expect("path and query bytes are always valid ASCII");

        let mut parts = Parts::default();
        parts.scheme = Some("https".try_into().expect("static scheme"));
        parts.authority = Some(host.try_into().expect("host came from venue config"));
        parts.path_and_query = Some(path_and_query);

        let uri = Uri::from_parts(parts).expect("all parts were set above");
        (uri, query)
    }

    pub fn build_uri(self, host: &str, add_query_to_uri: bool) -> Uri {
        self.build_uri_and_query(host, add_query_to_uri).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn builds_query_in_insertion_order() {
        let mut builder = UriBuilder::from_path("/api/v3/order");
        builder.add_kv("symbol", "BTCUSDT");
        builder.add_kv("side", "BUY");
        builder.add_kv("quantity", dec!(1.5));

        assert_eq!(builder.query(), b"symbol=BTCUSDT&side=BUY&quantity=1.5");
    }

    #[test]
    fn build_uri_with_query_appended() {
        let mut builder = UriBuilder::from_path("/path");
        builder.add_kv("key", "value");

        let uri = builder.build_uri("host.example", true);
        assert_eq!(uri, Uri::from_static("https://host.example/path?key=value"));
    }

    #[test]
    fn build_uri_without_query_keeps_path_only() {
        let mut builder = UriBuilder::from_path("/path");
        builder.add_kv("key", "value");

        let uri = builder.build_uri("host.example", false);
        assert_eq!(uri, Uri::from_static("https://host.example/path"));
    }

    #[test]
    fn empty_builder_has_no_trailing_question_mark() {
        let builder = UriBuilder::from_path("/path");
        let uri = builder.build_uri("host.example", true);
        assert_eq!(uri, Uri::from_static("https://host.example/path"));
    }
}
