//! Shared HTTP client (C4). One `RestClient` per venue connection; the venue
//! adapter supplies header-signing behavior, everything else (connection
//! pooling, status classification, tracing) is common.

use crate::rest::error::{classify_response, RestResponse, VenueErrorHandler};
use gateway_domain::GatewayError;
use hyper::client::HttpConnector;
use hyper::http::request::Builder;
use hyper::{Body, Client, Method, Request, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use log::log;
use uuid::Uuid;

const KEEP_ALIVE: &str = "keep-alive";

#[derive(Copy, Clone, Debug)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl RequestMethod {
    fn as_hyper(self) -> Method {
        match self {
            RequestMethod::Get => Method::GET,
            RequestMethod::Post => Method::POST,
            RequestMethod::Put => Method::PUT,
            RequestMethod::Delete => Method::DELETE,
        }
    }
}

/// Venue-specific request signing/header attachment. Implemented once per
/// venue adapter (§4.1); the client itself never computes a signature.
pub trait RestHeaders: Send + Sync + 'static {
    fn add_specific_headers(&self, builder: Builder, uri: &Uri, method: RequestMethod) -> Builder;
}

pub struct RestClient<H: VenueErrorHandler, S: RestHeaders> {
    client: Client<HttpsConnector<HttpConnector>>,
    empty_response_is_ok: bool,
    error_handler: H,
    headers: S,
    venue_label: &'static str,
}

impl<H: VenueErrorHandler, S: RestHeaders> RestClient<H, S> {
    pub fn new(venue_label: &'static str, empty_response_is_ok: bool, error_handler: H, headers: S) -> Self {
        Self {
            client: build_https_client(),
            empty_response_is_ok,
            error_handler,
            headers,
            venue_label,
        }
    }

    pub async fn request(
        &self,
        method: RequestMethod,
        uri: Uri,
        body: Option<Vec<u8>>,
        extra_headers: &[(&'static str, String)],
        action_name: &'static str,
    ) -> Result<RestResponse, GatewayError> {
        let request_id = Uuid::new_v4();
        log::trace!(
            "{action_name} request {request_id} on venue {}",
            self.venue_label
        );

        let builder = Request::builder().method(method.as_hyper());
        let body = match body {
            Some(bytes) => Body::from(bytes),
            None => Body::empty(),
        };
        let mut builder = self.headers.add_specific_headers(builder, &uri, method);
        for (name, value) in extra_headers {
            builder = builder.header(*name, value);
        }
        let request = builder
            .uri(uri)
            .header(hyper::header::CONNECTION, KEEP_ALIVE)
            .body(body)
            .map_err(|e| GatewayError::upstream(format!("failed to build request: {e}")))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| GatewayError::upstream(format!("transport error: {e}")))?;

        let status = response.status();
        let raw_bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| GatewayError::upstream(format!("failed to read response body: {e}")))?;
        let content = String::from_utf8_lossy(&raw_bytes).into_owned();

        let outcome = RestResponse::new(status, content);
        let log_level = if outcome.status.is_success() {
            log::Level::Trace
        } else {
            log::Level::Warn
        };
        log!(
            log_level,
            "{action_name} response on {}: {outcome:?}, request_id: {request_id}",
            self.venue_label
        );

        classify_response(outcome, self.empty_response_is_ok, &self.error_handler)
    }

    pub async fn get(&self, uri: Uri, action_name: &'static str) -> Result<RestResponse, GatewayError> {
        self.request(RequestMethod::Get, uri, None, &[], action_name).await
    }

    pub async fn post(
        &self,
        uri: Uri,
        body: Option<Vec<u8>>,
        action_name: &'static str,
    ) -> Result<RestResponse, GatewayError> {
        self.request(RequestMethod::Post, uri, body, &[], action_name).await
    }

    pub async fn delete(&self, uri: Uri, action_name: &'static str) -> Result<RestResponse, GatewayError> {
        self.request(RequestMethod::Delete, uri, None, &[], action_name).await
    }

    pub async fn put(&self, uri: Uri, action_name: &'static str) -> Result<RestResponse, GatewayError> {
        self.request(RequestMethod::Put, uri, None, &[], action_name).await
    }

    /// Same as [`Self::get`], but with per-request headers (e.g. a computed
    /// request signature) attached on top of the venue's static headers.
    pub async fn get_signed(
        &self,
        uri: Uri,
        extra_headers: &[(&'static str, String)],
        action_name: &'static str,
    ) -> Result<RestResponse, GatewayError> {
        self.request(RequestMethod::Get, uri, None, extra_headers, action_name).await
    }

    /// Same as [`Self::post`], but with per-request headers (e.g. a computed
    /// request signature) attached on top of the venue's static headers.
    pub async fn post_signed(
        &self,
        uri: Uri,
        body: Option<Vec<u8>>,
        extra_headers: &[(&'static str, String)],
        action_name: &'static str,
    ) -> Result<RestResponse, GatewayError> {
        self.request(RequestMethod::Post, uri, body, extra_headers, action_name).await
    }
}

fn build_https_client() -> Client<HttpsConnector<HttpConnector>> {
    let https = HttpsConnectorBuilder::new()
        .with_native_roots()
        .https_only()
        .enable_http1()
        .enable_http2()
        .build();
    Client::builder().build::<_, Body>(https)
}
