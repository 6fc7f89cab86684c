//! Classification of a raw HTTP outcome into [`GatewayError`] (§7). Mirrors
//! status-code handling venues all share (401/429/5xx) and then defers to a
//! per-venue hook for vendor-specific error bodies.

use gateway_domain::GatewayError;
use hyper::StatusCode;
use std::borrow::Cow;
use std::fmt;

#[derive(Eq, PartialEq, Clone)]
pub struct RestResponse {
    pub status: StatusCode,
    pub content: String,
}

impl RestResponse {
    pub fn new(status: StatusCode, content: String) -> Self {
        Self { status, content }
    }
}

impl fmt::Debug for RestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cut_content = if self.content.len() > 1500 {
            Cow::Owned(self.content.chars().take(1500).collect::<String>())
        } else {
            Cow::Borrowed(&self.content)
        };
        write!(f, "status: {:?} content: {}", self.status, cut_content)
    }
}

/// Per-venue hook for classifying a non-transport-level error out of a
/// response body. Implementors only need to handle the vendor's own error
/// envelope; generic status codes are already handled before this is called.
pub trait VenueErrorHandler: Send + Sync + 'static {
    fn check_spec_rest_error(&self, response: &RestResponse) -> Result<(), GatewayError>;
}

pub struct ErrorHandlerEmpty;

impl VenueErrorHandler for ErrorHandlerEmpty {
    fn check_spec_rest_error(&self, _response: &RestResponse) -> Result<(), GatewayError> {
        Ok(())
    }
}

pub fn classify_response<H: VenueErrorHandler>(
    response: RestResponse,
    empty_response_is_ok: bool,
    handler: &H,
) -> Result<RestResponse, GatewayError> {
    match response.status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(GatewayError::auth_or_config(response.content))
        }
        StatusCode::TOO_MANY_REQUESTS => Err(GatewayError::rate_limited(response.content)),
        StatusCode::GATEWAY_TIMEOUT | StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
            Err(GatewayError::upstream(response.content))
        }
        status if status.is_server_error() => Err(GatewayError::upstream(response.content)),
        status if status.is_client_error() => {
            handler.check_spec_rest_error(&response)?;
            Err(GatewayError::upstream(response.content))
        }
        _ => {
            if response.content.is_empty() && !empty_response_is_ok {
                return Err(GatewayError::upstream("empty response body"));
            }
            handler.check_spec_rest_error(&response)?;
            Ok(response)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_domain::GatewayErrorKind;

    #[test]
    fn unauthorized_maps_to_auth_or_config() {
        let response = RestResponse::new(StatusCode::UNAUTHORIZED, "bad key".into());
        let err = classify_response(response, false, &ErrorHandlerEmpty).unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::AuthOrConfig);
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited() {
        let response = RestResponse::new(StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        let err = classify_response(response, false, &ErrorHandlerEmpty).unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::RateLimited);
    }

    #[test]
    fn service_unavailable_maps_to_upstream() {
        let response = RestResponse::new(StatusCode::SERVICE_UNAVAILABLE, String::new());
        let err = classify_response(response, true, &ErrorHandlerEmpty).unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Upstream);
    }

    #[test]
    fn empty_ok_response_passes_through_when_flagged() {
        let response = RestResponse::new(StatusCode::OK, String::new());
        assert!(classify_response(response, true, &ErrorHandlerEmpty).is_ok());
    }

    #[test]
    fn empty_response_without_flag_is_an_error() {
        let response = RestResponse::new(StatusCode::OK, String::new());
        assert!(classify_response(response, false, &ErrorHandlerEmpty).is_err());
    }

    #[test]
    fn successful_response_with_body_passes_through() {
        let response = RestResponse::new(StatusCode::OK, "{}".into());
        let ok = classify_response(response, false, &ErrorHandlerEmpty).unwrap();
        assert_eq!(ok.content, "{}");
    }
}
