use thiserror::Error;

/// Caller-visible error taxonomy (§7). The RPC façade maps each kind to a
/// status code; venue adapters and parsers construct these directly rather
/// than bailing with a bare boxed error once an error crosses into
/// caller-visible territory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Bad limit/interval/side/type/symbol.
    Validation,
    /// Unknown account, missing key.
    AuthOrConfig,
    /// Mapped from HTTP 429 / venue-specific throttling codes.
    RateLimited,
    /// 4xx (other than 429), 5xx, network failure, or decode failure.
    Upstream,
    /// Queue overflow or a venue subscribe-rejected code; the tradeId's
    /// streams are torn down as a result.
    StreamTerminal,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Validation, message)
    }

    pub fn auth_or_config(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::AuthOrConfig, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::RateLimited, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Upstream, message)
    }

    pub fn stream_terminal(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::StreamTerminal, message)
    }
}
