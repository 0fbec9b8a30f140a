use thiserror::Error;

/// Classification of exchange gateway failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Request exceeded its deadline
    Timeout,
    /// HTTP 429 from the venue
    RateLimited,
    /// Any other non-success HTTP status
    Http,
    /// Response body could not be parsed
    Decode,
    /// Venue-level error envelope (e.g. Bybit retCode, OKX code)
    Api,
    /// Connection-level failure
    Network,
}

impl std::fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorKind::Timeout => "timeout",
            GatewayErrorKind::RateLimited => "rate limited",
            GatewayErrorKind::Http => "http error",
            GatewayErrorKind::Decode => "decode error",
            GatewayErrorKind::Api => "api error",
            GatewayErrorKind::Network => "network error",
        };
        write!(f, "{}", s)
    }
}

/// Error taxonomy for the polling engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("gateway failure ({kind}): {message}")]
    Gateway {
        kind: GatewayErrorKind,
        message: String,
    },

    #[error("invalid candle data: {0}")]
    Validation(String),

    #[error("indicator unavailable: need {needed} candles, have {have}")]
    IndicatorUnavailable { needed: usize, have: usize },

    #[error("unsupported venue: {0}")]
    InvalidGateway(String),
}

impl EngineError {
    /// Build a gateway error from a reqwest failure, preserving the
    /// timeout/connect distinction
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            GatewayErrorKind::Timeout
        } else if err.is_decode() {
            GatewayErrorKind::Decode
        } else if err.is_connect() {
            GatewayErrorKind::Network
        } else {
            GatewayErrorKind::Http
        };

        EngineError::Gateway {
            kind,
            message: err.to_string(),
        }
    }

    /// Gateway error for a non-success HTTP status
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let kind = if status.as_u16() == 429 {
            GatewayErrorKind::RateLimited
        } else {
            GatewayErrorKind::Http
        };

        EngineError::Gateway {
            kind,
            message: format!("HTTP {}: {}", status, body),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        EngineError::Gateway {
            kind: GatewayErrorKind::Decode,
            message: message.into(),
        }
    }

    pub fn api(message: impl Into<String>) -> Self {
        EngineError::Gateway {
            kind: GatewayErrorKind::Api,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        EngineError::Gateway {
            kind: GatewayErrorKind::Timeout,
            message: message.into(),
        }
    }
}
