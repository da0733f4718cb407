//! Deribit-specific error types.

use thiserror::Error;

use crate::application::ports::MarketDataError;

/// RPC codes that mean the relay's own session is bad, whatever the request.
const SESSION_ERROR_CODES: [i64; 2] = [
    13_004, // invalid_credentials
    13_009, // unauthorized
];

/// Errors from the Deribit adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeribitError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// Request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// Non-JSON-RPC HTTP failure.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The venue replied with a JSON-RPC error member.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// Credentials were refused or the reply carried no token.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A private method was called before authenticating.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Reply body could not be parsed.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),
}

impl From<DeribitError> for MarketDataError {
    fn from(err: DeribitError) -> Self {
        match err {
            DeribitError::Network(msg) | DeribitError::ClientBuild(msg) => Self::Unavailable(msg),
            DeribitError::Http { status, body } if status >= 500 => {
                Self::Unavailable(format!("HTTP {status}: {body}"))
            }
            DeribitError::Http { status, body } => Self::Rejected(format!("HTTP {status}: {body}")),
            DeribitError::Rpc { code, message } if SESSION_ERROR_CODES.contains(&code) => {
                Self::Unavailable(format!("{code}: {message}"))
            }
            DeribitError::Rpc { code, message } => Self::Rejected(format!("{code}: {message}")),
            DeribitError::AuthenticationFailed(msg) => Self::Unavailable(msg),
            DeribitError::NotAuthenticated => Self::Unavailable("not authenticated".to_string()),
            DeribitError::JsonParse(msg) => Self::Malformed(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(DeribitError::Network("refused".into()), "unavailable"; "network")]
    #[test_case(DeribitError::Http { status: 503, body: String::new() }, "unavailable"; "server error")]
    #[test_case(DeribitError::Http { status: 404, body: String::new() }, "rejected"; "client error")]
    #[test_case(DeribitError::Rpc { code: 10_009, message: "not_enough_funds".into() }, "rejected"; "rpc")]
    #[test_case(DeribitError::Rpc { code: 10_001, message: "instrument_not_found".into() }, "rejected"; "unknown instrument")]
    #[test_case(DeribitError::Rpc { code: 13_009, message: "unauthorized".into() }, "unavailable"; "expired session")]
    #[test_case(DeribitError::AuthenticationFailed("bad secret".into()), "unavailable"; "auth failed")]
    #[test_case(DeribitError::NotAuthenticated, "unavailable"; "no token")]
    #[test_case(DeribitError::JsonParse("eof".into()), "malformed"; "parse")]
    fn maps_to_market_data_error(err: DeribitError, kind: &str) {
        let mapped = MarketDataError::from(err);
        let actual = match mapped {
            MarketDataError::Unavailable(_) => "unavailable",
            MarketDataError::Rejected(_) => "rejected",
            MarketDataError::Malformed(_) => "malformed",
        };
        assert_eq!(actual, kind);
    }
}
