//! Request pipeline errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a rate-limit rejection came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitSource {
    /// The gateway's own token bucket refused admission
    Local,
    /// The remote dependency answered 429
    Upstream,
}

impl fmt::Display for RateLimitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitSource::Local => write!(f, "local"),
            RateLimitSource::Upstream => write!(f, "upstream"),
        }
    }
}

/// Errors a caller of the gateway can observe.
///
/// The set is closed: retry and breaker decisions match every variant
/// explicitly, so adding a kind forces both decisions to be revisited.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum GatewayError {
    /// Breaker for the service is open; the call was not attempted
    #[error("Circuit open for {service}, retry in {retry_after_ms}ms")]
    CircuitOpen { service: String, retry_after_ms: u64 },

    /// Attempt did not settle within its deadline
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection or transport-level failure
    #[error("Network error: {message}")]
    Network { message: String },

    /// Non-success status other than 401 and 429
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Local bucket exhausted or upstream answered 429
    #[error("Rate limited ({origin}), retry in {wait_ms}ms")]
    RateLimited { wait_ms: u64, origin: RateLimitSource },

    /// Upstream rejected the credentials (401)
    #[error("Authentication failed{}: {message}", refresh_suffix(.after_refresh))]
    Auth { message: String, after_refresh: bool },

    /// Caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Descriptor could not be turned into a request
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Response body did not match the expected shape
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },
}

fn refresh_suffix(after_refresh: &bool) -> &'static str {
    if *after_refresh {
        " after token refresh"
    } else {
        ""
    }
}

impl GatewayError {
    /// Whether the retry policy may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Server { status, .. } => *status >= 500,
            Self::CircuitOpen { .. }
            | Self::RateLimited { .. }
            | Self::Auth { .. }
            | Self::Cancelled
            | Self::InvalidRequest { .. }
            | Self::InvalidResponse { .. } => false,
        }
    }

    /// Whether this error is evidence that the dependency is unhealthy.
    ///
    /// A first 401 is not counted: the gateway refreshes credentials and
    /// tries again, and only a rejection after refresh reaches the breaker.
    pub fn trips_breaker(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } | Self::Server { .. } => true,
            Self::RateLimited { origin, .. } => *origin == RateLimitSource::Upstream,
            Self::Auth { after_refresh, .. } => *after_refresh,
            Self::CircuitOpen { .. }
            | Self::Cancelled
            | Self::InvalidRequest { .. }
            | Self::InvalidResponse { .. } => false,
        }
    }

    /// Check if this is a client error (4xx equivalent).
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Server { status, .. } => (400..500).contains(status),
            Self::Auth { .. } | Self::InvalidRequest { .. } => true,
            _ => false,
        }
    }

    /// Get HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::CircuitOpen { .. } => 503,
            Self::Timeout { .. } => 504,
            Self::Network { .. } | Self::InvalidResponse { .. } => 502,
            Self::Server { status, .. } => *status,
            Self::RateLimited { .. } => 429,
            Self::Auth { .. } => 401,
            Self::Cancelled => 499,
            Self::InvalidRequest { .. } => 400,
        }
    }
}
