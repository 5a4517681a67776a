//! Outbound request description.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uplink_types::{GatewayError, HttpMethod};

/// Breaker key used when the path has no leading segment.
pub const DEFAULT_SERVICE: &str = "default";

/// Everything the gateway needs to perform one logical call.
///
/// Built fluently:
///
/// ```
/// use uplink_core::RequestDescriptor;
///
/// let descriptor = RequestDescriptor::get("/users")
///     .param("page", "2")
///     .cached()
///     .with_retry();
/// assert_eq!(descriptor.service_name(), "users");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    /// Per-attempt deadline; the gateway default applies when unset
    pub timeout: Option<Duration>,
    /// Opt in to the retry policy
    pub retry: bool,
    /// Opt in to the response cache (honored for GET/HEAD only)
    pub cache: bool,
    /// TTL override for the stored response
    pub cache_ttl: Option<Duration>,
    pub cancel: CancellationToken,
    /// Breaker key override; defaults to the leading path segment
    pub service: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), ..Self::default() }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    #[must_use]
    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<B: Serialize>(self, body: &B) -> Result<Self, GatewayError> {
        let value = serde_json::to_value(body)
            .map_err(|e| GatewayError::InvalidRequest { message: e.to_string() })?;
        Ok(self.body(value))
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Header names are stored lower-cased.
    #[must_use]
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_retry(mut self) -> Self {
        self.retry = true;
        self
    }

    #[must_use]
    pub fn cached(mut self) -> Self {
        self.cache = true;
        self
    }

    #[must_use]
    pub fn cached_for(mut self, ttl: Duration) -> Self {
        self.cache = true;
        self.cache_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Breaker key: explicit override, else the first path segment.
    pub fn service_name(&self) -> String {
        if let Some(service) = self.service.as_deref().filter(|s| !s.is_empty()) {
            return service.to_string();
        }
        self.path
            .trim()
            .trim_start_matches('/')
            .split(['/', '?'])
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or(DEFAULT_SERVICE)
            .to_string()
    }

    /// Cache flag set on a method whose responses may be cached.
    pub fn is_cache_eligible(&self) -> bool {
        self.cache && self.method.is_cacheable()
    }
}
