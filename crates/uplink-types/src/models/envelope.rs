//! Successful response envelope.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decoded response handed back to gateway callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope<T> {
    /// Body decoded into the caller's expected shape
    pub data: T,
    /// HTTP status of the response (of the original response on a cache hit)
    pub status: u16,
    /// Response headers, names lower-cased
    pub headers: BTreeMap<String, String>,
    /// Served from the response cache without a network call
    pub cached: bool,
    /// Wall time spent in the gateway; 0 for cache hits
    pub duration_ms: u64,
}

impl<T> ResponseEnvelope<T> {
    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ResponseEnvelope<U> {
        ResponseEnvelope {
            data: f(self.data),
            status: self.status,
            headers: self.headers,
            cached: self.cached,
            duration_ms: self.duration_ms,
        }
    }
}
