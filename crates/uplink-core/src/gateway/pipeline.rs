use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uplink_types::{GatewayError, RateLimitSource, ResponseEnvelope};
use url::Url;

use super::{CachedResponse, Gateway, RequestDescriptor};
use crate::cache::{cache_key, normalize_path};
use crate::metrics::{record_rate_limited, record_request};
use crate::resilience::CircuitBreaker;
use crate::transport::{TransportRequest, TransportResponse};
use crate::utils::{duration_to_millis_ceil, generate_trace_id};

const MAX_ERROR_BODY_CHARS: usize = 256;

impl Gateway {
    /// Perform one logical call and decode the body into `T`.
    ///
    /// Flow: fresh cache entry (if eligible) → local rate limit → bearer
    /// token → per-service breaker, wrapped by the retry policy when the
    /// descriptor opts in → decode, cache, envelope. A 401 triggers one
    /// credential refresh and one repeated attempt.
    pub async fn request<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<ResponseEnvelope<T>, GatewayError> {
        let trace_id = generate_trace_id();
        let service = descriptor.service_name();
        let span = info_span!(
            "gateway_request",
            trace_id = %trace_id,
            service = %service,
            method = %descriptor.method,
            path = %descriptor.path
        );

        self.dispatch(descriptor, service).instrument(span).await
    }

    async fn dispatch<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
        service: String,
    ) -> Result<ResponseEnvelope<T>, GatewayError> {
        let started = Instant::now();

        let cache_key = self.cache_key_for(&descriptor);
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key) {
                debug!(status = hit.status, "Served from cache");
                let outcome = envelope(&hit, true, 0);
                record_request(&service, outcome_label(&outcome), 0);
                return outcome;
            }
        }

        if descriptor.cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        if let Err(wait) = self.limiter.try_acquire() {
            let wait_ms = duration_to_millis_ceil(wait);
            record_rate_limited();
            warn!(wait_ms, "Local rate limit exceeded");
            return Err(GatewayError::RateLimited { wait_ms, origin: RateLimitSource::Local });
        }

        let outcome = match self.call_with_auth(&descriptor, &service).await {
            Ok(response) => {
                let cached = CachedResponse {
                    status: response.status,
                    headers: response.headers,
                    body: response.body,
                };
                let duration_ms = started.elapsed().as_millis() as u64;
                let outcome = envelope(&cached, false, duration_ms);
                if let (Ok(_), Some(key)) = (&outcome, cache_key) {
                    let ttl = descriptor.cache_ttl.unwrap_or_else(|| self.config.cache_ttl());
                    self.cache.set(key, cached, ttl);
                }
                outcome
            },
            Err(error) => Err(error),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        record_request(&service, outcome_label(&outcome), duration_ms);
        match &outcome {
            Ok(_) => debug!(duration_ms, "Request completed"),
            Err(error) => debug!(duration_ms, error = %error, "Request failed"),
        }
        outcome
    }

    fn cache_key_for(&self, descriptor: &RequestDescriptor) -> Option<String> {
        if !self.config.cache_enabled || !descriptor.cache {
            return None;
        }
        if !descriptor.is_cache_eligible() {
            debug!(method = %descriptor.method, "Cache flag ignored for non-cacheable method");
            return None;
        }
        Some(cache_key(descriptor.method, &descriptor.path, &descriptor.params))
    }

    async fn call_with_auth(
        &self,
        descriptor: &RequestDescriptor,
        service: &str,
    ) -> Result<TransportResponse, GatewayError> {
        let breaker = self.breakers.get_or_create(service);
        let token = self.credentials.get_token().await?;

        match self.call(&breaker, descriptor, token.as_deref()).await {
            Err(GatewayError::Auth { message, after_refresh: false }) => {
                info!(reason = %message, "Upstream rejected credentials, refreshing token");
                let refresh = self.refresh.refresh(self.credentials.as_ref(), token.as_deref());
                let refreshed = tokio::select! {
                    () = descriptor.cancel.cancelled() => return Err(GatewayError::Cancelled),
                    refreshed = refresh => refreshed?,
                };
                self.attempt(&breaker, descriptor, refreshed.as_deref(), true).await
            },
            other => other,
        }
    }

    async fn call(
        &self,
        breaker: &CircuitBreaker,
        descriptor: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<TransportResponse, GatewayError> {
        if !descriptor.retry {
            return self.attempt(breaker, descriptor, token, false).await;
        }

        self.retry
            .run(&descriptor.cancel, move |attempt| {
                if attempt > 0 {
                    debug!(attempt, "Re-attempting request");
                }
                self.attempt(breaker, descriptor, token, false)
            })
            .await
    }

    /// One breaker-guarded network attempt, raced against cancellation.
    async fn attempt(
        &self,
        breaker: &CircuitBreaker,
        descriptor: &RequestDescriptor,
        token: Option<&str>,
        after_refresh: bool,
    ) -> Result<TransportResponse, GatewayError> {
        let request = self.build_request(breaker, descriptor, token)?;
        let timeout = request.timeout;

        breaker
            .execute_with_timeout(timeout, || async {
                let sent = tokio::select! {
                    () = descriptor.cancel.cancelled() => Err(GatewayError::Cancelled),
                    result = self.transport.send(request) => result.map_err(GatewayError::from),
                };
                sent.and_then(|response| classify_response(response, after_refresh))
            })
            .await
    }

    fn build_request(
        &self,
        breaker: &CircuitBreaker,
        descriptor: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<TransportRequest, GatewayError> {
        let raw = format!("{}{}", self.base_url, normalize_path(&descriptor.path));
        let url = Url::parse(&raw).map_err(|e| GatewayError::InvalidRequest {
            message: format!("Invalid URL {}: {}", raw, e),
        })?;

        let mut headers = descriptor.headers.clone();
        headers.entry("accept".to_string()).or_insert_with(|| "application/json".to_string());
        if let Some(token) = token {
            headers.insert("authorization".to_string(), format!("Bearer {}", token));
        }

        Ok(TransportRequest {
            method: descriptor.method,
            url,
            headers,
            query: descriptor.params.clone(),
            body: descriptor.body.clone(),
            timeout: descriptor.timeout.unwrap_or_else(|| self.default_timeout(breaker)),
        })
    }

    /// Per-attempt deadline without a descriptor override: the tighter of the
    /// gateway default and the service breaker's `request_timeout_ms`.
    fn default_timeout(&self, breaker: &CircuitBreaker) -> Duration {
        self.config.timeout().min(breaker.config().request_timeout())
    }
}

/// Map a raw response onto success or a typed error.
fn classify_response(
    response: TransportResponse,
    after_refresh: bool,
) -> Result<TransportResponse, GatewayError> {
    match response.status {
        200..=299 => Ok(response),
        401 => Err(GatewayError::Auth { message: error_message(&response), after_refresh }),
        429 => Err(GatewayError::RateLimited {
            wait_ms: retry_after_ms(&response),
            origin: RateLimitSource::Upstream,
        }),
        status => Err(GatewayError::Server { status, message: error_message(&response) }),
    }
}

/// `Retry-After` in delta-seconds; HTTP-date or missing values yield 0.
fn retry_after_ms(response: &TransportResponse) -> u64 {
    response
        .header("retry-after")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map_or(0, |secs| duration_to_millis_ceil(Duration::from_secs(secs)))
}

fn error_message(response: &TransportResponse) -> String {
    let text = String::from_utf8_lossy(&response.body);
    let text = text.trim();
    if text.is_empty() {
        return format!("HTTP {}", response.status);
    }
    text.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

fn envelope<T: DeserializeOwned>(
    response: &CachedResponse,
    cached: bool,
    duration_ms: u64,
) -> Result<ResponseEnvelope<T>, GatewayError> {
    Ok(ResponseEnvelope {
        data: decode_body(&response.body)?,
        status: response.status,
        headers: response.headers.clone(),
        cached,
        duration_ms,
    })
}

/// Decode a JSON body; an empty body decodes as `null`.
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    let decoded = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_value(serde_json::Value::Null)
    } else {
        serde_json::from_slice(body)
    };
    decoded.map_err(|e| GatewayError::InvalidResponse { message: e.to_string() })
}

fn outcome_label<T>(outcome: &Result<T, GatewayError>) -> &'static str {
    match outcome {
        Ok(_) => "ok",
        Err(GatewayError::CircuitOpen { .. }) => "circuit_open",
        Err(GatewayError::Timeout { .. }) => "timeout",
        Err(GatewayError::Network { .. }) => "network",
        Err(GatewayError::Server { .. }) => "server",
        Err(GatewayError::RateLimited { .. }) => "rate_limited",
        Err(GatewayError::Auth { .. }) => "auth",
        Err(GatewayError::Cancelled) => "cancelled",
        Err(GatewayError::InvalidRequest { .. }) => "invalid_request",
        Err(GatewayError::InvalidResponse { .. }) => "invalid_response",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::BTreeMap;

    fn response(status: u16, headers: &[(&str, &str)], body: &'static str) -> TransportResponse {
        TransportResponse {
            status,
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_classify_statuses() {
        assert!(classify_response(response(204, &[], ""), false).is_ok());
        assert_eq!(
            classify_response(response(401, &[], "expired"), true),
            Err(GatewayError::Auth { message: "expired".to_string(), after_refresh: true })
        );
        assert_eq!(
            classify_response(response(429, &[("retry-after", "3")], ""), false),
            Err(GatewayError::RateLimited { wait_ms: 3_000, origin: RateLimitSource::Upstream })
        );
        assert_eq!(
            classify_response(response(503, &[], ""), false),
            Err(GatewayError::Server { status: 503, message: "HTTP 503".to_string() })
        );
    }

    #[test]
    fn test_retry_after_date_form_ignored() {
        let resp = response(429, &[("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT")], "");
        assert_eq!(retry_after_ms(&resp), 0);
    }

    #[test]
    fn test_decode_empty_body_as_null() {
        assert_eq!(decode_body::<()>(b""), Ok(()));
        assert_eq!(decode_body::<Option<u32>>(b"  \n"), Ok(None));
        assert!(matches!(
            decode_body::<u32>(b"not json"),
            Err(GatewayError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_error_message_truncated() {
        let long = "x".repeat(1_000);
        let resp = TransportResponse {
            status: 500,
            headers: BTreeMap::new(),
            body: Bytes::from(long),
        };
        assert_eq!(error_message(&resp).len(), MAX_ERROR_BODY_CHARS);
    }
}
