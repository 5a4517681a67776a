//! Request gateway
//!
//! Single entry point composing the response cache, the shared rate limiter,
//! the per-service circuit breakers and the retry policy around a pluggable
//! [`Transport`]. See [`Gateway::request`] for the per-call flow.

mod descriptor;
mod pipeline;


pub use descriptor::{RequestDescriptor, DEFAULT_SERVICE};

use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uplink_types::{
    BreakerStats, CircuitBreakerSummary, GatewayConfig, GatewayError, HttpMethod, TypedError,
};

use crate::cache::{cache_key, normalize_path, ResponseCache};
use crate::credentials::{CredentialProvider, RefreshGate, StaticTokenProvider};
use crate::resilience::{CircuitBreakerRegistry, RateLimiter, RetryPolicy, StateListener};
use crate::transport::{HttpTransport, Transport};

/// Raw successful response as stored in the cache.
#[derive(Debug, Clone)]
pub(crate) struct CachedResponse {
    status: u16,
    headers: BTreeMap<String, String>,
    body: Bytes,
}

pub struct Gateway {
    config: GatewayConfig,
    base_url: String,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    breakers: Arc<CircuitBreakerRegistry>,
    limiter: RateLimiter,
    cache: ResponseCache<CachedResponse>,
    retry: RetryPolicy,
    refresh: RefreshGate,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("base_url", &self.base_url)
            .field("cached_entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// Assembles a [`Gateway`]; every collaborator has a default.
pub struct GatewayBuilder {
    config: GatewayConfig,
    transport: Option<Arc<dyn Transport>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    breakers: Option<Arc<CircuitBreakerRegistry>>,
    listener: Option<Arc<dyn StateListener>>,
}

impl GatewayBuilder {
    /// Defaults to a `reqwest` [`HttpTransport`].
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Defaults to anonymous requests.
    #[must_use]
    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Share a breaker registry instead of creating one from the config.
    #[must_use]
    pub fn breakers(mut self, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    /// Listener for breakers of the registry built from the config.
    ///
    /// Ignored when a registry is injected with [`Self::breakers`].
    #[must_use]
    pub fn state_listener(mut self, listener: Arc<dyn StateListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn build(self) -> Result<Gateway, TypedError> {
        let config = self.config;
        config.check()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let http = HttpTransport::new(config.timeout()).map_err(GatewayError::from)?;
                Arc::new(http) as Arc<dyn Transport>
            },
        };
        let credentials = self.credentials.unwrap_or_else(|| {
            Arc::new(StaticTokenProvider::anonymous()) as Arc<dyn CredentialProvider>
        });
        let breakers = match self.breakers {
            Some(breakers) => breakers,
            None => {
                let registry = CircuitBreakerRegistry::from_config(&config);
                Arc::new(match self.listener {
                    Some(listener) => registry.with_listener(listener),
                    None => registry,
                })
            },
        };

        info!(
            base_url = %config.base_url,
            retry_attempts = config.retry_attempts,
            cache_enabled = config.cache_enabled,
            rate_limit = config.rate_limit.enabled,
            "Gateway initialized"
        );

        Ok(Gateway {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transport,
            credentials,
            breakers,
            limiter: RateLimiter::new(config.rate_limit.clone()),
            cache: ResponseCache::new(config.cache_max_entries),
            retry: RetryPolicy::new(config.retry_attempts, config.backoff.clone()),
            refresh: RefreshGate::default(),
            config,
        })
    }
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            transport: None,
            credentials: None,
            breakers: None,
            listener: None,
        }
    }

    /// Gateway with the HTTP transport and a provider.
    pub fn new(
        config: GatewayConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, TypedError> {
        Self::builder(config).credentials(credentials).build()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    // ===== Breaker administration =====

    pub fn breaker_stats(&self, service: &str) -> Option<BreakerStats> {
        self.breakers.get(service).map(|breaker| breaker.stats())
    }

    pub fn all_breaker_stats(&self) -> Vec<BreakerStats> {
        self.breakers.stats()
    }

    pub fn breaker_summary(&self) -> CircuitBreakerSummary {
        self.breakers.summary()
    }

    pub fn trip_service(&self, service: &str) {
        self.breakers.trip(service);
    }

    pub fn reset_service(&self, service: &str) -> bool {
        self.breakers.reset(service)
    }

    // ===== Cache administration =====

    /// Drop the cached response of one request signature.
    pub fn invalidate_cache(
        &self,
        method: HttpMethod,
        path: &str,
        params: &BTreeMap<String, String>,
    ) -> bool {
        self.cache.invalidate(&cache_key(method, path, params))
    }

    /// Drop every cached GET/HEAD response for `path` or any path below it.
    pub fn invalidate_path(&self, path: &str) -> usize {
        let path = normalize_path(path);
        [HttpMethod::Get, HttpMethod::Head]
            .iter()
            .map(|method| self.cache.invalidate_prefix(&format!("{} {}", method.as_str(), path)))
            .sum()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn purge_expired_cache(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    pub fn available_tokens(&self) -> f64 {
        self.limiter.available_tokens()
    }
}
