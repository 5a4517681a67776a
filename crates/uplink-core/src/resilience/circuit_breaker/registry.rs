//! Per-service breaker registry
//!
//! Breakers are created lazily on first use and kept for the registry's
//! lifetime. Each service gets its own instance, so one failing dependency
//! never opens the circuit of another.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uplink_types::{
    BreakerStats, CircuitBreakerConfig, CircuitBreakerSummary, CircuitState, GatewayConfig,
};

use super::{CircuitBreaker, StateListener};

/// Manages circuit breakers for all services
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    listener: Option<Arc<dyn StateListener>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            breakers: RwLock::new(HashMap::new()),
            listener: None,
        }
    }

    /// Registry using the gateway's shared thresholds and per-service overrides.
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self { overrides: config.services.clone(), ..Self::new(config.breaker.clone()) }
    }

    #[must_use]
    pub fn with_override(
        mut self,
        service: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Self {
        self.overrides.insert(service.into(), config);
        self
    }

    /// Listener attached to every breaker created after this call.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn StateListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Thresholds a breaker for `service` is built with: its override, or
    /// the shared defaults.
    pub fn config_for(&self, service: &str) -> &CircuitBreakerConfig {
        self.overrides.get(service).unwrap_or(&self.defaults)
    }

    pub fn get(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(service).cloned()
    }

    pub fn get_or_create(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(service) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        let breaker = breakers.entry(service.to_string()).or_insert_with(|| {
            let config = self.config_for(service).clone();
            debug!(service = %service, "Creating circuit breaker");
            Arc::new(match &self.listener {
                Some(listener) => {
                    CircuitBreaker::with_listener(service, config, Arc::clone(listener))
                },
                None => CircuitBreaker::new(service, config),
            })
        });
        Arc::clone(breaker)
    }

    /// Force a service's circuit open, creating its breaker if needed.
    pub fn trip(&self, service: &str) {
        info!(service = %service, "Circuit breaker tripped manually");
        self.get_or_create(service).trip();
    }

    /// Reset a service's circuit (e.g., after manual intervention).
    ///
    /// Returns `false` when no breaker exists for the service.
    pub fn reset(&self, service: &str) -> bool {
        match self.get(service) {
            Some(breaker) => {
                info!(
                    service = %service,
                    previous_state = %breaker.state(),
                    "Circuit breaker reset manually"
                );
                breaker.reset();
                true
            },
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.snapshot() {
            breaker.reset();
        }
    }

    /// Names of every service with a breaker, sorted.
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stats of every breaker, sorted by service name.
    pub fn stats(&self) -> Vec<BreakerStats> {
        let mut stats: Vec<BreakerStats> = self.snapshot().iter().map(|b| b.stats()).collect();
        stats.sort_by(|a, b| a.service.cmp(&b.service));
        stats
    }

    pub fn total_trips(&self) -> u64 {
        self.snapshot().iter().map(|b| b.total_trips()).sum()
    }

    pub fn summary(&self) -> CircuitBreakerSummary {
        let mut summary = CircuitBreakerSummary::default();
        for breaker in self.snapshot() {
            match breaker.state() {
                CircuitState::Closed => summary.closed += 1,
                CircuitState::Open => summary.open += 1,
                CircuitState::HalfOpen => summary.half_open += 1,
            }
            summary.total_trips += breaker.total_trips();
        }
        summary
    }

    // Clones the Arcs so breaker locks are never taken under the map lock.
    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers.read().values().cloned().collect()
    }
}
