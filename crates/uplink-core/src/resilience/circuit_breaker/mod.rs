//! Circuit Breaker implementation for service-level fast-fail behavior
//!
//! This module provides a circuit breaker pattern to prevent repeated calls to
//! failing dependencies. When a service experiences multiple consecutive
//! failures, the circuit breaker opens and subsequent requests fail fast.
//!
//! States:
//! - Closed: Normal operation, requests pass through
//! - Open: Service is failing, requests fail immediately
//! - Half-Open: Testing if service has recovered

mod registry;
mod state;


pub use registry::CircuitBreakerRegistry;

use parking_lot::{Mutex, MutexGuard};
use state::{BreakerCore, Transition};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uplink_types::{BreakerStats, CircuitBreakerConfig, CircuitState, GatewayError};

use crate::metrics::record_breaker_transition;
use crate::utils::duration_to_millis_ceil;

/// Receives every state change of a breaker, in transition order.
///
/// Calls are made without the breaker's lock held, so a listener may read the
/// breaker or drive it. Transitions raised while another caller is delivering
/// (including from inside the listener) are handed to that caller's queue.
pub trait StateListener: Send + Sync {
    fn on_state_change(&self, service: &str, new_state: CircuitState, previous_state: CircuitState);
}

impl<F> StateListener for F
where
    F: Fn(&str, CircuitState, CircuitState) + Send + Sync,
{
    fn on_state_change(
        &self,
        service: &str,
        new_state: CircuitState,
        previous_state: CircuitState,
    ) {
        self(service, new_state, previous_state)
    }
}

/// State plus the transitions still waiting to be announced.
#[derive(Debug, Default)]
struct Guarded {
    machine: BreakerCore,
    outbox: VecDeque<Transition>,
    delivering: bool,
}

/// Breaker guarding one dependency.
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    core: Mutex<Guarded>,
    listener: Option<Arc<dyn StateListener>>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("service", &self.service)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            service: service.into(),
            config,
            core: Mutex::new(Guarded::default()),
            listener: None,
        }
    }

    pub fn with_listener(
        service: impl Into<String>,
        config: CircuitBreakerConfig,
        listener: Arc<dyn StateListener>,
    ) -> Self {
        Self { listener: Some(listener), ..Self::new(service, config) }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.core.lock().machine.state
    }

    pub fn failure_count(&self) -> u32 {
        self.core.lock().machine.failure_count
    }

    pub fn success_count(&self) -> u32 {
        self.core.lock().machine.success_count
    }

    pub fn total_trips(&self) -> u64 {
        self.core.lock().machine.total_trips
    }

    pub fn stats(&self) -> BreakerStats {
        let guarded = self.core.lock();
        let core = &guarded.machine;
        BreakerStats {
            service: self.service.clone(),
            state: core.state,
            failure_count: core.failure_count,
            success_count: core.success_count,
            last_failure_at: core.last_failure_at,
            retry_in_ms: core
                .remaining_open(&self.config, Instant::now())
                .map(duration_to_millis_ceil),
            total_trips: core.total_trips,
        }
    }

    /// Run one attempt under the breaker, racing it against `request_timeout`.
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.execute_with_timeout(self.config.request_timeout(), op).await
    }

    /// Run one attempt under the breaker with an explicit deadline.
    ///
    /// An open breaker rejects without invoking `op`. When the deadline wins
    /// the attempt is dropped and counted as a failure.
    pub async fn execute_with_timeout<F, Fut, T>(
        &self,
        timeout: Duration,
        op: F,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.try_acquire()?;

        let outcome = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout { timeout_ms: timeout.as_millis() as u64 }),
        };

        match &outcome {
            Ok(_) => self.record_success(),
            Err(error) if error.trips_breaker() => self.record_failure(error),
            Err(error) => {
                debug!(
                    service = %self.service,
                    error = %error,
                    "Outcome not counted by circuit breaker"
                );
            },
        }

        outcome
    }

    /// Admission check; may move an expired open breaker to half-open.
    pub fn try_acquire(&self) -> Result<(), GatewayError> {
        let mut core = self.core.lock();
        match core.machine.admit(&self.config, Instant::now()) {
            Ok(transition) => {
                self.publish(core, transition);
                Ok(())
            },
            Err(remaining) => {
                drop(core);
                debug!(
                    service = %self.service,
                    retry_in_ms = duration_to_millis_ceil(remaining),
                    "Circuit open, rejecting call"
                );
                Err(GatewayError::CircuitOpen {
                    service: self.service.clone(),
                    retry_after_ms: duration_to_millis_ceil(remaining),
                })
            },
        }
    }

    pub fn record_success(&self) {
        let mut core = self.core.lock();
        if core.machine.state == CircuitState::Open {
            debug!(service = %self.service, "Unexpected success in open state");
        }
        let transition = core.machine.on_success(&self.config);
        self.publish(core, transition);
    }

    pub fn record_failure(&self, error: &GatewayError) {
        let mut core = self.core.lock();
        let transition = core.machine.on_failure(&self.config, Instant::now());
        let failures = core.machine.failure_count;

        match &transition {
            Some(transition) => {
                warn!(
                    service = %self.service,
                    failures,
                    reason = %error,
                    "Circuit breaker opening - {}",
                    transition.reason
                );
            },
            None => {
                debug!(service = %self.service, failures, reason = %error, "Failure recorded");
            },
        }
        self.publish(core, transition);
    }

    /// Force the breaker open, e.g. for a maintenance window.
    pub fn trip(&self) {
        let mut core = self.core.lock();
        let transition = core.machine.force_open(Instant::now());
        self.publish(core, transition);
    }

    /// Force the breaker closed with zeroed counters.
    pub fn reset(&self) {
        let mut core = self.core.lock();
        let transition = core.machine.force_closed();
        self.publish(core, transition);
    }

    /// Queue `transition` under the lock it was produced under, then drain
    /// the queue unless another caller is already draining it.
    fn publish(&self, mut core: MutexGuard<'_, Guarded>, transition: Option<Transition>) {
        if let Some(transition) = transition {
            core.outbox.push_back(transition);
        }
        if core.delivering {
            return;
        }

        core.delivering = true;
        while let Some(transition) = core.outbox.pop_front() {
            MutexGuard::unlocked(&mut core, || self.announce(transition));
        }
        core.delivering = false;
    }

    fn announce(&self, transition: Transition) {
        info!(
            service = %self.service,
            from = %transition.from,
            to = %transition.to,
            reason = transition.reason,
            "Circuit breaker state change"
        );
        record_breaker_transition(&self.service, transition.to);
        if let Some(listener) = &self.listener {
            listener.on_state_change(&self.service, transition.to, transition.from);
        }
    }
}
