//! Core domain models for the Uplink gateway.

mod config;
mod envelope;
mod method;
mod stats;

pub use config::{BackoffConfig, CircuitBreakerConfig, GatewayConfig, RateLimitConfig};
pub use envelope::ResponseEnvelope;
pub use method::HttpMethod;
pub use stats::{BreakerStats, CircuitBreakerSummary, CircuitState};
