//! # Uplink Core
//!
//! Resilient request gateway for a single remote backend.
//!
//! ```text
//! uplink-core/src/
//! ├── gateway/      # Gateway, builder, request descriptor, per-call pipeline
//! ├── resilience/   # Circuit breaker + registry, retry policy, token bucket
//! ├── cache/        # TTL response cache and cache keys
//! ├── transport/    # Transport trait and the reqwest implementation
//! ├── credentials   # Bearer token provider and refresh coalescing
//! ├── config        # File + environment config loading
//! ├── logger        # Tracing subscriber setup
//! └── metrics       # metrics-facade counters and histograms
//! ```

#![allow(
    clippy::significant_drop_tightening,
    reason = "Short parking_lot critical sections span the whole state update"
)]
#![allow(
    clippy::derive_partial_eq_without_eq,
    reason = "Some types intentionally don't implement Eq"
)]
// Test-only lints: allow panic!, println!, etc. in test code
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::print_stdout,
        clippy::float_cmp,
        clippy::unwrap_used,
        clippy::assertions_on_result_states
    )
)]

pub mod cache;
pub mod config;
pub mod credentials;
pub mod gateway;
pub mod logger;
pub mod metrics;
pub mod resilience;
pub mod transport;
mod utils;

pub use cache::{cache_key, ResponseCache};
pub use config::load_config;
pub use credentials::{CredentialProvider, StaticTokenProvider};
pub use gateway::{Gateway, GatewayBuilder, RequestDescriptor, DEFAULT_SERVICE};
pub use logger::init_tracing;
pub use metrics::init_metrics;
pub use resilience::{
    CircuitBreaker, CircuitBreakerRegistry, RateLimiter, RetryPolicy, StateListener,
};
pub use transport::{
    HttpTransport, Transport, TransportError, TransportRequest, TransportResponse,
};

// Re-export the shared types so embedders need a single dependency
pub use uplink_types::{
    BackoffConfig, BreakerStats, CircuitBreakerConfig, CircuitBreakerSummary, CircuitState,
    ConfigError, GatewayConfig, GatewayError, HttpMethod, RateLimitConfig, RateLimitSource,
    ResponseEnvelope, TypedError,
};
