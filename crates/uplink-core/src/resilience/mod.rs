//! Resilience primitives composed by the gateway.

pub mod circuit_breaker;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, StateListener};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
