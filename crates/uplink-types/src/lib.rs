//! # Uplink Types
//!
//! Core types, models, and error definitions for the Uplink gateway.
//!
//! - **`error`** - Typed error hierarchy for gateway requests and configuration
//! - **`models`** - Config models, HTTP method, response envelope, breaker stats
//!
//! ## Architecture Role
//!
//! `uplink-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!        uplink-types (this crate)
//!                │
//!                ▼
//!           uplink-core
//!                │
//!                ▼
//!           uplink-cli
//! ```
//!
//! All types are designed to be:
//! - **Serializable** via serde for logs, CLI output, and config files
//! - **Clone** for cheap sharing across async boundaries
//! - **PartialEq** for testing and comparison

pub mod error;
pub mod models;

// Re-export error types for convenience
pub use error::{ConfigError, GatewayError, RateLimitSource, Result, TypedError};

// Re-export core model types
pub use models::{
    BackoffConfig, BreakerStats, CircuitBreakerConfig, CircuitBreakerSummary, CircuitState,
    GatewayConfig, HttpMethod, RateLimitConfig, ResponseEnvelope,
};
