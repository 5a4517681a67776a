//! Typed error definitions for Uplink.
//!
//! This module provides a structured error hierarchy with specific error types
//! for different domains. All errors are designed to be:
//!
//! - **Serializable** for CLI output and structured logs via serde
//! - **Displayable** for logging via Display trait
//! - **Matchable** for retry and breaker decisions via enum variants
//! - **Composable** via thiserror derive macros

mod config;
mod gateway;

pub use config::ConfigError;
pub use gateway::{GatewayError, RateLimitSource};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type that wraps all domain-specific errors.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "domain", content = "error")]
pub enum TypedError {
    /// Wraps a request pipeline error
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Wraps a configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Standard Result type using TypedError.
pub type Result<T> = std::result::Result<T, TypedError>;
