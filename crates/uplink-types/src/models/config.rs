//! Gateway configuration models.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

use crate::error::ConfigError;

// ============================================================================
// Circuit breaker
// ============================================================================

/// Circuit breaker thresholds for one dependency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures while closed before the circuit opens
    #[validate(range(min = 1))]
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the circuit closes
    #[validate(range(min = 1))]
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Time the circuit stays open before the next trial call
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
    /// Deadline for a single attempt through the breaker
    #[validate(range(min = 1))]
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Token bucket shared by every request of one gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct RateLimitConfig {
    /// Disable to admit every request
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum tokens held (burst size)
    #[validate(range(min = 1))]
    #[serde(default = "default_rate_capacity")]
    pub capacity: u32,
    /// Tokens added per second of elapsed time
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_rate_capacity(),
            refill_per_sec: default_refill_per_sec(),
        }
    }
}

// ============================================================================
// Retry backoff
// ============================================================================

/// Exponential backoff with jitter between retry attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct BackoffConfig {
    /// Delay before the first re-attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor per attempt
    #[validate(range(min = 1.0))]
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Delay is randomized by +/- this fraction
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Construction-time configuration of a gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct GatewayConfig {
    /// Remote backend root; request paths are appended to it
    #[validate(url)]
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-attempt deadline when the descriptor has no override
    #[validate(range(min = 1))]
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Re-attempts after the first call for retry-flagged requests
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Master switch for the response cache
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// TTL applied when the descriptor does not name one
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Entry count that triggers cleanup
    #[validate(range(min = 1))]
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
    /// Thresholds used for every service without an override
    #[validate(nested)]
    #[serde(default)]
    pub breaker: CircuitBreakerConfig,
    /// Per-service breaker overrides, keyed by service name
    #[serde(default)]
    pub services: HashMap<String, CircuitBreakerConfig>,
    #[validate(nested)]
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[validate(nested)]
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            cache_enabled: true,
            cache_ttl_ms: default_cache_ttl_ms(),
            cache_max_entries: default_cache_max_entries(),
            breaker: CircuitBreakerConfig::default(),
            services: HashMap::new(),
            rate_limit: RateLimitConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Validate every section, including per-service overrides.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate().map_err(|e| ConfigError::from_validation_errors(&e))?;

        let mut names: Vec<&String> = self.services.keys().collect();
        names.sort();
        for name in names {
            if let Some(service) = self.services.get(name) {
                service.validate().map_err(|e| match ConfigError::from_validation_errors(&e) {
                    ConfigError::ValidationError { field, message } => {
                        ConfigError::ValidationError {
                            field: format!("services.{}.{}", name, field),
                            message,
                        }
                    },
                    other => other,
                })?;
            }
        }

        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(ConfigError::ValidationError {
                field: "backoff.max_delay_ms".to_string(),
                message: "must not be smaller than base_delay_ms".to_string(),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_true() -> bool {
    true
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_rate_capacity() -> u32 {
    20
}

fn default_refill_per_sec() -> f64 {
    10.0
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter_factor() -> f64 {
    0.25
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_cache_ttl_ms() -> u64 {
    30_000
}

fn default_cache_max_entries() -> usize {
    1_000
}
