//! Bounded retry with exponential backoff and jitter.
//!
//! The policy wraps a whole attempt (normally one breaker `execute`), so an
//! open circuit surfaces as `CircuitOpen` and ends the loop at once.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uplink_types::{BackoffConfig, GatewayError};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, BackoffConfig::default())
    }
}

impl RetryPolicy {
    /// `max_retries` counts re-attempts after the first call.
    pub fn new(max_retries: u32, backoff: BackoffConfig) -> Self {
        Self { max_retries, backoff }
    }

    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self::new(0, BackoffConfig::default())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before re-attempt `attempt` (1-indexed); zero for the first call.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, rand::thread_rng().gen::<f64>())
    }

    /// Delay with an explicit jitter sample in `[0.0, 1.0]`; 0.5 means none.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base_us = (self.backoff.base_delay_ms as f64 * 1000.0)
            * self.backoff.multiplier.powi(exponent);
        let max_us = self.backoff.max_delay_ms as f64 * 1000.0;
        let base_us = base_us.min(max_us);

        let jitter_range = base_us * self.backoff.jitter_factor;
        let offset = (jitter.clamp(0.0, 1.0) * 2.0 - 1.0) * jitter_range;
        let final_us = (base_us + offset).clamp(0.0, max_us);

        Duration::from_micros(final_us as u64)
    }

    /// Run `op` until it succeeds, fails fatally, or retries run out.
    ///
    /// `op` receives the attempt number (0 for the first call). Backoff
    /// sleeps end early with `Cancelled` when `cancel` fires.
    pub async fn run<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0u32;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(attempts = attempt + 1, "Request succeeded after retry");
                    }
                    return Ok(value);
                },
                Err(error @ GatewayError::CircuitOpen { .. }) => return Err(error),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after failure"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => {
                            debug!(attempt, "Backoff abandoned, request cancelled");
                            return Err(GatewayError::Cancelled);
                        },
                        () = tokio::time::sleep(delay) => {},
                    }
                },
                Err(error) => {
                    if error.is_retryable() && self.max_retries > 0 {
                        warn!(attempts = attempt + 1, error = %error, "Retries exhausted");
                    }
                    return Err(error);
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            BackoffConfig {
                base_delay_ms: 100,
                max_delay_ms: 1_000,
                multiplier: 2.0,
                jitter_factor: 0.25,
            },
        )
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = policy(5);

        assert_eq!(policy.delay_with_jitter(0, 0.5), Duration::ZERO);
        assert_eq!(policy.delay_with_jitter(1, 0.5), Duration::from_millis(100));
        assert_eq!(policy.delay_with_jitter(2, 0.5), Duration::from_millis(200));
        assert_eq!(policy.delay_with_jitter(3, 0.5), Duration::from_millis(400));
        assert_eq!(policy.delay_with_jitter(5, 0.5), Duration::from_millis(1_000));
        assert_eq!(policy.delay_with_jitter(40, 0.5), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = policy(3);

        assert_eq!(policy.delay_with_jitter(1, 0.0), Duration::from_millis(75));
        assert_eq!(policy.delay_with_jitter(1, 1.0), Duration::from_millis(125));
        // Never exceeds the cap even with full positive jitter
        assert_eq!(policy.delay_with_jitter(10, 1.0), Duration::from_millis(1_000));

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(2);
            assert!(delay >= Duration::from_millis(150) && delay <= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_errors_use_all_attempts() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), _> = policy(2)
            .run(&cancel, |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Server { status: 503, message: "unavailable".to_string() })
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Server { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_later_attempt() {
        let cancel = CancellationToken::new();

        let result = policy(3)
            .run(&cancel, |attempt| async move {
                if attempt < 2 {
                    Err(GatewayError::Timeout { timeout_ms: 10 })
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_not_retried() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), _> = policy(3)
            .run(&cancel, |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Server { status: 404, message: "missing".to_string() })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_open_returns_immediately() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let result: Result<(), _> = policy(3)
            .run(&cancel, |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::CircuitOpen { service: "users".to_string(), retry_after_ms: 500 })
            })
            .await;

        assert!(matches!(result, Err(GatewayError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = RetryPolicy::new(
            3,
            BackoffConfig { base_delay_ms: 10_000, max_delay_ms: 10_000, ..Default::default() },
        )
        .run(&cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            let trigger = trigger.clone();
            async move {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    trigger.cancel();
                });
                Err(GatewayError::Network { message: "refused".to_string() })
            }
        })
        .await;

        assert_eq!(result, Err(GatewayError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
