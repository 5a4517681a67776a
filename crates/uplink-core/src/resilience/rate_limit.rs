//! Token bucket limiting the gateway's outbound call rate.
//!
//! Tokens refill lazily on each admission from elapsed monotonic time; no
//! background task runs. Refill and consumption happen under one lock.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use uplink_types::RateLimitConfig;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Shared token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Bucket starts full.
    pub fn new(config: RateLimitConfig) -> Self {
        let tokens = f64::from(config.capacity);
        Self { config, bucket: Mutex::new(Bucket { tokens, last_refill: Instant::now() }) }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Take one token, or return the estimated wait until one is available.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        if !self.config.enabled {
            return Ok(());
        }

        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let deficit = 1.0 - bucket.tokens;
        let wait_ms = (deficit * 1000.0 / self.config.refill_per_sec).ceil().max(1.0);
        debug!(tokens = bucket.tokens, wait_ms, "Rate limit bucket empty");
        Err(Duration::from_millis(wait_ms as u64))
    }

    /// Tokens currently available, after refilling.
    pub fn available_tokens(&self) -> f64 {
        if !self.config.enabled {
            return f64::from(self.config.capacity);
        }
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let added = elapsed.as_nanos() as f64 * self.config.refill_per_sec / 1e9;
        bucket.tokens = (bucket.tokens + added).min(f64::from(self.config.capacity));
        bucket.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::advance;

    fn limiter(capacity: u32, refill_per_sec: f64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig { enabled: true, capacity, refill_per_sec })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_reject_with_wait() {
        let limiter = limiter(2, 10.0);

        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        assert_eq!(limiter.try_acquire(), Err(Duration::from_millis(100)));

        advance(Duration::from_millis(50)).await;
        assert_eq!(limiter.try_acquire(), Err(Duration::from_millis(50)));

        advance(Duration::from_millis(50)).await;
        assert!(limiter.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_capped_at_capacity() {
        let limiter = limiter(3, 10.0);
        for _ in 0..3 {
            limiter.try_acquire().ok();
        }
        assert_eq!(limiter.available_tokens(), 0.0);

        advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.available_tokens(), 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_admits_everything() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            capacity: 1,
            refill_per_sec: 1.0,
        });

        for _ in 0..100 {
            assert!(limiter.try_acquire().is_ok());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_admissions_never_overdraw() {
        let limiter = Arc::new(limiter(50, 1.0));

        let tasks = (0..10).map(|_| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                let mut admitted = 0u32;
                for _ in 0..20 {
                    if limiter.try_acquire().is_ok() {
                        admitted += 1;
                    }
                    tokio::task::yield_now().await;
                }
                admitted
            })
        });

        let mut total = 0;
        for admitted in futures::future::join_all(tasks).await {
            total += admitted.unwrap_or(0);
        }
        assert_eq!(total, 50);
        assert!(limiter.available_tokens() >= 0.0);
    }
}
