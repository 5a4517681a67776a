//! Circuit breaker state machine
//!
//! Pure transition logic with the clock passed in; locking, timeouts and
//! notifications live in the parent module.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;
use uplink_types::{CircuitBreakerConfig, CircuitState};

/// A state change produced by one settlement or admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub reason: &'static str,
}

/// Mutable state of one breaker
#[derive(Debug)]
pub(crate) struct BreakerCore {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure: Option<Instant>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub total_trips: u64,
}

impl Default for BreakerCore {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            last_failure_at: None,
            total_trips: 0,
        }
    }
}

impl BreakerCore {
    /// Decide whether a call may proceed.
    ///
    /// While open and before the reset timeout, returns the remaining wait.
    /// Once the timeout has elapsed the call itself moves the breaker to
    /// half-open.
    pub fn admit(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
    ) -> Result<Option<Transition>, Duration> {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(None),
            CircuitState::Open => match self.remaining_open(config, now) {
                Some(remaining) => Err(remaining),
                None => {
                    self.state = CircuitState::HalfOpen;
                    self.success_count = 0;
                    Ok(Some(Transition {
                        from: CircuitState::Open,
                        to: CircuitState::HalfOpen,
                        reason: "reset timeout elapsed, probing",
                    }))
                },
            },
        }
    }

    pub fn on_success(&mut self, config: &CircuitBreakerConfig) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                None
            },
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= config.success_threshold {
                    self.close();
                    Some(Transition {
                        from: CircuitState::HalfOpen,
                        to: CircuitState::Closed,
                        reason: "dependency recovered",
                    })
                } else {
                    None
                }
            },
            // A straggler admitted before the breaker opened
            CircuitState::Open => None,
        }
    }

    pub fn on_failure(
        &mut self,
        config: &CircuitBreakerConfig,
        now: Instant,
    ) -> Option<Transition> {
        self.failure_count = self.failure_count.saturating_add(1);

        match self.state {
            CircuitState::Closed => {
                self.stamp_failure(now);
                if self.failure_count >= config.failure_threshold {
                    self.open();
                    Some(Transition {
                        from: CircuitState::Closed,
                        to: CircuitState::Open,
                        reason: "failure threshold reached",
                    })
                } else {
                    None
                }
            },
            CircuitState::HalfOpen => {
                self.stamp_failure(now);
                self.success_count = 0;
                self.open();
                Some(Transition {
                    from: CircuitState::HalfOpen,
                    to: CircuitState::Open,
                    reason: "trial call failed",
                })
            },
            CircuitState::Open => None,
        }
    }

    pub fn force_open(&mut self, now: Instant) -> Option<Transition> {
        let from = self.state;
        self.stamp_failure(now);
        if from == CircuitState::Open {
            return None;
        }
        self.open();
        Some(Transition { from, to: CircuitState::Open, reason: "tripped manually" })
    }

    pub fn force_closed(&mut self) -> Option<Transition> {
        let from = self.state;
        self.close();
        if from == CircuitState::Closed {
            return None;
        }
        Some(Transition { from, to: CircuitState::Closed, reason: "reset manually" })
    }

    /// Time left before the next trial call, while open.
    pub fn remaining_open(&self, config: &CircuitBreakerConfig, now: Instant) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        let elapsed =
            self.last_failure.map_or(Duration::MAX, |at| now.saturating_duration_since(at));
        let remaining = config.reset_timeout().saturating_sub(elapsed);
        if remaining.is_zero() {
            None
        } else {
            Some(remaining)
        }
    }

    fn stamp_failure(&mut self, now: Instant) {
        self.last_failure = Some(now);
        self.last_failure_at = Some(Utc::now());
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.total_trips += 1;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 2,
            reset_timeout_ms: 100,
            request_timeout_ms: 1_000,
        }
    }

    #[test]
    fn test_straggler_failure_does_not_restamp() {
        let config = config();
        let start = Instant::now();
        let mut core = BreakerCore::default();

        core.on_failure(&config, start);
        assert!(core.on_failure(&config, start).is_some());
        assert_eq!(core.state, CircuitState::Open);

        let later = start + Duration::from_millis(60);
        assert!(core.on_failure(&config, later).is_none());
        assert_eq!(core.failure_count, 3);
        assert_eq!(core.last_failure, Some(start));
    }

    #[test]
    fn test_remaining_open_counts_down() {
        let config = config();
        let start = Instant::now();
        let mut core = BreakerCore::default();
        core.force_open(start);

        assert_eq!(
            core.remaining_open(&config, start + Duration::from_millis(40)),
            Some(Duration::from_millis(60))
        );
        assert_eq!(core.remaining_open(&config, start + Duration::from_millis(100)), None);
    }

    #[test]
    fn test_force_closed_from_closed_is_silent() {
        let mut core = BreakerCore::default();
        core.failure_count = 1;
        assert!(core.force_closed().is_none());
        assert_eq!(core.failure_count, 0);
    }
}
