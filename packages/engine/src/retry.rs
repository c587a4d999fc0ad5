//! Exponential backoff and circuit breaker for gateway/oracle calls.
//!
//! Defaults: 5 consecutive failures trips the breaker, 60s backoff cap,
//! 60s recovery probe.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// `min(initial * multiplier^attempt, max)`, matching
    /// `min(base_delay * 2**attempt, 60.0)` in the original source.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Trips after `failure_threshold` consecutive failures; after
/// `recovery_timeout` elapses it allows exactly one probe call through
/// (`HalfOpen`) before either closing (probe succeeded) or re-opening
/// (probe failed).
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    consecutive_failures: u32,
    state: BreakerState,
    opened_at: Option<std::time::Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            consecutive_failures: 0,
            state: BreakerState::Closed,
            opened_at: None,
        }
    }

    pub fn default_breaker() -> Self {
        Self::new(5, Duration::from_secs(60))
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Whether a call is currently allowed through. Transitions `Open` →
    /// `HalfOpen` once the recovery timeout has elapsed.
    pub fn allow_call(&mut self) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = self.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.recovery_timeout {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = BreakerState::Closed;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.state == BreakerState::HalfOpen || self.consecutive_failures >= self.failure_threshold {
            self.state = BreakerState::Open;
            self.opened_at = Some(std::time::Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_60s() {
        let config = RetryConfig::default();
        assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.backoff_for_attempt(6), Duration::from_secs(60));
        assert_eq!(config.backoff_for_attempt(20), Duration::from_secs(60));
    }

    #[test]
    fn breaker_trips_after_five_failures() {
        let mut breaker = CircuitBreaker::default_breaker();
        for _ in 0..4 {
            breaker.record_failure();
            assert_eq!(breaker.state(), BreakerState::Closed);
        }
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow_call());
    }

    #[test]
    fn breaker_closes_on_success() {
        let mut breaker = CircuitBreaker::default_breaker();
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        // Simulate manual half-open probe without waiting on the real clock.
        breaker.state = BreakerState::HalfOpen;
        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.allow_call());
    }

    #[test]
    fn half_open_failure_reopens() {
        let mut breaker = CircuitBreaker::default_breaker();
        breaker.state = BreakerState::HalfOpen;
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
