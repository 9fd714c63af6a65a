//! Circuit breaker pattern implementation
//!
//! Counts consecutive failed calls across every caller. Once the threshold is
//! reached the circuit opens and calls are rejected without running until the
//! break duration elapses; then exactly one trial call is let through.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests are blocked
    Open,
    /// Circuit is half-open, one trial request is allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// How long the circuit stays open before a trial call
    #[serde(with = "humantime_serde")]
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            break_duration: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker metrics
#[derive(Debug, Clone, Default)]
pub struct CircuitMetrics {
    /// Total number of recorded outcomes
    pub total_requests: u64,
    /// Number of successful requests
    pub total_successes: u64,
    /// Number of failed requests
    pub total_failures: u64,
    /// Number of requests rejected due to open circuit
    pub total_rejected: u64,
    /// Current consecutive failures
    pub consecutive_failures: u32,
    /// Last failure time
    pub last_failure_time: Option<Instant>,
    /// Last success time
    pub last_success_time: Option<Instant>,
    /// Last state change time
    pub last_state_change: Option<Instant>,
}

/// Thread-safe circuit breaker
#[derive(Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

struct CircuitBreakerState {
    state: CircuitState,
    metrics: CircuitMetrics,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                metrics: CircuitMetrics::default(),
                opened_at: None,
                trial_in_flight: false,
            })),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Configuration in use
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Check if the circuit breaker is open (requests should be blocked)
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Get the current state
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock();
        self.update_state(&mut state);
        state.state
    }

    /// Ask to run one call. Closed always allows; half-open allows only the
    /// single trial; open rejects and counts the rejection.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.update_state(&mut state);

        let allowed = match state.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen if !state.trial_in_flight => {
                state.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen | CircuitState::Open => false,
        };

        if !allowed {
            state.metrics.total_rejected += 1;
        }
        allowed
    }

    /// Time left before a trial call is allowed, if the circuit is open
    pub fn remaining_break(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        self.update_state(&mut state);

        match (state.state, state.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                Some(self.config.break_duration.saturating_sub(opened_at.elapsed()))
            }
            _ => None,
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        self.update_state(&mut state);

        let now = Instant::now();
        state.metrics.total_requests += 1;
        state.metrics.total_successes += 1;
        state.metrics.last_success_time = Some(now);
        state.metrics.consecutive_failures = 0;

        if state.state == CircuitState::HalfOpen {
            self.transition_to_closed(&mut state);
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        self.update_state(&mut state);

        let now = Instant::now();
        state.metrics.total_requests += 1;
        state.metrics.total_failures += 1;
        state.metrics.last_failure_time = Some(now);
        state.metrics.consecutive_failures = state.metrics.consecutive_failures.saturating_add(1);

        match state.state {
            CircuitState::Closed => {
                if state.metrics.consecutive_failures >= self.config.failure_threshold {
                    self.transition_to_open(&mut state);
                }
            }
            CircuitState::HalfOpen => {
                // Failed trial, start a fresh break
                self.transition_to_open(&mut state);
            }
            CircuitState::Open => {
                // Already open, no action needed
            }
        }
    }

    /// Give back a trial slot without recording an outcome, e.g. when the
    /// trial call was cancelled
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.trial_in_flight = false;
    }

    /// Get current metrics
    pub fn metrics(&self) -> CircuitMetrics {
        let state = self.state.lock();
        state.metrics.clone()
    }

    /// Consecutive failures recorded so far
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().metrics.consecutive_failures
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.state = CircuitState::Closed;
        state.metrics = CircuitMetrics::default();
        state.opened_at = None;
        state.trial_in_flight = false;
        state.metrics.last_state_change = Some(Instant::now());
        log::info!("Circuit breaker reset");
    }

    // Internal methods

    fn update_state(&self, state: &mut CircuitBreakerState) {
        if state.state == CircuitState::Open {
            if let Some(opened_at) = state.opened_at {
                if opened_at.elapsed() >= self.config.break_duration {
                    self.transition_to_half_open(state);
                }
            }
        }
    }

    fn transition_to_open(&self, state: &mut CircuitBreakerState) {
        let now = Instant::now();
        state.state = CircuitState::Open;
        state.opened_at = Some(now);
        state.trial_in_flight = false;
        state.metrics.last_state_change = Some(now);
        log::error!(
            "Circuit breaker opened after {} consecutive failures, breaking for {:?}",
            state.metrics.consecutive_failures,
            self.config.break_duration
        );
    }

    fn transition_to_closed(&self, state: &mut CircuitBreakerState) {
        state.state = CircuitState::Closed;
        state.opened_at = None;
        state.trial_in_flight = false;
        state.metrics.consecutive_failures = 0;
        state.metrics.last_state_change = Some(Instant::now());
        log::info!("Circuit breaker closed after successful trial");
    }

    fn transition_to_half_open(&self, state: &mut CircuitBreakerState) {
        state.state = CircuitState::HalfOpen;
        state.trial_in_flight = false;
        state.metrics.last_state_change = Some(Instant::now());
        log::info!("Circuit breaker half-open, allowing one trial call");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, break_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            break_duration: Duration::from_secs(break_secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_basic_flow() {
        let breaker = breaker(3, 10);

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire());

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.try_acquire());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // Exactly one trial
        assert!(breaker.try_acquire());
        assert!(!breaker.try_acquire());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_with_fresh_break() {
        let breaker = breaker(2, 60);

        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.is_open());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(breaker.is_open());
        let remaining = breaker.remaining_break().unwrap();
        assert!(remaining > Duration::ZERO && remaining <= Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_count() {
        let breaker = breaker(3, 60);

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_trial_can_be_retaken() {
        let breaker = breaker(1, 5);
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(breaker.try_acquire());
        breaker.release();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire());
    }

    #[tokio::test]
    async fn test_circuit_breaker_metrics() {
        let breaker = CircuitBreaker::with_defaults();

        breaker.record_success();
        breaker.record_success();
        breaker.record_failure();

        let metrics = breaker.metrics();
        assert_eq!(metrics.total_requests, 3);
        assert_eq!(metrics.total_successes, 2);
        assert_eq!(metrics.total_failures, 1);
        assert_eq!(metrics.total_rejected, 0);
    }

    #[tokio::test]
    async fn test_reset_closes_circuit() {
        let breaker = breaker(1, 3600);
        breaker.record_failure();
        assert!(breaker.is_open());

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire());
    }
}
