//! Retry policy and executor

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::backoff::{BackoffCalculator, BackoffStrategy};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a call runs at most `max_retries + 1` times
    pub max_retries: u32,

    /// Delay unit the backoff strategy scales
    #[serde(with = "humantime_serde")]
    pub unit: Duration,

    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Backoff strategy
    pub backoff_strategy: BackoffStrategy,

    /// Whether to add jitter to retry delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            unit: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_strategy: BackoffStrategy::Exponential { base: 2.0 },
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Exponential policy: retry `n` waits `unit * base^n`
    pub fn exponential(max_retries: u32, base: f64, unit: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            unit,
            max_delay,
            backoff_strategy: BackoffStrategy::Exponential { base },
            jitter: false,
        }
    }

    /// Constant delay between retries
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            unit: delay,
            max_delay: delay,
            backoff_strategy: BackoffStrategy::Fixed,
            jitter: false,
        }
    }

    /// Never retry
    pub fn no_retry() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Calculate delay before a specific retry (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let calculator = BackoffCalculator::new(
            self.backoff_strategy.clone(),
            self.unit,
            self.max_delay,
            self.jitter,
        );

        calculator.calculate_delay(attempt)
    }
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether this error is retryable
    fn is_retryable(&self) -> bool;

    /// Whether this error is a deliberate cancellation. Cancellations are never
    /// retried and never count as failures.
    fn is_cancellation(&self) -> bool {
        false
    }

    /// Custom retry delay for this error type
    fn retry_delay(&self) -> Option<Duration> {
        None
    }
}

/// Retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Create with default policy
    pub fn with_default_policy() -> Self {
        Self::new(RetryPolicy::default())
    }

    /// Policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a function with retry logic
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        self.execute_with_context(&CancellationToken::new(), |_attempt| f())
            .await
    }

    /// Execute with retry logic, passing the attempt number (1-indexed) to `f`.
    /// Cancelling `cancel` stops before the next attempt and interrupts any
    /// backoff sleep.
    pub async fn execute_with_context<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let total_attempts = self.policy.max_retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            debug!("Executing attempt {} of {}", attempt, total_attempts);

            match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if error.is_cancellation() {
                        debug!("Operation cancelled on attempt {}", attempt);
                        return Err(RetryError::Cancelled);
                    }

                    if !error.is_retryable() {
                        warn!("Operation failed with non-retryable error: {}", error);
                        return Err(RetryError::NonRetryableError(error));
                    }

                    if attempt >= total_attempts {
                        warn!("Operation failed after {} attempts: {}", attempt, error);
                        return Err(RetryError::MaxAttemptsExceeded {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    // Retry number `attempt` follows attempt number `attempt`
                    let delay = error
                        .retry_delay()
                        .unwrap_or_else(|| self.policy.delay_for_attempt(attempt));

                    warn!(
                        "Attempt {} of {} failed: {}. Retrying in {:?}",
                        attempt, total_attempts, error, delay
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }

                    attempt += 1;
                }
            }
        }
    }
}

/// Retry error types
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts ({attempts}) exceeded. Last error: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },

    /// Non-retryable error encountered
    #[error("Non-retryable error: {0}")]
    NonRetryableError(E),

    /// Circuit breaker is open
    #[error("Circuit breaker is open")]
    CircuitBreakerOpen,

    /// The operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl<E> RetryError<E> {
    /// Get the underlying error if present
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::MaxAttemptsExceeded { last_error, .. } => Some(last_error),
            RetryError::NonRetryableError(error) => Some(error),
            RetryError::CircuitBreakerOpen | RetryError::Cancelled => None,
        }
    }

    /// Check if this represents a circuit breaker open error
    pub fn is_circuit_breaker_open(&self) -> bool {
        matches!(self, RetryError::CircuitBreakerOpen)
    }

    /// Check if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}
