//! Retry wrapped in a circuit breaker
//!
//! Retry is the inner layer and the breaker the outer one: the breaker sees the
//! final outcome of a fully retried call as a single success or failure.
//! Cancellation passes through both layers untouched.

use log::{debug, error};
use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};

/// Composite failure-handling policy around a unit of work
#[derive(Clone)]
pub struct ResiliencePolicy {
    retry: RetryExecutor,
    breaker: CircuitBreaker,
}

impl ResiliencePolicy {
    /// Build from retry and breaker settings
    pub fn new(retry: RetryPolicy, breaker: CircuitBreakerConfig) -> Self {
        Self {
            retry: RetryExecutor::new(retry),
            breaker: CircuitBreaker::new(breaker),
        }
    }

    /// Breaker handle
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Current breaker state
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Run `f` under retry and the breaker. `f` receives the attempt number.
    pub async fn execute<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        if !self.breaker.try_acquire() {
            debug!(
                "Circuit open, rejecting call ({:?} until trial)",
                self.breaker.remaining_break()
            );
            return Err(RetryError::CircuitBreakerOpen);
        }

        let mut permit = Permit {
            breaker: &self.breaker,
            settled: false,
        };

        match self.retry.execute_with_context(cancel, f).await {
            Ok(value) => {
                self.breaker.record_success();
                permit.settled = true;
                Ok(value)
            }
            // The permit releases the slot on drop
            Err(RetryError::Cancelled) => Err(RetryError::Cancelled),
            Err(e) => {
                self.breaker.record_failure();
                permit.settled = true;
                error!("Operation failed after retries: {}", e);
                Err(e)
            }
        }
    }
}

/// Gives an acquired breaker slot back unless an outcome was recorded, so a
/// cancelled or dropped call never holds the half-open trial.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release();
        }
    }
}
