//! Resilience patterns for Warden
//!
//! This crate provides retry with backoff, a consecutive-failure circuit
//! breaker, the composite policy that layers them, and graceful shutdown
//! coordination.

pub mod backoff;
pub mod circuit_breaker;
pub mod policy;
pub mod retry;
pub mod shutdown;

// Re-export commonly used types
pub use backoff::{BackoffCalculator, BackoffStrategy};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState};
pub use policy::ResiliencePolicy;
pub use retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};
pub use shutdown::{ShutdownCoordinator, ShutdownError};
