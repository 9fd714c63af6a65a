//! Retry and circuit breaker configuration

use crate::domains::utils::serde_duration;
use crate::error::ConfigResult;
use crate::validation::{validate_duration, validate_positive, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resilience configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retries after the first attempt of a cycle
    pub max_retries: u32,

    /// Exponential growth factor between retries
    pub backoff_base: f64,

    /// Delay unit; retry n waits `backoff_unit * backoff_base^n`
    #[serde(with = "serde_duration")]
    pub backoff_unit: Duration,

    /// Cap on a single retry delay
    #[serde(with = "serde_duration")]
    pub max_backoff: Duration,

    /// Add ±20% jitter to retry delays
    pub jitter: bool,

    /// Consecutive failed cycles before the circuit opens
    pub failure_threshold: u32,

    /// How long the circuit stays open
    #[serde(with = "serde_duration")]
    pub break_duration: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2.0,
            backoff_unit: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            jitter: false,
            failure_threshold: 5,
            break_duration: Duration::from_secs(60),
        }
    }
}

impl Validatable for ResilienceConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !self.backoff_base.is_finite() || self.backoff_base < 1.0 {
            return Err(self.validation_error(format!(
                "backoff_base must be at least 1.0, got {}",
                self.backoff_base
            )));
        }

        validate_duration(self.max_backoff, "max_backoff", self.domain_name())?;
        validate_positive(self.failure_threshold, "failure_threshold", self.domain_name())?;
        validate_duration(self.break_duration, "break_duration", self.domain_name())?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "resilience"
    }
}
