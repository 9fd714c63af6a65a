//! Backoff strategies for retry policies

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed,

    /// delay = unit * base^attempt
    Exponential {
        /// Growth factor, e.g. 2.0 for doubling
        base: f64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential { base: 2.0 }
    }
}

/// Backoff delay calculator
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    strategy: BackoffStrategy,
    unit: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl BackoffCalculator {
    /// Create a new backoff calculator
    pub fn new(strategy: BackoffStrategy, unit: Duration, max_delay: Duration, jitter: bool) -> Self {
        Self {
            strategy,
            unit,
            max_delay,
            jitter,
        }
    }

    /// Delay before retry number `attempt` (the first retry is attempt 1)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.calculate_base_delay(attempt);
        let capped_delay = base_delay.min(self.max_delay);

        if self.jitter {
            add_jitter(capped_delay).min(self.max_delay)
        } else {
            capped_delay
        }
    }

    fn calculate_base_delay(&self, attempt: u32) -> Duration {
        match &self.strategy {
            BackoffStrategy::Fixed => self.unit,

            BackoffStrategy::Exponential { base } => {
                let multiplier = base.powi(attempt.min(i32::MAX as u32) as i32);
                let secs = self.unit.as_secs_f64() * multiplier;
                // Huge or non-finite products saturate at the cap
                Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
            }
        }
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();

    // Add ±20% jitter
    let jitter_factor = rng.gen_range(0.8..1.2);
    delay.mul_f64(jitter_factor)
}
