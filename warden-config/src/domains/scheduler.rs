//! Worker loop configuration

use crate::domains::utils::serde_duration;
use crate::error::ConfigResult;
use crate::validation::{validate_duration, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Time between cycles
    #[serde(with = "serde_duration")]
    pub interval: Duration,

    /// Settle delay before the first cycle
    #[serde(with = "serde_duration")]
    pub initial_delay: Duration,

    /// Extra wait after a cycle fails past the resilience policy
    #[serde(with = "serde_duration")]
    pub failure_cooldown: Duration,

    /// Hard limit for one process-table scan on the automation thread
    #[serde(with = "serde_duration")]
    pub scan_timeout: Duration,

    /// Hard limit for one detection attempt, whatever the detector
    #[serde(with = "serde_duration")]
    pub detection_timeout: Duration,

    /// Hard limit for backing up one target; only that target fails
    #[serde(with = "serde_duration")]
    pub target_timeout: Duration,

    /// Heartbeat age after which the worker reports unhealthy
    #[serde(with = "serde_duration")]
    pub health_timeout: Duration,

    /// How long stopping waits for an in-flight cycle
    #[serde(with = "serde_duration")]
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            initial_delay: Duration::from_secs(10),
            failure_cooldown: Duration::from_secs(60),
            scan_timeout: Duration::from_secs(10),
            detection_timeout: Duration::from_secs(30),
            target_timeout: Duration::from_secs(60),
            health_timeout: Duration::from_secs(600),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl Validatable for SchedulerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_duration(self.interval, "interval", self.domain_name())?;
        validate_duration(self.scan_timeout, "scan_timeout", self.domain_name())?;
        validate_duration(self.detection_timeout, "detection_timeout", self.domain_name())?;
        validate_duration(self.target_timeout, "target_timeout", self.domain_name())?;
        validate_duration(self.health_timeout, "health_timeout", self.domain_name())?;

        // The interval is published to clients in whole seconds
        if self.interval.subsec_nanos() != 0 {
            return Err(self.validation_error("interval must be a whole number of seconds"));
        }

        if self.scan_timeout >= self.detection_timeout {
            return Err(self.validation_error(format!(
                "scan_timeout ({:?}) must be shorter than detection_timeout ({:?})",
                self.scan_timeout, self.detection_timeout
            )));
        }

        if self.health_timeout <= self.interval {
            return Err(self.validation_error(format!(
                "health_timeout ({}s) must be longer than interval ({}s)",
                self.health_timeout.as_secs(),
                self.interval.as_secs()
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "scheduler"
    }
}
