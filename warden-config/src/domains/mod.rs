//! Domain-specific configuration modules

pub mod backup;
pub mod ipc;
pub mod logging;
pub mod resilience;
pub mod scheduler;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Warden configuration combining all domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WardenConfig {
    /// Local channel configuration
    pub ipc: ipc::IpcConfig,

    /// Worker loop configuration
    pub scheduler: scheduler::SchedulerConfig,

    /// Retry and circuit breaker configuration
    pub resilience: resilience::ResilienceConfig,

    /// Backup store and detection configuration
    pub backup: backup::BackupConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl WardenConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.ipc.validate()?;
        self.scheduler.validate()?;
        self.resilience.validate()?;
        self.backup.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> ConfigResult<String> {
        let config = WardenConfig::default();
        Ok(serde_yaml::to_string(&config)?)
    }
}
