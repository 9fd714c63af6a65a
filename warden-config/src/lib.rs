//! Domain-driven configuration management for Warden
//!
//! This crate provides configuration split by functional domains, loaded from
//! YAML with `WARDEN_*` environment overrides and validated per domain.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    backup::{BackupConfig, WatchedApplication},
    ipc::IpcConfig,
    logging::{LogFileConfig, LogFormat, LogLevel, LoggingConfig},
    resilience::ResilienceConfig,
    scheduler::SchedulerConfig,
    WardenConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
