//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file {}: {source}", path.display())]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid Warden configuration
    #[error("Failed to parse config file {}: {source}", path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Rendering a configuration as YAML failed
    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] serde_yaml::Error),

    /// A `WARDEN_*` override is present but unusable
    #[error("Invalid {var}: {message}")]
    EnvError { var: String, message: String },

    /// A domain failed validation
    #[error("Invalid {domain} configuration: {message}")]
    DomainError { domain: String, message: String },
}
