//! Configuration loading and environment variable handling

use crate::domains::WardenConfig;
use crate::error::{ConfigError, ConfigResult};
use log::debug;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "WARDEN".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<WardenConfig> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: WardenConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;

        // Apply environment variable overrides
        self.apply_env_overrides(&mut config)?;

        // Validate all domains
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from defaults and environment variables only
    pub fn from_env(&self) -> ConfigResult<WardenConfig> {
        let mut config = WardenConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<WardenConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut WardenConfig) -> ConfigResult<()> {
        if let Some(path) = self.get_env_var("SOCKET_PATH") {
            config.ipc.socket_path = PathBuf::from(path);
        }

        if let Some(seconds) = self.parse_env_var::<u64>("BACKUP_INTERVAL_SECONDS")? {
            config.scheduler.interval = Duration::from_secs(seconds);
        }

        if let Some(folder) = self.get_env_var("BACKUP_FOLDER") {
            config.backup.folder = PathBuf::from(folder);
        }

        if let Some(retries) = self.parse_env_var::<u32>("MAX_RETRIES")? {
            config.resilience.max_retries = retries;
        }

        if let Some(level) = self.parse_env_var("LOG_LEVEL")? {
            config.logging.level = level;
        }

        if let Some(format) = self.parse_env_var("LOG_FORMAT")? {
            config.logging.format = format;
        }

        Ok(())
    }

    /// Read and parse a prefixed variable; unset means no override
    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Some(raw) => raw.trim().parse().map(Some).map_err(|e| ConfigError::EnvError {
                var: format!("{}_{}", self.prefix, name),
                message: format!("{} ({:?})", e, raw),
            }),
            None => Ok(None),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Option<String> {
        std::env::var(format!("{}_{}", self.prefix, name)).ok()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
