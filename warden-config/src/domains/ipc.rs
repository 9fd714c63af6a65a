//! Local channel configuration

use crate::domains::utils::serde_duration;
use crate::error::ConfigResult;
use crate::validation::{validate_duration, validate_path, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Smallest frame limit that still fits a status reply
const MIN_FRAME_BYTES: usize = 1024;

/// Largest frame limit the 4-byte length prefix can carry sensibly
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// IPC channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Well-known socket path shared by worker and control process
    pub socket_path: PathBuf,

    /// Largest envelope frame in bytes
    pub max_frame_bytes: usize,

    /// Client connect timeout
    #[serde(with = "serde_duration")]
    pub connect_timeout: Duration,

    /// Client wait for one reply
    #[serde(with = "serde_duration")]
    pub request_timeout: Duration,

    /// Server closes sessions idle for this long
    #[serde(with = "serde_duration")]
    pub session_idle_timeout: Duration,

    /// Server wait for live sessions on shutdown
    #[serde(with = "serde_duration")]
    pub shutdown_grace: Duration,

    /// Pause after a failed accept
    #[serde(with = "serde_duration")]
    pub accept_retry_delay: Duration,

    /// Group whose members may use the channel besides the owner and root
    pub admin_group: Option<String>,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_frame_bytes: 64 * 1024,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            session_idle_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(5),
            accept_retry_delay: Duration::from_secs(1),
            admin_group: Some("wheel".to_string()),
        }
    }
}

/// `$XDG_RUNTIME_DIR/warden/warden.sock`, or a per-user directory under the
/// system temp dir when there is no runtime dir
pub fn default_socket_path() -> PathBuf {
    match dirs::runtime_dir() {
        Some(dir) => dir.join("warden").join("warden.sock"),
        None => {
            let user = std::env::var("USER").unwrap_or_else(|_| "default".to_string());
            std::env::temp_dir()
                .join(format!("warden-{}", user))
                .join("warden.sock")
        }
    }
}

impl Validatable for IpcConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_path(&self.socket_path, "socket_path", self.domain_name())?;

        if !(MIN_FRAME_BYTES..=MAX_FRAME_BYTES).contains(&self.max_frame_bytes) {
            return Err(self.validation_error(format!(
                "max_frame_bytes must be between {} and {}, got {}",
                MIN_FRAME_BYTES, MAX_FRAME_BYTES, self.max_frame_bytes
            )));
        }

        validate_duration(self.connect_timeout, "connect_timeout", self.domain_name())?;
        validate_duration(self.request_timeout, "request_timeout", self.domain_name())?;
        validate_duration(
            self.session_idle_timeout,
            "session_idle_timeout",
            self.domain_name(),
        )?;

        if let Some(group) = &self.admin_group {
            validate_required_string(group, "admin_group", self.domain_name())?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "ipc"
    }
}
