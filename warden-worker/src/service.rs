//! Assembly of the running service: scheduler, backup store, handlers and the
//! control channel, all built from one configuration.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;
use warden_config::{IpcConfig, ResilienceConfig, WardenConfig};
use warden_ipc::{AccessPolicy, IpcError, IpcServer, RuntimeSettings, ServerOptions};
use warden_resilience::{CircuitBreakerConfig, ResiliencePolicy, RetryPolicy, ShutdownCoordinator};

use crate::backup::FileBackupStore;
use crate::detector::ProcessScanDetector;
use crate::error::WorkerError;
use crate::handlers::{service_router, ServiceContext};
use crate::scheduler::Scheduler;
use crate::target::TargetDetector;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Control channel unavailable: {0}")]
    Channel(#[from] IpcError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("Service task failed: {0}")]
    Task(String),
}

/// Resilience policy described by `config`
pub fn resilience_policy(config: &ResilienceConfig) -> ResiliencePolicy {
    let mut retry = RetryPolicy::exponential(
        config.max_retries,
        config.backoff_base,
        config.backoff_unit,
        config.max_backoff,
    );
    retry.jitter = config.jitter;

    ResiliencePolicy::new(
        retry,
        CircuitBreakerConfig {
            failure_threshold: config.failure_threshold,
            break_duration: config.break_duration,
        },
    )
}

/// Server options described by `config`
pub fn server_options(config: &IpcConfig) -> ServerOptions {
    ServerOptions {
        socket_path: config.socket_path.clone(),
        max_frame_bytes: config.max_frame_bytes,
        session_idle_timeout: config.session_idle_timeout,
        shutdown_grace: config.shutdown_grace,
        accept_retry_delay: config.accept_retry_delay,
    }
}

/// Initial runtime settings taken from static configuration
pub fn runtime_settings(config: &WardenConfig) -> RuntimeSettings {
    RuntimeSettings {
        backup_interval_seconds: config.scheduler.interval.as_secs(),
        backup_folder: config.backup.folder.clone(),
        max_versions: config.backup.max_versions,
    }
}

/// A bound, ready-to-run service
pub struct WardenService {
    scheduler: Scheduler,
    server: IpcServer,
    context: Arc<ServiceContext>,
}

impl WardenService {
    /// Build with the process-scan detector
    pub fn from_config(config: &WardenConfig) -> Result<Self, ServiceError> {
        let detector = ProcessScanDetector::spawn(
            config.backup.watched_applications.clone(),
            config.scheduler.scan_timeout,
        )?;
        Self::with_detector(config, Arc::new(detector))
    }

    /// Build around any detector. Binding the channel happens here, so a
    /// second instance fails before anything starts.
    pub fn with_detector(
        config: &WardenConfig,
        detector: Arc<dyn TargetDetector>,
    ) -> Result<Self, ServiceError> {
        let (settings_tx, settings_rx) = watch::channel(runtime_settings(config));
        let store = Arc::new(FileBackupStore::new(
            settings_rx.clone(),
            config.backup.history_limit,
        ));

        let (scheduler, handle) = Scheduler::new(
            config.scheduler.clone(),
            resilience_policy(&config.resilience),
            detector,
            store.clone(),
            settings_rx,
        );

        let context = Arc::new(ServiceContext {
            scheduler: handle,
            catalog: store,
            settings: settings_tx,
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        let policy = AccessPolicy::current_user_and_admins(config.ipc.admin_group.as_deref());
        let server = IpcServer::bind(
            server_options(&config.ipc),
            policy,
            service_router(Arc::clone(&context)),
        )?;

        Ok(Self {
            scheduler,
            server,
            context,
        })
    }

    pub fn context(&self) -> &Arc<ServiceContext> {
        &self.context
    }

    pub fn socket_path(&self) -> &Path {
        self.server.socket_path()
    }

    /// Start the scheduler and the server as tracked tasks and wait for the
    /// server to finish, which happens once the coordinator shuts down or the
    /// channel fails.
    pub async fn run(self, coordinator: &ShutdownCoordinator) -> Result<(), ServiceError> {
        info!(
            socket = %self.server.socket_path().display(),
            version = %self.context.version,
            "Warden service starting"
        );

        coordinator.spawn("scheduler", self.scheduler.run(coordinator.child_token()));
        let server = coordinator.spawn("ipc-server", self.server.run(coordinator.child_token()));

        match server.await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(e) => Err(ServiceError::Task(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warden_resilience::CircuitState;

    #[test]
    fn test_policy_follows_config() {
        let config = ResilienceConfig {
            failure_threshold: 2,
            break_duration: Duration::from_secs(5),
            ..Default::default()
        };
        let policy = resilience_policy(&config);

        assert_eq!(policy.breaker().config().failure_threshold, 2);
        assert_eq!(policy.breaker().config().break_duration, Duration::from_secs(5));
        assert_eq!(policy.circuit_state(), CircuitState::Closed);
    }

    #[test]
    fn test_runtime_settings_from_config() {
        let config = WardenConfig::default();
        let settings = runtime_settings(&config);

        assert_eq!(settings.backup_interval_seconds, 120);
        assert_eq!(settings.max_versions, 10);
        assert_eq!(settings.backup_folder, config.backup.folder);
    }
}
