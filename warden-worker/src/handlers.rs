//! Worker-side handlers for control requests

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use warden_ipc::{
    HandlerError, MessageEnvelope, MessageHandler, MessageKind, MessageRouter, RuntimeSettings,
    ServiceStatus, SettingsUpdate,
};

use crate::scheduler::SchedulerHandle;
use crate::target::BackupCatalog;

/// State the handlers read from and publish to
pub struct ServiceContext {
    pub scheduler: SchedulerHandle,
    pub catalog: Arc<dyn BackupCatalog>,
    pub settings: watch::Sender<RuntimeSettings>,
    pub version: String,
}

impl ServiceContext {
    /// Current service status
    pub fn status(&self) -> ServiceStatus {
        let heartbeat = self.scheduler.heartbeat();

        ServiceStatus {
            is_running: self.scheduler.is_running(),
            is_healthy: heartbeat.is_healthy(),
            last_heartbeat: heartbeat.last_success(),
            active_documents: self
                .scheduler
                .last_report()
                .map(|report| report.detected)
                .unwrap_or(0),
            total_backups: self.catalog.total_backups(),
            service_start_time: heartbeat.service_start_time(),
            version: self.version.clone(),
            recent_errors: self.scheduler.recent_errors().snapshot(),
            scheduler_state: self.scheduler.state().to_string(),
            circuit_state: self.scheduler.circuit_state().to_string(),
        }
    }

    /// Validate an update and publish the resulting settings
    pub fn update_settings(&self, update: &SettingsUpdate) -> Result<RuntimeSettings, String> {
        let next = self.settings.borrow().apply(update)?;

        // A cycle must fit inside the health window or the worker never looks healthy
        let health_timeout = self.scheduler.heartbeat().health_timeout();
        if next.backup_interval_seconds >= health_timeout.as_secs() {
            return Err(format!(
                "backup interval ({}s) must be shorter than the health timeout ({}s)",
                next.backup_interval_seconds,
                health_timeout.as_secs()
            ));
        }

        self.settings.send_replace(next.clone());
        Ok(next)
    }
}

struct StatusHandler(Arc<ServiceContext>);

#[async_trait]
impl MessageHandler for StatusHandler {
    async fn handle(&self, request: &MessageEnvelope) -> Result<Option<MessageEnvelope>, HandlerError> {
        let reply = MessageEnvelope::json_reply_to(request, MessageKind::StatusResponse, &self.0.status())?;
        Ok(Some(reply))
    }
}

struct HeartbeatHandler(Arc<ServiceContext>);

#[async_trait]
impl MessageHandler for HeartbeatHandler {
    async fn handle(&self, request: &MessageEnvelope) -> Result<Option<MessageEnvelope>, HandlerError> {
        let info = self.0.scheduler.heartbeat().info();
        let reply = MessageEnvelope::json_reply_to(request, MessageKind::HeartbeatResponse, &info)?;
        Ok(Some(reply))
    }
}

struct BackupListHandler(Arc<ServiceContext>);

#[async_trait]
impl MessageHandler for BackupListHandler {
    async fn handle(&self, request: &MessageEnvelope) -> Result<Option<MessageEnvelope>, HandlerError> {
        let history = self.0.catalog.history().await;
        let reply = MessageEnvelope::json_reply_to(request, MessageKind::BackupListResponse, &history)?;
        Ok(Some(reply))
    }
}

struct UpdateConfigurationHandler(Arc<ServiceContext>);

#[async_trait]
impl MessageHandler for UpdateConfigurationHandler {
    async fn handle(&self, request: &MessageEnvelope) -> Result<Option<MessageEnvelope>, HandlerError> {
        let update: SettingsUpdate = request.json_payload()?;
        let settings = self.0.update_settings(&update).map_err(HandlerError::Rejected)?;

        info!(
            interval_secs = settings.backup_interval_seconds,
            folder = %settings.backup_folder.display(),
            max_versions = settings.max_versions,
            "Runtime settings updated"
        );

        let reply = MessageEnvelope::json_reply_to(request, MessageKind::ConfigurationUpdated, &settings)?;
        Ok(Some(reply))
    }
}

struct RestartHandler(Arc<ServiceContext>);

#[async_trait]
impl MessageHandler for RestartHandler {
    async fn handle(&self, request: &MessageEnvelope) -> Result<Option<MessageEnvelope>, HandlerError> {
        self.0
            .scheduler
            .restart()
            .map_err(|e| HandlerError::Rejected(e.to_string()))?;
        info!("Restart requested over the control channel");

        let reply = MessageEnvelope::json_reply_to(request, MessageKind::StatusResponse, &self.0.status())?;
        Ok(Some(reply))
    }
}

/// Router answering every control request kind
pub fn service_router(context: Arc<ServiceContext>) -> MessageRouter {
    MessageRouter::new()
        .route(MessageKind::GetStatus, StatusHandler(Arc::clone(&context)))
        .route(MessageKind::Heartbeat, HeartbeatHandler(Arc::clone(&context)))
        .route(MessageKind::GetBackupList, BackupListHandler(Arc::clone(&context)))
        .route(
            MessageKind::UpdateConfiguration,
            UpdateConfigurationHandler(Arc::clone(&context)),
        )
        .route(MessageKind::RestartService, RestartHandler(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use warden_config::SchedulerConfig;
    use warden_ipc::{BackupRecord, HeartbeatInfo};
    use warden_resilience::{CircuitBreakerConfig, ResiliencePolicy, RetryPolicy};

    use crate::error::WorkerError;
    use crate::scheduler::{Scheduler, SchedulerState};
    use crate::target::{Target, TargetDetector, TargetProcessor};

    struct NoTargets;

    #[async_trait]
    impl TargetDetector for NoTargets {
        async fn detect_targets(&self) -> Result<Vec<Target>, WorkerError> {
            Ok(Vec::new())
        }
    }

    struct NeverCalled;

    #[async_trait]
    impl TargetProcessor for NeverCalled {
        async fn process_target(&self, target: &Target) -> Result<BackupRecord, WorkerError> {
            Err(WorkerError::processing(&target.path, "unexpected"))
        }
    }

    struct FixedCatalog(Vec<BackupRecord>);

    #[async_trait]
    impl BackupCatalog for FixedCatalog {
        async fn history(&self) -> Vec<BackupRecord> {
            self.0.clone()
        }

        fn total_backups(&self) -> u64 {
            self.0.len() as u64
        }
    }

    fn record(name: &str) -> BackupRecord {
        BackupRecord {
            source_path: PathBuf::from("/docs").join(name),
            backup_path: PathBuf::from("/backups/Pdf").join(name),
            application: "Evince".to_string(),
            kind: warden_ipc::DocumentKind::Pdf,
            backed_up_at: chrono::Utc::now(),
            size_bytes: 42,
        }
    }

    fn settings() -> RuntimeSettings {
        RuntimeSettings {
            backup_interval_seconds: 120,
            backup_folder: PathBuf::from("/backups"),
            max_versions: 10,
        }
    }

    /// Router over a scheduler that is running but idle
    fn router() -> (MessageRouter, Arc<ServiceContext>, CancellationToken) {
        let (settings_tx, settings_rx) = watch::channel(settings());
        let mut config = SchedulerConfig::default();
        config.initial_delay = Duration::from_secs(3600);

        let (scheduler, handle) = Scheduler::new(
            config,
            ResiliencePolicy::new(RetryPolicy::no_retry(), CircuitBreakerConfig::default()),
            Arc::new(NoTargets),
            Arc::new(NeverCalled),
            settings_rx,
        );
        let cancel = CancellationToken::new();
        tokio::spawn(scheduler.run(cancel.clone()));

        let context = Arc::new(ServiceContext {
            scheduler: handle,
            catalog: Arc::new(FixedCatalog(vec![record("b.pdf"), record("a.pdf")])),
            settings: settings_tx,
            version: "0.2.0".to_string(),
        });
        (service_router(Arc::clone(&context)), context, cancel)
    }

    async fn dispatch(router: &MessageRouter, request: &MessageEnvelope) -> MessageEnvelope {
        router.dispatch(request).await.expect("reply")
    }

    #[tokio::test]
    async fn test_status_reply() {
        let (router, context, cancel) = router();
        assert!(context.scheduler.wait_for(SchedulerState::Running).await);

        let request = MessageEnvelope::request(MessageKind::GetStatus);
        let reply = dispatch(&router, &request).await;

        assert_eq!(reply.kind(), MessageKind::StatusResponse);
        assert_eq!(reply.correlation_id(), request.correlation_id());
        let status: ServiceStatus = reply.json_payload().unwrap();
        assert!(status.is_running);
        assert!(status.is_healthy);
        assert_eq!(status.last_heartbeat, None);
        assert_eq!(status.total_backups, 2);
        assert_eq!(status.version, "0.2.0");
        assert_eq!(status.scheduler_state, "running");
        assert_eq!(status.circuit_state, "closed");
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_heartbeat_reply() {
        let (router, _context, cancel) = router();

        let reply = dispatch(&router, &MessageEnvelope::request(MessageKind::Heartbeat)).await;

        assert_eq!(reply.kind(), MessageKind::HeartbeatResponse);
        let info: HeartbeatInfo = reply.json_payload().unwrap();
        assert!(info.is_healthy);
        assert!(info.last_success.is_none());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_backup_list_reply() {
        let (router, _context, cancel) = router();

        let reply = dispatch(&router, &MessageEnvelope::request(MessageKind::GetBackupList)).await;

        assert_eq!(reply.kind(), MessageKind::BackupListResponse);
        let history: Vec<BackupRecord> = reply.json_payload().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].source_path, PathBuf::from("/docs/b.pdf"));
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_update_configuration_publishes_settings() {
        let (router, context, cancel) = router();
        let mut watcher = context.settings.subscribe();

        let update = SettingsUpdate {
            backup_interval_minutes: Some(5),
            max_versions: Some(3),
            ..Default::default()
        };
        let request = MessageEnvelope::with_json(MessageKind::UpdateConfiguration, &update).unwrap();
        let reply = dispatch(&router, &request).await;

        assert_eq!(reply.kind(), MessageKind::ConfigurationUpdated);
        let applied: RuntimeSettings = reply.json_payload().unwrap();
        assert_eq!(applied.backup_interval_seconds, 300);
        assert_eq!(applied.max_versions, 3);
        assert_eq!(applied.backup_folder, PathBuf::from("/backups"));

        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), applied);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_invalid_update_is_rejected_unchanged() {
        let (router, context, cancel) = router();

        let update = SettingsUpdate {
            backup_interval_minutes: Some(0),
            ..Default::default()
        };
        let request = MessageEnvelope::with_json(MessageKind::UpdateConfiguration, &update).unwrap();
        let reply = dispatch(&router, &request).await;

        assert_eq!(reply.kind(), MessageKind::Error);
        assert!(reply.error_message().unwrap().contains("backup_interval_minutes"));
        assert_eq!(*context.settings.borrow(), settings());

        let garbage = MessageEnvelope::new(MessageKind::UpdateConfiguration, "not json");
        let reply = dispatch(&router, &garbage).await;
        assert_eq!(reply.kind(), MessageKind::Error);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_interval_beyond_health_timeout_is_rejected() {
        let (router, context, cancel) = router();

        // Default health timeout is 600s
        for minutes in [10, 24 * 60, u64::MAX] {
            let update = SettingsUpdate {
                backup_interval_minutes: Some(minutes),
                ..Default::default()
            };
            let request = MessageEnvelope::with_json(MessageKind::UpdateConfiguration, &update).unwrap();
            let reply = dispatch(&router, &request).await;
            assert_eq!(reply.kind(), MessageKind::Error, "{} minutes", minutes);
        }
        assert_eq!(*context.settings.borrow(), settings());
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_restart_acknowledged_with_status() {
        let (router, context, cancel) = router();
        assert!(context.scheduler.wait_for(SchedulerState::Running).await);

        let reply = dispatch(&router, &MessageEnvelope::request(MessageKind::RestartService)).await;
        assert_eq!(reply.kind(), MessageKind::StatusResponse);

        // Once the scheduler is gone, restart is refused
        cancel.cancel();
        assert!(context.scheduler.wait_for(SchedulerState::Stopped).await);
        let reply = dispatch(&router, &MessageEnvelope::request(MessageKind::RestartService)).await;
        assert_eq!(reply.kind(), MessageKind::Error);
    }
}
