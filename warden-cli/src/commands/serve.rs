//! `warden serve`: the background worker process

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};
use warden_config::WardenConfig;
use warden_resilience::ShutdownCoordinator;
use warden_worker::WardenService;

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Grace the coordinator allows: the longer of the scheduler's and the
/// server's own grace, plus a second for them to report back
pub fn shutdown_grace(config: &WardenConfig) -> Duration {
    config.scheduler.shutdown_grace.max(config.ipc.shutdown_grace) + Duration::from_secs(1)
}

pub async fn serve(config: WardenConfig) -> Result<()> {
    // Binding happens here: a second instance or an unusable socket path
    // fails before any background work starts
    let service = WardenService::from_config(&config).context("Failed to start the Warden service")?;
    let coordinator = ShutdownCoordinator::new(shutdown_grace(&config));

    info!(
        socket = %service.socket_path().display(),
        interval_secs = config.scheduler.interval.as_secs(),
        backup_folder = %config.backup.folder.display(),
        "Warden service ready"
    );

    let outcome = tokio::select! {
        result = service.run(&coordinator) => result.context("Control channel failed"),
        _ = shutdown_signal() => Ok(()),
    };

    if let Err(e) = coordinator.shutdown().await {
        warn!("Shutdown incomplete: {}", e);
    }

    info!("Warden service stopped");
    outcome
}
