//! Status polling with automatic reconnect

use anyhow::Result;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use warden_config::IpcConfig;
use warden_ipc::{IpcClient, MessageEnvelope, MessageKind, ServiceStatus};

use super::control::{call, client_options, format_time};
use crate::output::{flag, OutputFormatter};

/// Channel state as last printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Connected,
    Disconnected,
}

/// Poll once: reconnect if needed, then fetch status. Never waits longer
/// than the connect timeout plus the request timeout.
async fn poll(client: &IpcClient, config: &IpcConfig) -> Result<ServiceStatus> {
    if !client.is_connected() {
        client.connect(config.connect_timeout).await?;
    }

    let request = MessageEnvelope::request(MessageKind::GetStatus);
    call(client, &request, MessageKind::StatusResponse).await
}

fn print_line(out: &OutputFormatter, status: &ServiceStatus) {
    let heartbeat = status
        .last_heartbeat
        .map(format_time)
        .unwrap_or_else(|| "never".to_string());

    out.print_info(&format!(
        "healthy: {}  last heartbeat: {}  documents: {}  backups: {}  circuit: {}",
        flag(status.is_healthy),
        heartbeat,
        status.active_documents,
        status.total_backups,
        status.circuit_state
    ));
}

pub async fn watch(config: &IpcConfig, every: Duration, out: &OutputFormatter) -> Result<()> {
    let client = IpcClient::new(client_options(config));
    let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut link = None;

    out.print_info(&format!(
        "Watching {} every {}s, Ctrl-C to stop",
        config.socket_path.display(),
        every.as_secs()
    ));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }

        match poll(&client, config).await {
            Ok(status) => {
                if link != Some(Link::Connected) {
                    out.print_success("Connected");
                    link = Some(Link::Connected);
                }
                if out.is_json() {
                    out.print_json(&status)?;
                } else {
                    print_line(out, &status);
                }
            }
            Err(e) => {
                debug!("Status poll failed: {:#}", e);
                if link != Some(Link::Disconnected) {
                    out.print_warning(&format!("Disconnected: {:#}", e));
                    link = Some(Link::Disconnected);
                }
            }
        }
    }

    client.disconnect().await;
    Ok(())
}
