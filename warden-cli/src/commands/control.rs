//! One-shot requests to a running worker

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use serde::de::DeserializeOwned;
use warden_config::IpcConfig;
use warden_ipc::{
    BackupRecord, ClientOptions, HeartbeatInfo, IpcClient, MessageEnvelope, MessageKind,
    RuntimeSettings, ServiceStatus, SettingsUpdate,
};

use crate::output::{flag, OutputFormatter};

pub fn client_options(config: &IpcConfig) -> ClientOptions {
    ClientOptions {
        socket_path: config.socket_path.clone(),
        max_frame_bytes: config.max_frame_bytes,
        request_timeout: config.request_timeout,
    }
}

/// Connect within the configured timeout
pub async fn connect(config: &IpcConfig) -> Result<IpcClient> {
    let client = IpcClient::new(client_options(config));
    client
        .connect(config.connect_timeout)
        .await
        .with_context(|| {
            format!(
                "Cannot reach the Warden service at {}",
                config.socket_path.display()
            )
        })?;
    Ok(client)
}

/// Send `request` and decode a reply of the `expected` kind
pub async fn call<T: DeserializeOwned>(
    client: &IpcClient,
    request: &MessageEnvelope,
    expected: MessageKind,
) -> Result<T> {
    let reply = client
        .send(request)
        .await
        .with_context(|| format!("{} request failed", request.kind()))?;

    match reply.kind() {
        kind if kind == expected => Ok(reply.json_payload()?),
        MessageKind::Error => bail!(
            "Service refused {}: {}",
            request.kind(),
            reply.error_message().unwrap_or_default()
        ),
        other => bail!("Unexpected {} reply to {}", other, request.kind()),
    }
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn print_status(out: &OutputFormatter, status: &ServiceStatus) {
    out.print_fields(&[
        ("Running", flag(status.is_running)),
        ("Healthy", flag(status.is_healthy)),
        (
            "Last heartbeat",
            status
                .last_heartbeat
                .map(format_time)
                .unwrap_or_else(|| "never".to_string()),
        ),
        ("Active documents", status.active_documents.to_string()),
        ("Total backups", status.total_backups.to_string()),
        ("Started", format_time(status.service_start_time)),
        ("Version", status.version.clone()),
        ("Scheduler", status.scheduler_state.clone()),
        ("Circuit", status.circuit_state.clone()),
    ]);

    if !status.recent_errors.is_empty() {
        println!();
        out.print_warning("Recent errors:");
        for error in &status.recent_errors {
            println!("  {}", error);
        }
    }
}

pub async fn status(config: &IpcConfig, out: &OutputFormatter) -> Result<()> {
    let client = connect(config).await?;
    let request = MessageEnvelope::request(MessageKind::GetStatus);
    let status: ServiceStatus = call(&client, &request, MessageKind::StatusResponse).await?;
    client.disconnect().await;

    if out.is_json() {
        return out.print_json(&status);
    }
    print_status(out, &status);
    Ok(())
}

pub async fn heartbeat(config: &IpcConfig, out: &OutputFormatter) -> Result<()> {
    let client = connect(config).await?;
    let request = MessageEnvelope::request(MessageKind::Heartbeat);
    let info: HeartbeatInfo = call(&client, &request, MessageKind::HeartbeatResponse).await?;
    client.disconnect().await;

    if out.is_json() {
        return out.print_json(&info);
    }

    let last = info
        .last_success
        .map(format_time)
        .unwrap_or_else(|| "never".to_string());
    if info.is_healthy {
        out.print_success(&format!("Worker healthy, last successful cycle: {}", last));
    } else {
        out.print_warning(&format!("Worker unhealthy, last successful cycle: {}", last));
    }
    Ok(())
}

pub async fn backups(config: &IpcConfig, limit: Option<usize>, out: &OutputFormatter) -> Result<()> {
    let client = connect(config).await?;
    let request = MessageEnvelope::request(MessageKind::GetBackupList);
    let mut records: Vec<BackupRecord> =
        call(&client, &request, MessageKind::BackupListResponse).await?;
    client.disconnect().await;

    if let Some(limit) = limit {
        records.truncate(limit);
    }

    if out.is_json() {
        return out.print_json(&records);
    }

    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            vec![
                format_time(r.backed_up_at),
                r.application.clone(),
                r.kind.to_string(),
                r.source_path.display().to_string(),
                r.size_bytes.to_string(),
            ]
        })
        .collect();
    out.print_table(&["Time", "Application", "Kind", "Source", "Bytes"], &rows);
    Ok(())
}

pub async fn restart(config: &IpcConfig, out: &OutputFormatter) -> Result<()> {
    let client = connect(config).await?;
    let request = MessageEnvelope::request(MessageKind::RestartService);
    let status: ServiceStatus = call(&client, &request, MessageKind::StatusResponse).await?;
    client.disconnect().await;

    if out.is_json() {
        return out.print_json(&status);
    }
    out.print_success("Restart requested, a backup cycle will run now");
    print_status(out, &status);
    Ok(())
}

pub async fn configure(config: &IpcConfig, update: SettingsUpdate, out: &OutputFormatter) -> Result<()> {
    if update.is_empty() {
        bail!("Nothing to change: pass --interval-minutes, --backup-folder or --max-versions");
    }

    let client = connect(config).await?;
    let request = MessageEnvelope::with_json(MessageKind::UpdateConfiguration, &update)?;
    let settings: RuntimeSettings =
        call(&client, &request, MessageKind::ConfigurationUpdated).await?;
    client.disconnect().await;

    if out.is_json() {
        return out.print_json(&settings);
    }
    out.print_success("Settings updated");
    out.print_fields(&[
        (
            "Interval",
            format!("{} min", settings.backup_interval_seconds / 60),
        ),
        ("Backup folder", settings.backup_folder.display().to_string()),
        ("Max versions", settings.max_versions.to_string()),
    ]);
    Ok(())
}
