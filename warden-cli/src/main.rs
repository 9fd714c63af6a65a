use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

use warden_config::{ConfigLoader, LogLevel, WardenConfig};
use warden_ipc::SettingsUpdate;
use warden_logging::{init_logging, init_simple_tracing};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands, ConfigCommands};
use commands::{config, control, serve, watch};
use output::OutputFormatter;

fn load_config(path: Option<&Path>, log_level: Option<&str>) -> Result<WardenConfig> {
    let mut config = ConfigLoader::new()
        .load(path)
        .context("Failed to load configuration")?;

    if let Some(level) = log_level {
        config.logging.level = level
            .parse::<LogLevel>()
            .map_err(|e| anyhow::anyhow!("Invalid --log-level: {}", e))?;
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let out = OutputFormatter::new(cli.json);

    let Some(command) = cli.command else {
        // If no subcommand is provided, print help
        use clap::CommandFactory;
        Cli::command().print_help().context("Failed to print help")?;
        println!();
        return Ok(());
    };

    if let Commands::Config { config_cmd } = &command {
        init_simple_tracing(cli.log_level.as_deref().unwrap_or("warn"))?;
        return match config_cmd {
            ConfigCommands::Validate { config_file } => config::validate(config_file, &out),
            ConfigCommands::Generate { output, force } => {
                config::generate(output.as_deref(), *force, &out)
            }
        };
    }

    let config = load_config(cli.config.as_deref(), cli.log_level.as_deref())?;

    if !command.is_control() {
        // Serve: full logging; the guard flushes the file sink when run returns
        let _guard = init_logging(&config.logging)?;
        info!("Warden {} starting", env!("CARGO_PKG_VERSION"));

        let result = serve::serve(config).await;
        if let Err(e) = &result {
            error!("Fatal: {:#}", e);
        }
        return result;
    }

    // Control commands keep stdout for their own output
    init_simple_tracing(cli.log_level.as_deref().unwrap_or("warn"))?;
    let ipc = &config.ipc;

    match command {
        Commands::Status => control::status(ipc, &out).await,
        Commands::Heartbeat => control::heartbeat(ipc, &out).await,
        Commands::Backups { limit } => control::backups(ipc, limit, &out).await,
        Commands::Restart => control::restart(ipc, &out).await,
        Commands::Configure {
            interval_minutes,
            backup_folder,
            max_versions,
        } => {
            let update = SettingsUpdate {
                backup_interval_minutes: interval_minutes,
                backup_folder,
                max_versions,
            };
            control::configure(ipc, update, &out).await
        }
        Commands::Watch { every } => watch::watch(ipc, Duration::from_secs(every), &out).await,
        Commands::Serve | Commands::Config { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::new(json).print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
