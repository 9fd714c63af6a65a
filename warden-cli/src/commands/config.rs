//! `warden config` subcommands

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{error, info};
use warden_config::{ConfigLoader, WardenConfig};

use crate::output::OutputFormatter;

/// Load and validate a configuration file, environment overrides included
pub fn validate(config_file: &Path, out: &OutputFormatter) -> Result<()> {
    info!("Validating configuration file: {}", config_file.display());

    if !config_file.exists() {
        anyhow::bail!("Configuration file not found: {}", config_file.display());
    }

    match ConfigLoader::new().from_file(config_file) {
        Ok(_) => {
            out.print_success("Configuration file is valid");
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            out.print_error(&format!("Configuration validation failed: {}", e));
            Err(e.into())
        }
    }
}

/// Write the default configuration as YAML, or print it
pub fn generate(output: Option<&Path>, force: bool, out: &OutputFormatter) -> Result<()> {
    let sample = WardenConfig::generate_sample().context("Failed to render sample configuration")?;

    let Some(output) = output else {
        print!("{}", sample);
        return Ok(());
    };

    if output.exists() && !force {
        anyhow::bail!(
            "Output file already exists: {}. Use --force to overwrite.",
            output.display()
        );
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }
    fs::write(output, sample)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    out.print_success(&format!("Configuration written to {}", output.display()));
    Ok(())
}
