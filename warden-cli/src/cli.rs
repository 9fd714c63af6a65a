//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Print raw JSON replies instead of formatted output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the background worker and serve the control channel
    Serve,

    /// Show service status
    Status,

    /// Show the worker heartbeat
    Heartbeat,

    /// List recent backups
    Backups {
        /// Show at most this many entries
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },

    /// Reset the circuit breaker and run a backup cycle now
    Restart,

    /// Change runtime settings of the running worker
    Configure {
        /// Minutes between backup cycles
        #[arg(long, value_name = "MINUTES")]
        interval_minutes: Option<u64>,

        /// Folder for new backups
        #[arg(long, value_name = "PATH")]
        backup_folder: Option<PathBuf>,

        /// Versions kept per document
        #[arg(long, value_name = "N")]
        max_versions: Option<usize>,
    },

    /// Poll status on a timer, reconnecting when the channel drops
    Watch {
        /// Seconds between polls
        #[arg(long, value_name = "SECS", default_value_t = 5)]
        every: u64,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config_file: PathBuf,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output file path; prints to stdout when absent
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Whether the command talks to a running worker
    pub fn is_control(&self) -> bool {
        !matches!(self, Commands::Serve | Commands::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_configure() {
        let cli = Cli::try_parse_from([
            "warden",
            "configure",
            "--interval-minutes",
            "5",
            "--max-versions",
            "3",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Configure {
                interval_minutes,
                backup_folder,
                max_versions,
            }) => {
                assert_eq!(interval_minutes, Some(5));
                assert_eq!(backup_folder, None);
                assert_eq!(max_versions, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["warden", "status", "--json", "--config", "/etc/warden.yaml"])
            .unwrap();

        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/warden.yaml")));
        assert!(cli.command.unwrap().is_control());
    }

    #[test]
    fn test_watch_default_interval() {
        let cli = Cli::try_parse_from(["warden", "watch"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Watch { every: 5 })));
    }

    #[test]
    fn test_config_validate_requires_file() {
        assert!(Cli::try_parse_from(["warden", "config", "validate"]).is_err());

        let cli = Cli::try_parse_from(["warden", "config", "validate", "--config-file", "w.yaml"])
            .unwrap();
        assert!(!cli.command.unwrap().is_control());
    }
}
