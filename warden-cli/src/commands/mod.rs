//! Subcommand implementations

pub mod config;
pub mod control;
pub mod serve;
pub mod watch;
