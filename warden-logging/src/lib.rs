//! Logging setup for Warden
//!
//! Library crates log through the `log` facade and the worker and binary
//! through `tracing`; the subscriber installed here collects both.

pub mod init;

pub use init::{init_logging, init_simple_tracing, LoggingGuard};
