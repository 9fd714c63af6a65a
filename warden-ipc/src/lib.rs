//! Inter-process communication for Warden
//!
//! This crate provides the envelope protocol and the local, access-controlled
//! channel used between the background worker and its control process.

pub mod error;
pub mod models;
pub mod protocol;
pub mod router;
pub mod transport;

#[cfg(unix)]
pub mod access;
#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod server;

// Re-export commonly used types
pub use error::{DecodeError, HandlerError, IpcError};
pub use models::{
    BackupRecord, DocumentKind, ErrorPayload, HeartbeatInfo, RuntimeSettings, ServiceStatus,
    SettingsUpdate,
};
pub use protocol::{decode, encode, MessageEnvelope, MessageKind};
pub use router::{MessageHandler, MessageRouter};
pub use transport::{FramedTransport, IpcTransport, DEFAULT_MAX_FRAME_BYTES};

#[cfg(unix)]
pub use access::{AccessPolicy, PeerIdentity, Principal};
#[cfg(unix)]
pub use client::{ClientOptions, IpcClient};
#[cfg(unix)]
pub use server::{IpcServer, ServerOptions};
