//! IPC error types

use thiserror::Error;

use crate::protocol::MessageKind;

/// IPC error types
#[derive(Debug, Error)]
pub enum IpcError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Envelope could not be decoded
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Connection closed by the peer
    #[error("Connection closed")]
    ConnectionClosed,

    /// Timeout waiting for a connection or a reply
    #[error("Timeout waiting for {0}")]
    Timeout(&'static str),

    /// Frame exceeds the configured maximum or ended mid-frame
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Transport not connected
    #[error("Transport not connected")]
    NotConnected,

    /// The channel endpoint is already served by another process
    #[error("Channel {0} is already in use")]
    AddressInUse(String),

    /// Peer is not on the access allow-list
    #[error("Access denied for peer uid {uid}")]
    AccessDenied { uid: u32 },
}

impl IpcError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IpcError::IoError(_)
                | IpcError::Timeout(_)
                | IpcError::ConnectionClosed
                | IpcError::NotConnected
        )
    }

    /// Check if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, IpcError::AddressInUse(_) | IpcError::AccessDenied { .. })
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset => IpcError::ConnectionClosed,
            std::io::ErrorKind::InvalidData => IpcError::InvalidFrame(err.to_string()),
            _ => IpcError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        IpcError::SerializationError(err.to_string())
    }
}

/// Envelope decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Empty frame")]
    Empty,

    #[error("Frame is not valid UTF-8: {0}")]
    Utf8(String),

    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Undecodable {kind} payload: {reason}")]
    Payload { kind: MessageKind, reason: String },
}

/// Error raised by a message handler; answered with an `Error` envelope
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("No handler registered for {0}")]
    Unsupported(MessageKind),

    #[error(transparent)]
    BadPayload(#[from] DecodeError),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Handler failed: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Internal(format!("failed to serialize reply: {}", err))
    }
}
