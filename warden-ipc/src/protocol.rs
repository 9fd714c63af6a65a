//! IPC protocol definitions and message envelope codec

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::DecodeError;
use crate::models::ErrorPayload;

/// Request/response discriminator carried by every envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    GetStatus,
    StatusResponse,
    RestartService,
    GetBackupList,
    BackupListResponse,
    UpdateConfiguration,
    ConfigurationUpdated,
    Error,
    Heartbeat,
    HeartbeatResponse,

    /// Any kind this build does not know about. Decoding never fails because a
    /// newer peer sent a newer kind; the router answers it with `Error`.
    #[serde(other)]
    Unknown,
}

impl MessageKind {
    /// Whether this kind is sent by the control process
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            MessageKind::GetStatus
                | MessageKind::RestartService
                | MessageKind::GetBackupList
                | MessageKind::UpdateConfiguration
                | MessageKind::Heartbeat
        )
    }

    /// The kind a successful reply to this request carries
    pub fn response_kind(&self) -> Option<MessageKind> {
        match self {
            MessageKind::GetStatus => Some(MessageKind::StatusResponse),
            MessageKind::GetBackupList => Some(MessageKind::BackupListResponse),
            MessageKind::UpdateConfiguration => Some(MessageKind::ConfigurationUpdated),
            MessageKind::Heartbeat => Some(MessageKind::HeartbeatResponse),
            // Restart is acknowledged with a status snapshot
            MessageKind::RestartService => Some(MessageKind::StatusResponse),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Message envelope for all IPC communications.
///
/// Fields are private: an envelope is immutable once built and travels as a
/// single frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    kind: MessageKind,
    #[serde(default)]
    payload: String,
    timestamp: DateTime<Utc>,
    correlation_id: String,
}

impl MessageEnvelope {
    /// Create a new envelope with a fresh correlation id
    pub fn new(kind: MessageKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a request without payload
    pub fn request(kind: MessageKind) -> Self {
        Self::new(kind, String::new())
    }

    /// Create an envelope whose payload is `value` serialized as JSON
    pub fn with_json<T: Serialize>(kind: MessageKind, value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(kind, serde_json::to_string(value)?))
    }

    /// Build a reply that carries the request's correlation id
    pub fn reply_to(request: &MessageEnvelope, kind: MessageKind, payload: impl Into<String>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            timestamp: Utc::now(),
            correlation_id: request.correlation_id.clone(),
        }
    }

    /// Build a JSON reply that carries the request's correlation id
    pub fn json_reply_to<T: Serialize>(
        request: &MessageEnvelope,
        kind: MessageKind,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::reply_to(request, kind, serde_json::to_string(value)?))
    }

    /// Build an `Error` reply for a request
    pub fn error_reply(request: &MessageEnvelope, message: impl Into<String>) -> Self {
        let payload = ErrorPayload {
            message: message.into(),
        };
        // ErrorPayload is a single string field; serialization cannot fail
        let payload = serde_json::to_string(&payload).unwrap_or_default();
        Self::reply_to(request, MessageKind::Error, payload)
    }

    /// Build an `Error` envelope that answers no particular request
    pub fn error(message: impl Into<String>) -> Self {
        let payload = ErrorPayload {
            message: message.into(),
        };
        let payload = serde_json::to_string(&payload).unwrap_or_default();
        Self::new(MessageKind::Error, payload)
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Interpret the payload as JSON
    pub fn json_payload<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        serde_json::from_str(&self.payload).map_err(|e| DecodeError::Payload {
            kind: self.kind,
            reason: e.to_string(),
        })
    }

    /// Message text of an `Error` envelope
    pub fn error_message(&self) -> Option<String> {
        if self.kind != MessageKind::Error {
            return None;
        }
        Some(
            self.json_payload::<ErrorPayload>()
                .map(|p| p.message)
                .unwrap_or_else(|_| self.payload.clone()),
        )
    }
}

/// Encode an envelope into its UTF-8 JSON wire form
pub fn encode(envelope: &MessageEnvelope) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(envelope)
}

/// Decode an envelope from its wire form. Truncated or malformed input is an error;
/// there is no partial recovery.
pub fn decode(bytes: &[u8]) -> Result<MessageEnvelope, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::Utf8(e.to_string()))?;
    serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))
}
