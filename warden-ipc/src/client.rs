//! Local socket client
//!
//! One request is in flight per client at a time: callers are serialised on the
//! connection lock, and each `send` writes one envelope and waits for exactly one
//! reply. Any transport failure drops the connection; reconnecting is the
//! caller's call.

use log::{debug, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::UnixStream;
use tokio::sync::Mutex;

use crate::error::IpcError;
use crate::protocol::{MessageEnvelope, MessageKind};
use crate::transport::{FramedTransport, IpcTransport, DEFAULT_MAX_FRAME_BYTES};

/// Client settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Well-known channel path
    pub socket_path: PathBuf,
    /// Largest frame accepted or sent
    pub max_frame_bytes: usize,
    /// How long to wait for the reply to one request
    pub request_timeout: Duration,
}

impl ClientOptions {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Client end of the channel
pub struct IpcClient {
    options: ClientOptions,
    connection: Mutex<Option<FramedTransport<UnixStream>>>,
    connected: AtomicBool,
}

impl IpcClient {
    /// Create a disconnected client
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            connection: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Whether the last connect succeeded and no send has failed since
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connect, giving up after `timeout`. Any previous connection is dropped
    /// first, and nothing is kept on failure.
    pub async fn connect(&self, timeout: Duration) -> Result<(), IpcError> {
        let mut connection = self.connection.lock().await;
        *connection = None;
        self.connected.store(false, Ordering::SeqCst);

        let path = &self.options.socket_path;
        let stream = match tokio::time::timeout(timeout, UnixStream::connect(path)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!("Connect to {} failed: {}", path.display(), e);
                return Err(e.into());
            }
            Err(_) => {
                debug!("Connect to {} timed out after {:?}", path.display(), timeout);
                return Err(IpcError::Timeout("connection"));
            }
        };

        *connection = Some(FramedTransport::new(stream, self.options.max_frame_bytes));
        self.connected.store(true, Ordering::SeqCst);
        debug!("Connected to {}", path.display());
        Ok(())
    }

    /// Send one envelope and wait for its reply. Fails without I/O when
    /// disconnected; a transport failure leaves the client disconnected.
    pub async fn send(&self, message: &MessageEnvelope) -> Result<MessageEnvelope, IpcError> {
        let mut connection = self.connection.lock().await;
        let Some(transport) = connection.as_mut() else {
            return Err(IpcError::NotConnected);
        };

        let result = Self::round_trip(transport, message, self.options.request_timeout).await;

        if let Err(e) = &result {
            warn!("{} request failed, dropping connection: {}", message.kind(), e);
            *connection = None;
            self.connected.store(false, Ordering::SeqCst);
        }

        result
    }

    /// Send a request that carries no payload
    pub async fn request(&self, kind: MessageKind) -> Result<MessageEnvelope, IpcError> {
        self.send(&MessageEnvelope::request(kind)).await
    }

    /// Drop the connection. Safe to call at any time, any number of times.
    pub async fn disconnect(&self) {
        let mut connection = self.connection.lock().await;
        if let Some(mut transport) = connection.take() {
            let _ = transport.close().await;
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn round_trip(
        transport: &mut FramedTransport<UnixStream>,
        message: &MessageEnvelope,
        request_timeout: Duration,
    ) -> Result<MessageEnvelope, IpcError> {
        transport.send(message).await?;

        match tokio::time::timeout(request_timeout, transport.receive()).await {
            Ok(reply) => reply,
            Err(_) => Err(IpcError::Timeout("reply")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let client = IpcClient::new(ClientOptions::new("/nonexistent/warden.sock"));
        assert!(!client.is_connected());

        let result = client.request(MessageKind::GetStatus).await;
        assert!(matches!(result, Err(IpcError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_to_absent_server_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let client = IpcClient::new(ClientOptions::new(dir.path().join("missing.sock")));

        let started = Instant::now();
        let result = client.connect(Duration::from_secs(2)).await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let client = IpcClient::new(ClientOptions::new("/nonexistent/warden.sock"));
        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected());
    }
}
