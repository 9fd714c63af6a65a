//! IPC transport implementations
//!
//! Every envelope travels as one length-delimited frame: a 4 byte big-endian
//! length followed by the JSON body. Frames larger than the configured maximum
//! are rejected, and a stream that ends mid-frame is a protocol failure.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::error::IpcError;
use crate::protocol::{self, MessageEnvelope};

/// Default upper bound for one frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// IPC transport trait for different communication mechanisms
#[async_trait]
pub trait IpcTransport: Send {
    /// Send a message to the other end
    async fn send(&mut self, message: &MessageEnvelope) -> Result<(), IpcError>;

    /// Receive a message from the other end
    async fn receive(&mut self) -> Result<MessageEnvelope, IpcError>;

    /// Close the transport
    async fn close(&mut self) -> Result<(), IpcError>;
}

/// Length-delimited transport over any byte stream
pub struct FramedTransport<S> {
    framed: Framed<S, LengthDelimitedCodec>,
    max_frame_bytes: usize,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a new framed transport
    pub fn new(stream: S, max_frame_bytes: usize) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .max_frame_length(max_frame_bytes)
            .new_codec();

        Self {
            framed: Framed::new(stream, codec),
            max_frame_bytes,
        }
    }

    /// Receive one raw frame
    async fn receive_frame(&mut self) -> Result<Bytes, IpcError> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(frame.freeze()),
            Some(Err(e)) => Err(match e.kind() {
                std::io::ErrorKind::InvalidData => IpcError::InvalidFrame(format!(
                    "{} (limit {} bytes)",
                    e, self.max_frame_bytes
                )),
                // LengthDelimitedCodec reports a partial trailing frame as `Other`
                std::io::ErrorKind::Other => IpcError::InvalidFrame(e.to_string()),
                _ => IpcError::from(e),
            }),
            None => Err(IpcError::ConnectionClosed),
        }
    }
}

#[async_trait]
impl<S> IpcTransport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &MessageEnvelope) -> Result<(), IpcError> {
        let bytes = protocol::encode(message)
            .map_err(|e| IpcError::SerializationError(e.to_string()))?;

        if bytes.len() > self.max_frame_bytes {
            return Err(IpcError::InvalidFrame(format!(
                "{} envelope is {} bytes, limit is {}",
                message.kind(),
                bytes.len(),
                self.max_frame_bytes
            )));
        }

        self.framed.send(Bytes::from(bytes)).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<MessageEnvelope, IpcError> {
        let frame = self.receive_frame().await?;
        Ok(protocol::decode(&frame)?)
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        SinkExt::<Bytes>::close(&mut self.framed).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::protocol::MessageKind;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_envelope_over_duplex() {
        let (a, b) = tokio::io::duplex(8 * 1024);
        let mut left = FramedTransport::new(a, DEFAULT_MAX_FRAME_BYTES);
        let mut right = FramedTransport::new(b, DEFAULT_MAX_FRAME_BYTES);

        let envelope = MessageEnvelope::new(MessageKind::GetStatus, "hello");
        left.send(&envelope).await.unwrap();

        let received = right.receive().await.unwrap();
        assert_eq!(received, envelope);
    }

    #[tokio::test]
    async fn test_oversized_send_rejected() {
        let (a, _b) = tokio::io::duplex(1024);
        let mut transport = FramedTransport::new(a, 128);

        let envelope = MessageEnvelope::new(MessageKind::StatusResponse, "x".repeat(512));
        let result = transport.send(&envelope).await;
        assert!(matches!(result, Err(IpcError::InvalidFrame(_))));
    }

    #[tokio::test]
    async fn test_oversized_receive_rejected() {
        let (mut raw, b) = tokio::io::duplex(1024);
        let mut transport = FramedTransport::new(b, 128);

        raw.write_all(&4096u32.to_be_bytes()).await.unwrap();
        raw.write_all(&[b'x'; 64]).await.unwrap();

        let result = transport.receive().await;
        assert!(matches!(result, Err(IpcError::InvalidFrame(_))));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_protocol_failure() {
        let (mut raw, b) = tokio::io::duplex(1024);
        let mut transport = FramedTransport::new(b, DEFAULT_MAX_FRAME_BYTES);

        raw.write_all(&100u32.to_be_bytes()).await.unwrap();
        raw.write_all(b"{\"kind\":").await.unwrap();
        drop(raw);

        let result = transport.receive().await;
        assert!(matches!(result, Err(IpcError::InvalidFrame(_))));
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let (mut raw, b) = tokio::io::duplex(1024);
        let mut transport = FramedTransport::new(b, DEFAULT_MAX_FRAME_BYTES);

        let body = b"not an envelope";
        raw.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
        raw.write_all(body).await.unwrap();

        let result = transport.receive().await;
        assert!(matches!(
            result,
            Err(IpcError::Decode(DecodeError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn test_clean_close() {
        let (a, b) = tokio::io::duplex(1024);
        let mut left = FramedTransport::new(a, DEFAULT_MAX_FRAME_BYTES);
        let mut right = FramedTransport::new(b, DEFAULT_MAX_FRAME_BYTES);

        left.close().await.unwrap();
        drop(left);
        assert!(matches!(right.receive().await, Err(IpcError::ConnectionClosed)));
    }
}
