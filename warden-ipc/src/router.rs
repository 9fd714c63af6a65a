//! Handler registry keyed by message kind

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, warn};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::error::HandlerError;
use crate::protocol::{MessageEnvelope, MessageKind};

/// Handles one kind of inbound envelope
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Produce the reply for a request, or `None` when no reply is due
    async fn handle(&self, request: &MessageEnvelope) -> Result<Option<MessageEnvelope>, HandlerError>;
}

/// Adapter for plain functions
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&MessageEnvelope) -> Result<Option<MessageEnvelope>, HandlerError> + Send + Sync,
{
    async fn handle(&self, request: &MessageEnvelope) -> Result<Option<MessageEnvelope>, HandlerError> {
        (self.0)(request)
    }
}

/// Routing table from message kind to handler
#[derive(Clone, Default)]
pub struct MessageRouter {
    routes: HashMap<MessageKind, Arc<dyn MessageHandler>>,
}

impl MessageRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a kind, replacing any previous one
    pub fn route<H>(mut self, kind: MessageKind, handler: H) -> Self
    where
        H: MessageHandler + 'static,
    {
        self.routes.insert(kind, Arc::new(handler));
        self
    }

    /// Register a plain function for a kind
    pub fn route_fn<F>(self, kind: MessageKind, f: F) -> Self
    where
        F: Fn(&MessageEnvelope) -> Result<Option<MessageEnvelope>, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        self.route(kind, FnHandler(f))
    }

    /// Whether a handler exists for a kind
    pub fn handles(&self, kind: MessageKind) -> bool {
        self.routes.contains_key(&kind)
    }

    /// Dispatch one request. Faults never escape: a missing handler, a handler
    /// error, or a handler panic all become an `Error` reply.
    pub async fn dispatch(&self, request: &MessageEnvelope) -> Option<MessageEnvelope> {
        let Some(handler) = self.routes.get(&request.kind()) else {
            debug!("No handler for {} ({})", request.kind(), request.correlation_id());
            return Some(MessageEnvelope::error_reply(
                request,
                HandlerError::Unsupported(request.kind()).to_string(),
            ));
        };

        match AssertUnwindSafe(handler.handle(request)).catch_unwind().await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("Handler for {} failed: {}", request.kind(), e);
                Some(MessageEnvelope::error_reply(request, e.to_string()))
            }
            Err(_) => {
                error!("Handler for {} panicked", request.kind());
                Some(MessageEnvelope::error_reply(
                    request,
                    format!("internal error while handling {}", request.kind()),
                ))
            }
        }
    }
}
