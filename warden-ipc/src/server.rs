//! Local socket server
//!
//! One accept loop hands every authorised connection to its own session task
//! and goes straight back to accepting, so a slow client never holds up the
//! next one. Each session strictly alternates: read one envelope, dispatch it
//! through the router, write the reply, read the next.

use log::{debug, error, info, warn};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::access::{AccessPolicy, PeerIdentity};
use crate::error::IpcError;
use crate::protocol::MessageEnvelope;
use crate::router::MessageRouter;
use crate::transport::{FramedTransport, IpcTransport, DEFAULT_MAX_FRAME_BYTES};

/// Server settings
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Well-known channel path
    pub socket_path: PathBuf,
    /// Largest frame accepted or sent
    pub max_frame_bytes: usize,
    /// A session with no inbound envelope for this long is closed
    pub session_idle_timeout: Duration,
    /// How long shutdown waits for live sessions
    pub shutdown_grace: Duration,
    /// Pause after a failed accept
    pub accept_retry_delay: Duration,
}

impl ServerOptions {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            session_idle_timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(5),
            accept_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Removes the socket file when the server stops
struct SocketCleanup(PathBuf);

impl Drop for SocketCleanup {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove socket {}: {}", self.0.display(), e);
            }
        }
    }
}

/// Access-controlled IPC server bound to its channel
pub struct IpcServer {
    options: ServerOptions,
    policy: AccessPolicy,
    router: Arc<MessageRouter>,
    listener: UnixListener,
    active_sessions: Arc<AtomicUsize>,
}

impl IpcServer {
    /// Acquire the channel. Fails if another live server owns it; a stale socket
    /// file left by a crashed process is replaced.
    pub fn bind(
        options: ServerOptions,
        policy: AccessPolicy,
        router: MessageRouter,
    ) -> Result<Self, IpcError> {
        let path = options.socket_path.clone();
        prepare_socket_path(&path)?;

        let listener = UnixListener::bind(&path)?;
        if let Err(e) = policy.apply_to_socket(&path) {
            // An unprotected channel is worse than no channel
            let _ = std::fs::remove_file(&path);
            return Err(e.into());
        }

        info!(
            "IPC server bound to {} ({} allowed principals)",
            path.display(),
            policy.principals().len()
        );

        Ok(Self {
            options,
            policy,
            router: Arc::new(router),
            listener,
            active_sessions: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Path of the bound channel
    pub fn socket_path(&self) -> &Path {
        &self.options.socket_path
    }

    /// Shared counter of live sessions
    pub fn session_counter(&self) -> Arc<AtomicUsize> {
        self.active_sessions.clone()
    }

    /// Accept and serve clients until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), IpcError> {
        let _cleanup = SocketCleanup(self.options.socket_path.clone());
        let mut sessions = JoinSet::new();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            // Reap sessions that already finished
            while sessions.try_join_next().is_some() {}

            match accepted {
                Ok((stream, _addr)) => {
                    let Some(peer) = self.authorize(&stream) else {
                        continue;
                    };

                    let session = Session {
                        transport: FramedTransport::new(stream, self.options.max_frame_bytes),
                        router: self.router.clone(),
                        peer,
                        idle_timeout: self.options.session_idle_timeout,
                        active: self.active_sessions.clone(),
                    };
                    sessions.spawn(session.run(shutdown.child_token()));
                }
                Err(e) => {
                    warn!(
                        "Accept failed: {}; retrying in {:?}",
                        e, self.options.accept_retry_delay
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.options.accept_retry_delay) => {}
                    }
                }
            }
        }

        info!("IPC server stopping, {} sessions live", sessions.len());
        self.drain(sessions).await;
        Ok(())
    }

    /// Check the peer against the allow-list before any bytes are read
    fn authorize(&self, stream: &UnixStream) -> Option<PeerIdentity> {
        let cred = match stream.peer_cred() {
            Ok(cred) => cred,
            Err(e) => {
                warn!("Rejecting connection with unreadable credentials: {}", e);
                return None;
            }
        };

        let peer = PeerIdentity::resolve(cred.uid(), cred.gid());
        if self.policy.permits(&peer) {
            debug!("Accepted connection from uid {} (pid {:?})", peer.uid, cred.pid());
            Some(peer)
        } else {
            warn!("{}", IpcError::AccessDenied { uid: peer.uid });
            None
        }
    }

    async fn drain(&self, mut sessions: JoinSet<()>) {
        let grace = self.options.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "{} sessions still running after {:?}, abandoning them",
                sessions.len(),
                grace
            );
            sessions.abort_all();
        }
    }
}

/// Refuse to steal a live channel; clear a stale one
fn prepare_socket_path(path: &Path) -> Result<(), IpcError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    if path.exists() {
        if StdUnixStream::connect(path).is_ok() {
            return Err(IpcError::AddressInUse(path.display().to_string()));
        }
        debug!("Removing stale socket {}", path.display());
        std::fs::remove_file(path)?;
    }

    Ok(())
}

/// One connected client
struct Session {
    transport: FramedTransport<UnixStream>,
    router: Arc<MessageRouter>,
    peer: PeerIdentity,
    idle_timeout: Duration,
    active: Arc<AtomicUsize>,
}

impl Session {
    async fn run(mut self, shutdown: CancellationToken) {
        let _active = ActiveGuard::enter(self.active.clone());

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = tokio::time::timeout(self.idle_timeout, self.transport.receive()) => next,
            };

            let request = match next {
                Ok(Ok(request)) => request,
                Ok(Err(IpcError::Decode(e))) => {
                    warn!("Undecodable envelope from uid {}: {}", self.peer.uid, e);
                    let reply = MessageEnvelope::error(format!("undecodable envelope: {}", e));
                    if self.transport.send(&reply).await.is_err() {
                        break;
                    }
                    continue;
                }
                Ok(Err(IpcError::ConnectionClosed)) => {
                    debug!("Client uid {} disconnected", self.peer.uid);
                    break;
                }
                Ok(Err(e)) => {
                    warn!("Dropping session for uid {}: {}", self.peer.uid, e);
                    break;
                }
                Err(_) => {
                    debug!(
                        "Session for uid {} idle for {:?}, closing",
                        self.peer.uid, self.idle_timeout
                    );
                    break;
                }
            };

            debug!(
                "Received {} ({}) from uid {}",
                request.kind(),
                request.correlation_id(),
                self.peer.uid
            );

            // The session does not read again until this request is fully handled
            if let Some(reply) = self.router.dispatch(&request).await {
                if let Err(e) = self.transport.send(&reply).await {
                    error!("Failed to send {} reply: {}", reply.kind(), e);
                    break;
                }
            }
        }

        let _ = self.transport.close().await;
    }
}

/// Keeps the live-session count right even when a session is aborted
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
