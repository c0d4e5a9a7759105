//! Role-based UDP discovery engine.
//!
//! The engine owns one UDP socket at a time, in one of two roles:
//!
//! - **Advertiser** (hosting side): binds the fixed discovery port, answers
//!   valid broadcast frames with a session response.
//! - **Seeker** (joining side): binds an ephemeral port, sends broadcast
//!   frames to the subnet, and collects responses.
//!
//! The receive loop runs on a dedicated OS thread using a blocking socket
//! with a 500 ms read timeout; each wakeup re-checks a shared stop flag so
//! `stop()` takes effect within one timeout period. Datagrams that fail the
//! magic-tag or message-type gate are expected noise from other applications
//! and are dropped silently.
//!
//! Decoded frames are never handled on the receive thread. They are enqueued
//! on the [`MainThreadDispatcher`](crate::dispatch::MainThreadDispatcher), so
//! role handlers, and any session/directory state they mutate, run on the
//! owner thread only. An advertiser's reply is likewise encoded and sent from
//! that owner-thread job, through a shared handle to the same socket.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use lobby_core::protocol::{
    codec::{decode_frame, encode_frame},
    messages::{BroadcastMessage, DiscoveryMessage, ResponseMessage},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::dispatch::DispatchHandle;

/// Read timeout for the blocking receive loop; bounds shutdown latency.
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Error type for discovery engine operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The socket could not be configured (broadcast flag, read timeout).
    #[error("failed to configure discovery socket: {0}")]
    SocketConfig(#[source] std::io::Error),
}

/// Which side of the discovery exchange this engine currently plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryRole {
    Advertiser,
    Seeker,
}

/// Advertiser-side extension point, invoked on the owner thread once per
/// valid broadcast frame. Returning `Some` sends that response back to the
/// broadcast's source address.
pub trait BroadcastHandler: Send + Sync + 'static {
    fn process_broadcast(
        &self,
        sender: SocketAddr,
        broadcast: BroadcastMessage,
    ) -> Option<ResponseMessage>;
}

/// Seeker-side extension point, invoked on the owner thread once per valid
/// response frame.
pub trait ResponseHandler: Send + Sync + 'static {
    fn response_received(&self, sender: SocketAddr, response: ResponseMessage);
}

enum RoleHandler {
    Advertiser(Arc<dyn BroadcastHandler>),
    Seeker(Arc<dyn ResponseHandler>),
}

struct ActiveRole {
    role: DiscoveryRole,
    socket: Arc<UdpSocket>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Owns the discovery socket and its receive thread.
pub struct DiscoveryEngine {
    discovery_port: u16,
    dispatch: DispatchHandle,
    active: Option<ActiveRole>,
}

impl DiscoveryEngine {
    /// Creates an engine with no active role.
    ///
    /// `dispatch` is the handle jobs are enqueued on; the owner thread must
    /// drain the corresponding dispatcher for handlers to run.
    pub fn new(discovery_port: u16, dispatch: DispatchHandle) -> Self {
        Self {
            discovery_port,
            dispatch,
            active: None,
        }
    }

    /// The currently active role, if any.
    pub fn role(&self) -> Option<DiscoveryRole> {
        self.active.as_ref().map(|a| a.role)
    }

    /// Local address of the active socket, if any.
    ///
    /// A seeker binds an ephemeral port, so this is the only way to learn
    /// where its responses should be addressed.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active.as_ref().and_then(|a| a.socket.local_addr().ok())
    }

    /// Switches into advertiser role, answering broadcasts via `handler`.
    ///
    /// Any previously active role is fully torn down first, so restarting is
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] when the fixed discovery port cannot be
    /// bound or the socket cannot be configured.
    pub fn start_advertiser(
        &mut self,
        handler: Arc<dyn BroadcastHandler>,
    ) -> Result<(), DiscoveryError> {
        self.stop();
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.discovery_port));
        let socket = bind_socket(addr)?;
        self.spawn_role(DiscoveryRole::Advertiser, socket, RoleHandler::Advertiser(handler));
        info!("discovery advertiser listening on UDP {addr}");
        Ok(())
    }

    /// Switches into seeker role, delivering responses to `handler`.
    ///
    /// Binds an ephemeral port and enables `SO_BROADCAST` for
    /// [`send_broadcast`](Self::send_broadcast). Idempotent restart as with
    /// the advertiser role.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] on bind/configuration failure.
    pub fn start_seeker(&mut self, handler: Arc<dyn ResponseHandler>) -> Result<(), DiscoveryError> {
        self.stop();
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        let socket = bind_socket(addr)?;
        socket.set_broadcast(true).map_err(DiscoveryError::SocketConfig)?;
        self.spawn_role(DiscoveryRole::Seeker, socket, RoleHandler::Seeker(handler));
        debug!("discovery seeker started");
        Ok(())
    }

    /// Sends one broadcast frame to the subnet broadcast address.
    ///
    /// Only valid in seeker role; logs a warning and does nothing otherwise.
    pub fn send_broadcast(&self, broadcast: &BroadcastMessage) {
        let Some(active) = self.active.as_ref() else {
            warn!("send_broadcast called with no active discovery role");
            return;
        };
        if active.role != DiscoveryRole::Seeker {
            warn!("send_broadcast called in advertiser role; ignoring");
            return;
        }

        let bytes = encode_frame(&DiscoveryMessage::Broadcast(broadcast.clone()));
        let dest = SocketAddr::from((Ipv4Addr::BROADCAST, self.discovery_port));
        if let Err(e) = active.socket.send_to(&bytes, dest) {
            if active.running.load(Ordering::Relaxed) {
                warn!("failed to send discovery broadcast: {e}");
            }
            // A send racing a teardown is expected; swallow it.
        }
    }

    /// Tears down the active role: signals the receive thread, joins it, and
    /// drops the socket. Idempotent.
    pub fn stop(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.running.store(false, Ordering::Relaxed);
        if let Some(thread) = active.thread.take() {
            if thread.join().is_err() {
                error!("discovery receive thread panicked");
            }
        }
        debug!("discovery engine stopped");
    }

    fn spawn_role(&mut self, role: DiscoveryRole, socket: Arc<UdpSocket>, handler: RoleHandler) {
        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let socket = Arc::clone(&socket);
            let running = Arc::clone(&running);
            let dispatch = self.dispatch.clone();
            std::thread::Builder::new()
                .name("lobby-discovery".to_string())
                .spawn(move || receive_loop(socket, role, handler, dispatch, running))
                .expect("failed to spawn discovery thread")
        };
        self.active = Some(ActiveRole {
            role,
            socket,
            running,
            thread: Some(thread),
        });
    }
}

impl Drop for DiscoveryEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_socket(addr: SocketAddr) -> Result<Arc<UdpSocket>, DiscoveryError> {
    let socket = UdpSocket::bind(addr).map_err(|source| DiscoveryError::BindFailed { addr, source })?;
    socket
        .set_read_timeout(Some(RECV_TIMEOUT))
        .map_err(DiscoveryError::SocketConfig)?;
    Ok(Arc::new(socket))
}

/// The main receive loop executed on the discovery thread.
fn receive_loop(
    socket: Arc<UdpSocket>,
    role: DiscoveryRole,
    handler: RoleHandler,
    dispatch: DispatchHandle,
    running: Arc<AtomicBool>,
) {
    let mut buf = vec![0u8; 2048];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                if !running.load(Ordering::Relaxed) {
                    break; // socket torn down mid-recv
                }
                error!("discovery recv error: {e}");
                continue;
            }
        };

        // Frames failing the magic/type gate are noise, not failures.
        let message = match decode_frame(&buf[..len]) {
            Ok(m) => m,
            Err(e) => {
                debug!("dropping discovery datagram from {src}: {e}");
                continue;
            }
        };

        match (&handler, message) {
            (RoleHandler::Advertiser(handler), DiscoveryMessage::Broadcast(broadcast)) => {
                let handler = Arc::clone(handler);
                let reply_socket = Arc::clone(&socket);
                let running = Arc::clone(&running);
                dispatch.enqueue(move || {
                    if let Some(response) = handler.process_broadcast(src, broadcast) {
                        let bytes = encode_frame(&DiscoveryMessage::Response(response));
                        if let Err(e) = reply_socket.send_to(&bytes, src) {
                            if running.load(Ordering::Relaxed) {
                                warn!("failed to send discovery response to {src}: {e}");
                            }
                        }
                    }
                });
            }
            (RoleHandler::Seeker(handler), DiscoveryMessage::Response(response)) => {
                let handler = Arc::clone(handler);
                dispatch.enqueue(move || handler.response_received(src, response));
            }
            // A frame of the wrong type for the current role: stale traffic
            // from a previous role or another process's exchange.
            (_, other) => {
                debug!(
                    "dropping {:?} frame from {src}: wrong type for {role:?} role",
                    other.message_type()
                );
            }
        }
    }

    debug!("discovery receive loop exited");
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
