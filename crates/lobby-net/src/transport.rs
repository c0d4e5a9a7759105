//! The reliable game transport, as consumed by the orchestrator.
//!
//! The transport itself (connection handshakes, reliability, in-game
//! messaging) is external to this crate. The orchestrator only needs the
//! narrow control surface below: start in one of two roles, shut down, carry
//! an opaque connect-time payload, and deliver lifecycle events, including
//! the approval hook, which the core answers through a oneshot reply.

use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

/// Transport-level identifier for a connected peer.
pub type PeerId = u64;

/// Error type for transport start operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not start in the requested role.
    #[error("transport failed to start: {0}")]
    StartFailed(String),
}

/// Answer to one approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDecision {
    /// Whether the peer may complete its connection.
    pub approved: bool,
    /// Human-readable reason, delivered to the rejected peer.
    pub reason: String,
    /// Whether the peer should get a player object spawned on accept.
    pub spawn_eligible: bool,
}

/// Events delivered by the transport to the orchestrator.
///
/// These must be pumped on the owner thread (see
/// [`ConnectionOrchestrator::handle_transport_event`](crate::orchestrator::ConnectionOrchestrator::handle_transport_event)).
#[derive(Debug)]
pub enum TransportEvent {
    /// The host role finished starting and is accepting connections.
    ServerStarted,
    /// A peer wants to connect; answer through `reply`.
    ApprovalRequest {
        peer_id: PeerId,
        /// The opaque connect-time blob the peer submitted.
        payload: Vec<u8>,
        reply: oneshot::Sender<ApprovalDecision>,
    },
    /// A peer (possibly the local one) completed its connection.
    PeerConnected { peer_id: PeerId },
    /// A peer (possibly the local one) disconnected.
    PeerDisconnected { peer_id: PeerId },
}

/// Control surface of the external reliable transport.
///
/// Implementations wrap whatever game-networking library the embedding host
/// uses; tests use a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Starts listening as the session host.
    async fn start_host(&self) -> Result<(), TransportError>;

    /// Starts connecting to the configured target as a client.
    async fn start_client(&self) -> Result<(), TransportError>;

    /// Stops the transport and drops all connections. Idempotent.
    async fn shutdown(&self);

    /// Whether the transport is currently listening or connected.
    fn is_listening(&self) -> bool;

    /// Sets the remote endpoint used by the next [`start_client`](Self::start_client).
    fn set_target(&self, address: IpAddr, port: u16);

    /// Sets the opaque payload submitted with the next connection attempt.
    fn set_connect_payload(&self, payload: Vec<u8>);

    /// Sets the reason string delivered alongside the next denial.
    fn set_rejection_reason(&self, reason: &str);

    /// The transport's identifier for the local peer.
    fn local_peer_id(&self) -> PeerId;
}
