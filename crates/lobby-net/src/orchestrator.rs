//! ConnectionOrchestrator: the public entry point tying discovery, session
//! management, and the reliable transport together.
//!
//! # State machine
//!
//! ```text
//! Disconnected ──host_session──► Connecting ──ServerStarted──► Hosting
//!              ──join_session──► Connecting ──PeerConnected──► Connected
//!        any state ──leave_session / failure──► Disconnected
//! ```
//!
//! Rejection codes are terminal outcomes of a `Connecting` attempt, not
//! resting states. Status-change notifications fire only on actual
//! transitions; setting the current status again is silent.
//!
//! # Threading
//!
//! All methods, including [`handle_transport_event`](ConnectionOrchestrator::handle_transport_event),
//! must be called from the owner thread. Transport callbacks arriving on
//! other threads are expected to be queued (the transport's event channel or
//! the [`MainThreadDispatcher`](crate::dispatch::MainThreadDispatcher)) and
//! pumped here once per tick.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use lobby_core::protocol::payload::ConnectionPayload;
use lobby_core::session::approval::ApprovalValidator;
use lobby_core::session::manager::{SessionManager, SessionManagerConfig};
use lobby_core::session::status::ConnectionStatus;
use lobby_core::session::types::{DiscoveredSession, PlayerData, SessionSettings};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::discovery::engine::{BroadcastHandler, DiscoveryEngine, DiscoveryError};
use crate::transport::{
    ApprovalDecision, PeerId, SessionTransport, TransportError, TransportEvent,
};

/// Error type for orchestrator entry points.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A host/join was attempted while the transport is already listening.
    #[error("already listening; leave the current session first")]
    AlreadyListening,
    /// The transport did not start within the configured connection timeout.
    #[error("connection attempt timed out")]
    Timeout,
    /// The transport reported a start failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The discovery engine could not switch roles.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Identity of the local player, baked into outgoing connection payloads.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub client_guid: Uuid,
    pub player_name: String,
    /// Scene/context name submitted with join requests.
    pub scene: String,
}

impl LocalIdentity {
    /// Identity with a fresh GUID and the given display name.
    pub fn new(player_name: impl Into<String>, scene: impl Into<String>) -> Self {
        Self {
            client_guid: Uuid::new_v4(),
            player_name: player_name.into(),
            scene: scene.into(),
        }
    }
}

/// Reusable parameter set for RPCs targeted at one specific peer.
#[derive(Debug, Clone)]
pub struct TargetedRpcParams {
    pub target_peer_ids: Vec<PeerId>,
}

/// Everything the host tracks about one connected peer.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub player: PlayerData,
    /// The validated payload the peer connected with.
    pub payload: ConnectionPayload,
    /// The original bytes, kept for diagnostics and pass-through.
    pub raw_payload: Vec<u8>,
    pub rpc_params: TargetedRpcParams,
}

/// Notifications surfaced to the embedding host.
#[derive(Debug)]
pub enum OrchestratorEvent {
    /// The local connection status transitioned.
    StatusChanged(ConnectionStatus),
    /// A remote peer joined the hosted session.
    ClientJoined {
        peer_id: PeerId,
        player_name: String,
    },
    /// A remote peer left the hosted session.
    ClientLeft { peer_id: PeerId },
}

/// Answers discovery broadcasts with the live session state.
pub struct SessionResponder {
    manager: Arc<Mutex<SessionManager>>,
    game_port: u16,
}

impl SessionResponder {
    /// Responder advertising the session owned by `manager` on `game_port`.
    pub fn new(manager: Arc<Mutex<SessionManager>>, game_port: u16) -> Self {
        Self { manager, game_port }
    }
}

impl BroadcastHandler for SessionResponder {
    fn process_broadcast(
        &self,
        _sender: SocketAddr,
        _broadcast: lobby_core::BroadcastMessage,
    ) -> Option<lobby_core::ResponseMessage> {
        // No reply when the session disappeared between frames.
        self.manager
            .lock()
            .expect("session manager lock poisoned")
            .build_response(self.game_port)
    }
}

/// Coordinates the discovery engine, session manager, and transport.
///
/// Construction wires every collaborator, so an orchestrator is always fully
/// initialized; the only misuse guard host/join need is "already listening".
pub struct ConnectionOrchestrator {
    config: AppConfig,
    identity: LocalIdentity,
    transport: Arc<dyn SessionTransport>,
    manager: Arc<Mutex<SessionManager>>,
    validator: ApprovalValidator,
    engine: Arc<Mutex<DiscoveryEngine>>,
    status: ConnectionStatus,
    peers: HashMap<PeerId, PeerRecord>,
    /// Payloads approved but not yet confirmed connected, keyed by peer.
    pending: HashMap<PeerId, (ConnectionPayload, Vec<u8>)>,
    /// The payload the local peer connects with (host or client role).
    local_payload: Option<ConnectionPayload>,
    /// Extension data copied into outgoing connection payloads.
    custom_connect_data: Option<String>,
    events_tx: mpsc::UnboundedSender<OrchestratorEvent>,
}

impl ConnectionOrchestrator {
    /// Creates the orchestrator and returns it with its notification stream.
    pub fn new(
        config: AppConfig,
        identity: LocalIdentity,
        transport: Arc<dyn SessionTransport>,
        engine: Arc<Mutex<DiscoveryEngine>>,
    ) -> (Self, mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let manager = SessionManager::new(SessionManagerConfig {
            default_max_players: config.session.default_max_players,
            default_name_prefix: config.session.default_name_prefix.clone(),
        });
        let validator = ApprovalValidator::new(config.session.max_connect_payload_bytes);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let orchestrator = Self {
            config,
            identity,
            transport,
            manager: Arc::new(Mutex::new(manager)),
            validator,
            engine,
            status: ConnectionStatus::Disconnected,
            peers: HashMap::new(),
            pending: HashMap::new(),
            local_payload: None,
            custom_connect_data: None,
            events_tx,
        };
        (orchestrator, events_rx)
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// The session manager, shared with the discovery responder.
    pub fn session_manager(&self) -> &Arc<Mutex<SessionManager>> {
        &self.manager
    }

    /// Sets the opaque extension data attached to outgoing join requests.
    pub fn set_custom_connect_data(&mut self, data: Option<String>) {
        self.custom_connect_data = data;
    }

    /// The validated connection payload a connected peer joined with.
    pub fn connection_payload(&self, peer_id: PeerId) -> Option<&ConnectionPayload> {
        self.peers.get(&peer_id).map(|record| &record.payload)
    }

    /// Display data for every tracked peer.
    pub fn connected_players(&self) -> Vec<PlayerData> {
        self.peers.values().map(|r| r.player.clone()).collect()
    }

    /// Creates a session and starts the transport in host role.
    ///
    /// On success the status is `Connecting`; the transition to `Hosting`
    /// happens when the transport reports
    /// [`TransportEvent::ServerStarted`].
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::AlreadyListening`] when a session is active,
    /// [`OrchestratorError::Timeout`] / [`OrchestratorError::Transport`] when
    /// the transport fails to start; in both cases the transport is shut
    /// down rather than left half-started.
    pub async fn host_session(
        &mut self,
        settings: SessionSettings,
    ) -> Result<(), OrchestratorError> {
        if self.transport.is_listening() {
            warn!("host_session called while already listening; ignoring");
            return Err(OrchestratorError::AlreadyListening);
        }

        let protocol_version = self.config.session.protocol_version;
        self.manager
            .lock()
            .expect("session manager lock poisoned")
            .create_session(settings, protocol_version);

        let payload = self.build_payload(None);
        self.transport.set_connect_payload(payload.to_bytes());
        self.local_payload = Some(payload);
        self.set_status(ConnectionStatus::Connecting);

        let timeout = self.config.session.connection_timeout();
        match tokio::time::timeout(timeout, self.transport.start_host()).await {
            Ok(Ok(())) => {
                info!("transport starting in host role");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("host start failed: {e}");
                self.abort_host_attempt().await;
                Err(e.into())
            }
            Err(_) => {
                error!("host start timed out after {timeout:?}");
                self.abort_host_attempt().await;
                Err(OrchestratorError::Timeout)
            }
        }
    }

    /// Starts the transport as a client targeting `address:port`.
    ///
    /// # Errors
    ///
    /// Same guards and failure handling as [`host_session`](Self::host_session).
    pub async fn join_session(
        &mut self,
        address: IpAddr,
        port: u16,
        password: Option<String>,
    ) -> Result<(), OrchestratorError> {
        if self.transport.is_listening() {
            warn!("join_session called while already listening; ignoring");
            return Err(OrchestratorError::AlreadyListening);
        }

        self.transport.set_target(address, port);
        let payload = self.build_payload(password);
        self.transport.set_connect_payload(payload.to_bytes());
        self.local_payload = Some(payload);
        self.set_status(ConnectionStatus::Connecting);

        let timeout = self.config.session.connection_timeout();
        match tokio::time::timeout(timeout, self.transport.start_client()).await {
            Ok(Ok(())) => {
                info!("transport connecting to {address}:{port}");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("join failed: {e}");
                self.abort_join_attempt().await;
                Err(e.into())
            }
            Err(_) => {
                error!("join timed out after {timeout:?}");
                self.abort_join_attempt().await;
                Err(OrchestratorError::Timeout)
            }
        }
    }

    /// Joins a session found by the directory.
    pub async fn join_discovered(
        &mut self,
        session: &DiscoveredSession,
        password: Option<String>,
    ) -> Result<(), OrchestratorError> {
        self.join_session(session.endpoint.ip(), session.endpoint.port(), password)
            .await
    }

    /// Leaves the current session, whatever the role. No-op when not
    /// listening.
    pub async fn leave_session(&mut self) {
        if !self.transport.is_listening() {
            debug!("leave_session called while not listening; nothing to do");
            return;
        }

        if self.status == ConnectionStatus::Hosting {
            self.engine.lock().expect("engine lock poisoned").stop();
            self.manager
                .lock()
                .expect("session manager lock poisoned")
                .destroy_session();
        }

        self.transport.shutdown().await;
        self.peers.clear();
        self.pending.clear();
        self.local_payload = None;
        self.set_status(ConnectionStatus::Disconnected);
        info!("left session");
    }

    /// Processes one transport event. Must run on the owner thread.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ServerStarted => self.on_server_started(),
            TransportEvent::ApprovalRequest {
                peer_id,
                payload,
                reply,
            } => self.on_approval_request(peer_id, payload, reply),
            TransportEvent::PeerConnected { peer_id } => self.on_peer_connected(peer_id),
            TransportEvent::PeerDisconnected { peer_id } => self.on_peer_disconnected(peer_id),
        }
    }

    fn on_server_started(&mut self) {
        if self.status != ConnectionStatus::Connecting {
            debug!("ignoring ServerStarted in {:?} state", self.status);
            return;
        }
        self.set_status(ConnectionStatus::Hosting);

        if self.config.general.lan_discovery {
            let responder = Arc::new(SessionResponder {
                manager: Arc::clone(&self.manager),
                game_port: self.config.session.game_port,
            });
            let result = self
                .engine
                .lock()
                .expect("engine lock poisoned")
                .start_advertiser(responder);
            if let Err(e) = result {
                // Hosting still works without LAN visibility.
                error!("could not start LAN advertising: {e}");
            }
        }
    }

    fn on_approval_request(
        &mut self,
        peer_id: PeerId,
        payload: Vec<u8>,
        reply: tokio::sync::oneshot::Sender<ApprovalDecision>,
    ) {
        let approval = {
            let manager = self.manager.lock().expect("session manager lock poisoned");
            self.validator.validate(&payload, &manager)
        };

        let decision = if approval.approved {
            if let Some(decoded) = approval.payload {
                debug!(peer_id, player = %decoded.player_name, "connection approved");
                self.pending.insert(peer_id, (decoded, payload));
            }
            ApprovalDecision {
                approved: true,
                reason: approval.status.reason_text().to_string(),
                spawn_eligible: true,
            }
        } else {
            let reason = approval.status.reason_text();
            info!(peer_id, status = ?approval.status, "connection rejected: {reason}");
            self.transport.set_rejection_reason(reason);
            ApprovalDecision {
                approved: false,
                reason: reason.to_string(),
                spawn_eligible: false,
            }
        };

        if reply.send(decision).is_err() {
            debug!(peer_id, "approval reply dropped; peer already gone");
        }
    }

    fn on_peer_connected(&mut self, peer_id: PeerId) {
        if self.status == ConnectionStatus::Hosting {
            let (payload, raw) = match self.pending.remove(&peer_id) {
                Some(pair) => pair,
                None if peer_id == self.transport.local_peer_id() => match &self.local_payload {
                    Some(p) => (p.clone(), p.to_bytes()),
                    None => {
                        warn!(peer_id, "local peer connected without a payload");
                        return;
                    }
                },
                None => {
                    warn!(peer_id, "peer connected without an approval payload");
                    return;
                }
            };

            self.manager
                .lock()
                .expect("session manager lock poisoned")
                .increment_player_count();

            let player_name = payload.player_name.clone();
            self.peers.insert(
                peer_id,
                PeerRecord {
                    player: PlayerData {
                        player_name: player_name.clone(),
                        peer_id,
                    },
                    payload,
                    raw_payload: raw,
                    rpc_params: TargetedRpcParams {
                        target_peer_ids: vec![peer_id],
                    },
                },
            );
            info!(peer_id, player = %player_name, "client joined");
            let _ = self.events_tx.send(OrchestratorEvent::ClientJoined {
                peer_id,
                player_name,
            });
            return;
        }

        if peer_id == self.transport.local_peer_id()
            && self.status == ConnectionStatus::Connecting
        {
            self.set_status(ConnectionStatus::Connected);
        }
    }

    fn on_peer_disconnected(&mut self, peer_id: PeerId) {
        if self.status == ConnectionStatus::Hosting {
            self.pending.remove(&peer_id);
            if self.peers.remove(&peer_id).is_some() {
                self.manager
                    .lock()
                    .expect("session manager lock poisoned")
                    .decrement_player_count();
                info!(peer_id, "client left");
                let _ = self
                    .events_tx
                    .send(OrchestratorEvent::ClientLeft { peer_id });
            }
            return;
        }

        if peer_id == self.transport.local_peer_id()
            && self.status != ConnectionStatus::Disconnected
        {
            self.peers.clear();
            self.pending.clear();
            self.local_payload = None;
            self.set_status(ConnectionStatus::Disconnected);
        }
    }

    fn build_payload(&self, password: Option<String>) -> ConnectionPayload {
        ConnectionPayload {
            client_guid: self.identity.client_guid,
            client_scene: self.identity.scene.clone(),
            player_name: self.identity.player_name.clone(),
            protocol_version: self.config.session.protocol_version,
            password,
            custom_data_json: self.custom_connect_data.clone(),
        }
    }

    async fn abort_host_attempt(&mut self) {
        self.transport.shutdown().await;
        self.manager
            .lock()
            .expect("session manager lock poisoned")
            .destroy_session();
        self.local_payload = None;
        self.set_status(ConnectionStatus::Disconnected);
    }

    async fn abort_join_attempt(&mut self) {
        self.transport.shutdown().await;
        self.local_payload = None;
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        debug!("status {:?} -> {:?}", self.status, status);
        self.status = status;
        let _ = self
            .events_tx
            .send(OrchestratorEvent::StatusChanged(status));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dispatch::MainThreadDispatcher;
    use crate::transport::MockSessionTransport;
    use tokio::sync::oneshot;

    const LOCAL_PEER: PeerId = 0;

    fn test_config(lan_discovery: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.general.lan_discovery = lan_discovery;
        config.session.connection_timeout_secs = 1;
        config
    }

    fn make_orchestrator(
        mut transport: MockSessionTransport,
        lan_discovery: bool,
    ) -> (
        ConnectionOrchestrator,
        mpsc::UnboundedReceiver<OrchestratorEvent>,
        MainThreadDispatcher,
    ) {
        transport.expect_local_peer_id().return_const(LOCAL_PEER);
        let dispatcher = MainThreadDispatcher::new();
        let engine = Arc::new(Mutex::new(DiscoveryEngine::new(
            free_udp_port(),
            dispatcher.handle(),
        )));
        let (orchestrator, events) = ConnectionOrchestrator::new(
            test_config(lan_discovery),
            LocalIdentity::new("Hosty", "Lobby"),
            Arc::new(transport),
            engine,
        );
        (orchestrator, events, dispatcher)
    }

    fn free_udp_port() -> u16 {
        let probe = std::net::UdpSocket::bind("127.0.0.1:0").expect("probe bind");
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        port
    }

    fn idle_host_transport() -> MockSessionTransport {
        let mut transport = MockSessionTransport::new();
        transport.expect_is_listening().return_const(false);
        transport.expect_set_connect_payload().return_const(());
        transport.expect_start_host().returning(|| Ok(()));
        transport
    }

    fn default_settings() -> SessionSettings {
        SessionSettings {
            name: "Test Session".to_string(),
            max_players: 4,
            ..SessionSettings::default()
        }
    }

    fn approval_bytes(name: &str, password: Option<&str>) -> Vec<u8> {
        ConnectionPayload {
            client_guid: Uuid::new_v4(),
            client_scene: "Lobby".to_string(),
            player_name: name.to_string(),
            protocol_version: lobby_core::PROTOCOL_VERSION,
            password: password.map(str::to_string),
            custom_data_json: None,
        }
        .to_bytes()
    }

    /// Drives a hosting orchestrator to the `Hosting` state.
    async fn start_hosting(orchestrator: &mut ConnectionOrchestrator) {
        orchestrator
            .host_session(default_settings())
            .await
            .expect("host_session");
        orchestrator.handle_transport_event(TransportEvent::ServerStarted);
        assert_eq!(orchestrator.status(), ConnectionStatus::Hosting);
    }

    fn approve(orchestrator: &mut ConnectionOrchestrator, peer_id: PeerId, bytes: Vec<u8>) -> ApprovalDecision {
        let (reply_tx, mut reply_rx) = oneshot::channel();
        orchestrator.handle_transport_event(TransportEvent::ApprovalRequest {
            peer_id,
            payload: bytes,
            reply: reply_tx,
        });
        reply_rx.try_recv().expect("decision must be sent synchronously")
    }

    // ── Hosting ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_host_session_transitions_connecting_then_hosting() {
        let (mut orchestrator, mut events, _d) = make_orchestrator(idle_host_transport(), false);

        orchestrator
            .host_session(default_settings())
            .await
            .expect("host_session");
        assert_eq!(orchestrator.status(), ConnectionStatus::Connecting);

        orchestrator.handle_transport_event(TransportEvent::ServerStarted);
        assert_eq!(orchestrator.status(), ConnectionStatus::Hosting);

        // Exactly two status notifications, in order.
        assert!(matches!(
            events.try_recv(),
            Ok(OrchestratorEvent::StatusChanged(ConnectionStatus::Connecting))
        ));
        assert!(matches!(
            events.try_recv(),
            Ok(OrchestratorEvent::StatusChanged(ConnectionStatus::Hosting))
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_host_session_rejected_while_listening() {
        let mut transport = MockSessionTransport::new();
        transport.expect_is_listening().return_const(true);
        let (mut orchestrator, mut events, _d) = make_orchestrator(transport, false);

        let result = orchestrator.host_session(default_settings()).await;

        assert!(matches!(result, Err(OrchestratorError::AlreadyListening)));
        assert_eq!(orchestrator.status(), ConnectionStatus::Disconnected);
        assert!(events.try_recv().is_err(), "guard must not emit events");
    }

    #[tokio::test]
    async fn test_host_start_failure_shuts_down_and_destroys_session() {
        let mut transport = MockSessionTransport::new();
        transport.expect_is_listening().return_const(false);
        transport.expect_set_connect_payload().return_const(());
        transport
            .expect_start_host()
            .returning(|| Err(TransportError::StartFailed("port in use".to_string())));
        transport.expect_shutdown().times(1).return_const(());
        let (mut orchestrator, _events, _d) = make_orchestrator(transport, false);

        let result = orchestrator.host_session(default_settings()).await;

        assert!(matches!(result, Err(OrchestratorError::Transport(_))));
        assert_eq!(orchestrator.status(), ConnectionStatus::Disconnected);
        assert!(
            orchestrator
                .session_manager()
                .lock()
                .unwrap()
                .session()
                .is_none(),
            "a failed host attempt must not leave a session behind"
        );
    }

    #[tokio::test]
    async fn test_hosting_starts_lan_advertising_when_enabled() {
        let (mut orchestrator, _events, _d) = make_orchestrator(idle_host_transport(), true);

        start_hosting(&mut orchestrator).await;

        let engine = orchestrator.engine.lock().unwrap();
        assert_eq!(
            engine.role(),
            Some(crate::discovery::engine::DiscoveryRole::Advertiser)
        );
    }

    // ── Joining ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_join_session_transitions_connecting_then_connected() {
        let mut transport = MockSessionTransport::new();
        transport.expect_is_listening().return_const(false);
        transport.expect_set_target().times(1).return_const(());
        transport.expect_set_connect_payload().return_const(());
        transport.expect_start_client().returning(|| Ok(()));
        let (mut orchestrator, _events, _d) = make_orchestrator(transport, false);

        orchestrator
            .join_session("192.168.1.10".parse().unwrap(), 7777, None)
            .await
            .expect("join_session");
        assert_eq!(orchestrator.status(), ConnectionStatus::Connecting);

        orchestrator.handle_transport_event(TransportEvent::PeerConnected { peer_id: LOCAL_PEER });
        assert_eq!(orchestrator.status(), ConnectionStatus::Connected);
    }

    /// Transport whose `start_client` never completes, for timeout tests.
    struct HangingClientTransport {
        shutdowns: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SessionTransport for HangingClientTransport {
        async fn start_host(&self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn start_client(&self) -> Result<(), TransportError> {
            tokio::time::sleep(std::time::Duration::from_secs(86_400)).await;
            Ok(())
        }
        async fn shutdown(&self) {
            self.shutdowns
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        fn is_listening(&self) -> bool {
            false
        }
        fn set_target(&self, _address: IpAddr, _port: u16) {}
        fn set_connect_payload(&self, _payload: Vec<u8>) {}
        fn set_rejection_reason(&self, _reason: &str) {}
        fn local_peer_id(&self) -> PeerId {
            LOCAL_PEER
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_timeout_shuts_transport_down() {
        let transport = Arc::new(HangingClientTransport {
            shutdowns: std::sync::atomic::AtomicUsize::new(0),
        });
        let dispatcher = MainThreadDispatcher::new();
        let engine = Arc::new(Mutex::new(DiscoveryEngine::new(
            free_udp_port(),
            dispatcher.handle(),
        )));
        let transport_obj: Arc<dyn SessionTransport> = transport.clone();
        let (mut orchestrator, _events) = ConnectionOrchestrator::new(
            test_config(false),
            LocalIdentity::new("Joiner", "Lobby"),
            transport_obj,
            engine,
        );

        // The paused clock jumps straight past the 1 s connection timeout
        // while `start_client` is still pretending to work.
        let result = orchestrator
            .join_session("10.0.0.1".parse().unwrap(), 7777, None)
            .await;

        assert!(matches!(result, Err(OrchestratorError::Timeout)));
        assert_eq!(orchestrator.status(), ConnectionStatus::Disconnected);
        assert_eq!(
            transport.shutdowns.load(std::sync::atomic::Ordering::SeqCst),
            1,
            "a timed-out attempt must not leave the transport half-started"
        );
    }

    #[tokio::test]
    async fn test_client_disconnect_returns_to_disconnected() {
        let mut transport = MockSessionTransport::new();
        transport.expect_is_listening().return_const(false);
        transport.expect_set_target().return_const(());
        transport.expect_set_connect_payload().return_const(());
        transport.expect_start_client().returning(|| Ok(()));
        let (mut orchestrator, _events, _d) = make_orchestrator(transport, false);

        orchestrator
            .join_session("192.168.1.10".parse().unwrap(), 7777, None)
            .await
            .unwrap();
        orchestrator.handle_transport_event(TransportEvent::PeerConnected { peer_id: LOCAL_PEER });
        orchestrator
            .handle_transport_event(TransportEvent::PeerDisconnected { peer_id: LOCAL_PEER });

        assert_eq!(orchestrator.status(), ConnectionStatus::Disconnected);
    }

    // ── Approval hook ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_approved_peer_is_tracked_on_connect() {
        let (mut orchestrator, mut events, _d) = make_orchestrator(idle_host_transport(), false);
        start_hosting(&mut orchestrator).await;
        // Drain the status notifications from startup.
        while events.try_recv().is_ok() {}

        let decision = approve(&mut orchestrator, 7, approval_bytes("Alice", None));
        assert!(decision.approved);
        assert!(decision.spawn_eligible);

        orchestrator.handle_transport_event(TransportEvent::PeerConnected { peer_id: 7 });

        assert_eq!(
            orchestrator
                .session_manager()
                .lock()
                .unwrap()
                .session()
                .unwrap()
                .current_players,
            1
        );
        assert_eq!(
            orchestrator.connection_payload(7).unwrap().player_name,
            "Alice"
        );
        assert!(matches!(
            events.try_recv(),
            Ok(OrchestratorEvent::ClientJoined { peer_id: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_peer_gets_reason_installed_on_transport() {
        let mut transport = idle_host_transport();
        transport
            .expect_set_rejection_reason()
            .withf(|reason| reason == ConnectionStatus::ProtocolMismatch.reason_text())
            .times(1)
            .return_const(());
        let (mut orchestrator, _events, _d) = make_orchestrator(transport, false);
        start_hosting(&mut orchestrator).await;

        let bad = ConnectionPayload {
            client_guid: Uuid::new_v4(),
            client_scene: "Lobby".to_string(),
            player_name: "Late".to_string(),
            protocol_version: 999,
            password: None,
            custom_data_json: None,
        }
        .to_bytes();
        let decision = approve(&mut orchestrator, 9, bad);

        assert!(!decision.approved);
        assert!(!decision.spawn_eligible);
        assert_eq!(
            decision.reason,
            ConnectionStatus::ProtocolMismatch.reason_text()
        );
    }

    #[tokio::test]
    async fn test_peer_disconnect_decrements_count_and_notifies() {
        let (mut orchestrator, mut events, _d) = make_orchestrator(idle_host_transport(), false);
        start_hosting(&mut orchestrator).await;

        approve(&mut orchestrator, 7, approval_bytes("Alice", None));
        orchestrator.handle_transport_event(TransportEvent::PeerConnected { peer_id: 7 });
        while events.try_recv().is_ok() {}

        orchestrator.handle_transport_event(TransportEvent::PeerDisconnected { peer_id: 7 });

        assert_eq!(
            orchestrator
                .session_manager()
                .lock()
                .unwrap()
                .session()
                .unwrap()
                .current_players,
            0
        );
        assert!(orchestrator.connection_payload(7).is_none());
        assert!(matches!(
            events.try_recv(),
            Ok(OrchestratorEvent::ClientLeft { peer_id: 7 })
        ));
    }

    #[tokio::test]
    async fn test_unknown_peer_disconnect_is_harmless() {
        let (mut orchestrator, mut events, _d) = make_orchestrator(idle_host_transport(), false);
        start_hosting(&mut orchestrator).await;
        while events.try_recv().is_ok() {}

        orchestrator.handle_transport_event(TransportEvent::PeerDisconnected { peer_id: 42 });

        assert!(events.try_recv().is_err(), "no notification for unknown peers");
    }

    // ── Leaving ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_leave_session_when_not_listening_is_a_noop() {
        let mut transport = MockSessionTransport::new();
        transport.expect_is_listening().return_const(false);
        // No shutdown expectation: it must not be called.
        let (mut orchestrator, mut events, _d) = make_orchestrator(transport, false);

        orchestrator.leave_session().await;
        orchestrator.leave_session().await;

        assert_eq!(orchestrator.status(), ConnectionStatus::Disconnected);
        assert!(events.try_recv().is_err(), "no duplicate notifications");
    }

    #[tokio::test]
    async fn test_leave_while_hosting_destroys_session_and_stops_advertising() {
        // Stateful mock: `is_listening` tracks start_host/shutdown like a
        // real transport would.
        let listening = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut transport = MockSessionTransport::new();
        {
            let listening = Arc::clone(&listening);
            transport
                .expect_is_listening()
                .returning(move || listening.load(std::sync::atomic::Ordering::SeqCst));
        }
        {
            let listening = Arc::clone(&listening);
            transport.expect_start_host().returning(move || {
                listening.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            });
        }
        {
            let listening = Arc::clone(&listening);
            transport.expect_shutdown().times(1).returning(move || {
                listening.store(false, std::sync::atomic::Ordering::SeqCst);
            });
        }
        transport.expect_set_connect_payload().return_const(());
        let (mut orchestrator, _events, _d) = make_orchestrator(transport, true);
        start_hosting(&mut orchestrator).await;

        orchestrator.leave_session().await;

        assert_eq!(orchestrator.status(), ConnectionStatus::Disconnected);
        assert!(orchestrator
            .session_manager()
            .lock()
            .unwrap()
            .session()
            .is_none());
        assert_eq!(orchestrator.engine.lock().unwrap().role(), None);
    }

    #[tokio::test]
    async fn test_status_only_fires_on_actual_transitions() {
        let (mut orchestrator, mut events, _d) = make_orchestrator(idle_host_transport(), false);

        orchestrator.set_status(ConnectionStatus::Connecting);
        orchestrator.set_status(ConnectionStatus::Connecting);
        orchestrator.set_status(ConnectionStatus::Hosting);

        assert!(matches!(
            events.try_recv(),
            Ok(OrchestratorEvent::StatusChanged(ConnectionStatus::Connecting))
        ));
        assert!(matches!(
            events.try_recv(),
            Ok(OrchestratorEvent::StatusChanged(ConnectionStatus::Hosting))
        ));
        assert!(events.try_recv().is_err(), "same-state change must be silent");
    }
}
