//! Seeker-side session directory.
//!
//! The directory caches every session discovered on the LAN, keyed by the
//! transport endpoint (source address + advertised game port) so repeated
//! responses from the same host update one entry instead of accumulating.
//!
//! A scan is the unit of discovery work: `start_scan` clears the cache,
//! switches the engine into seeker role, then broadcasts and prunes on a
//! fixed interval until the deadline or `stop_scan`. Each scan hands back its
//! own [`DiscoveryEvents`] sequence: lazy, finite, and non-restartable; a
//! new scan (which first clears the directory) is the only way to start over.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant, SystemTime};

use lobby_core::protocol::messages::{BroadcastMessage, ResponseMessage};
use lobby_core::session::types::DiscoveredSession;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::discovery::engine::{DiscoveryEngine, DiscoveryError, ResponseHandler};

/// One item in the per-scan discovery sequence.
#[derive(Debug, Clone)]
pub struct DiscoveryEvent {
    pub kind: DiscoveryEventKind,
    /// Wall-clock time the event was produced.
    pub timestamp: SystemTime,
}

/// What happened during the scan.
#[derive(Debug, Clone)]
pub enum DiscoveryEventKind {
    /// The scan began; emitted before the first broadcast.
    ScanStarted,
    /// A previously unknown session responded.
    Discovered(DiscoveredSession),
    /// A known session responded again; mutable fields were refreshed.
    Updated(DiscoveredSession),
    /// A known session went unrefreshed past the stale timeout and was
    /// removed; emitted before the removal takes effect.
    Lost(DiscoveredSession),
    /// The scan deadline elapsed without cancellation. Not emitted on
    /// `stop_scan`.
    ScanComplete,
}

/// The lazy, finite event sequence produced by one scan invocation.
///
/// The sequence ends (yields `None`) when the scan completes or is stopped.
/// It cannot be restarted; call `start_scan` again for a fresh one.
pub struct DiscoveryEvents {
    rx: mpsc::UnboundedReceiver<DiscoveryEvent>,
}

impl DiscoveryEvents {
    /// Waits for the next event, or `None` once the scan is over.
    pub async fn next(&mut self) -> Option<DiscoveryEvent> {
        self.rx.recv().await
    }
}

/// Shared state mutated only from owner-thread dispatch jobs and the scan
/// task's prune calls.
struct DirectoryState {
    sessions: Mutex<HashMap<SocketAddr, DiscoveredSession>>,
    events: Mutex<Option<mpsc::UnboundedSender<DiscoveryEvent>>>,
    stale_timeout: Duration,
}

impl DirectoryState {
    fn emit(&self, kind: DiscoveryEventKind) {
        let guard = self.events.lock().expect("directory events lock poisoned");
        if let Some(tx) = guard.as_ref() {
            // A send failure means the consumer dropped the sequence; events
            // are then simply unobserved, which is fine.
            let _ = tx.send(DiscoveryEvent {
                kind,
                timestamp: SystemTime::now(),
            });
        }
    }

    /// Removes entries older than the stale timeout, emitting `Lost` for each
    /// before it disappears.
    fn prune_stale(&self, now: Instant) {
        let mut sessions = self.sessions.lock().expect("directory lock poisoned");
        let stale: Vec<SocketAddr> = sessions
            .iter()
            .filter(|(_, s)| now.duration_since(s.last_seen) > self.stale_timeout)
            .map(|(endpoint, _)| *endpoint)
            .collect();
        for endpoint in stale {
            if let Some(session) = sessions.remove(&endpoint) {
                debug!(%endpoint, name = %session.name, "session went stale");
                self.emit(DiscoveryEventKind::Lost(session));
            }
        }
    }
}

impl ResponseHandler for DirectoryState {
    fn response_received(&self, sender: SocketAddr, response: ResponseMessage) {
        // Key by the endpoint a joiner would actually connect to: the
        // sender's address plus the game port the response advertises.
        let endpoint = SocketAddr::new(sender.ip(), response.port);
        let mut sessions = self.sessions.lock().expect("directory lock poisoned");

        match sessions.get_mut(&endpoint) {
            Some(existing) => {
                existing.name = response.server_name;
                existing.current_players = response.current_players;
                existing.max_players = response.max_players;
                existing.has_password = response.has_password;
                existing.map_index = response.map_index;
                existing.custom_data_json = response.custom_data_json;
                existing.last_seen = Instant::now();
                let updated = existing.clone();
                drop(sessions);
                self.emit(DiscoveryEventKind::Updated(updated));
            }
            None => {
                let session = DiscoveredSession {
                    endpoint,
                    name: response.server_name,
                    current_players: response.current_players,
                    max_players: response.max_players,
                    has_password: response.has_password,
                    protocol_version: response.protocol_version,
                    map_index: response.map_index,
                    last_seen: Instant::now(),
                    custom_data_json: response.custom_data_json,
                };
                info!(%endpoint, name = %session.name, "discovered session");
                sessions.insert(endpoint, session.clone());
                drop(sessions);
                self.emit(DiscoveryEventKind::Discovered(session));
            }
        }
    }
}

struct ActiveScan {
    cancel: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

/// Seeker-side cache of discovered sessions plus the scan driver.
pub struct SessionDirectory {
    config: DiscoveryConfig,
    protocol_version: i32,
    engine: Arc<Mutex<DiscoveryEngine>>,
    state: Arc<DirectoryState>,
    scan: Option<ActiveScan>,
}

impl SessionDirectory {
    /// Creates a directory driving `engine` for its scans.
    pub fn new(
        config: DiscoveryConfig,
        protocol_version: i32,
        engine: Arc<Mutex<DiscoveryEngine>>,
    ) -> Self {
        let state = Arc::new(DirectoryState {
            sessions: Mutex::new(HashMap::new()),
            events: Mutex::new(None),
            stale_timeout: config.stale_timeout(),
        });
        Self {
            config,
            protocol_version,
            engine,
            state,
            scan: None,
        }
    }

    /// Snapshot of all currently known sessions.
    pub fn sessions(&self) -> Vec<DiscoveredSession> {
        self.state
            .sessions
            .lock()
            .expect("directory lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Whether a scan loop is currently running.
    pub fn is_scanning(&self) -> bool {
        self.scan.as_ref().is_some_and(|s| !s.task.is_finished())
    }

    /// Starts a scan and returns its event sequence.
    ///
    /// Clears the directory, switches the engine into seeker role, emits
    /// `ScanStarted`, then broadcasts and prunes every interval until
    /// `timeout` (the configured scan timeout when `None`) elapses or
    /// [`stop_scan`](Self::stop_scan) is called.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] when the seeker socket cannot be bound.
    pub fn start_scan(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<DiscoveryEvents, DiscoveryError> {
        self.stop_scan();

        self.state
            .sessions
            .lock()
            .expect("directory lock poisoned")
            .clear();

        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.events.lock().expect("directory events lock poisoned") = Some(tx);

        {
            let mut engine = self.engine.lock().expect("engine lock poisoned");
            let handler: Arc<dyn ResponseHandler> = self.state.clone();
            engine.start_seeker(handler)?;
        }

        let timeout = timeout.unwrap_or_else(|| self.config.scan_timeout());
        let interval = self.config.broadcast_interval();
        let cancel = Arc::new(AtomicBool::new(false));

        self.state.emit(DiscoveryEventKind::ScanStarted);
        info!(?timeout, "discovery scan started");

        let task = tokio::spawn(scan_loop(
            Arc::clone(&self.state),
            Arc::clone(&self.engine),
            BroadcastMessage {
                protocol_version: self.protocol_version,
            },
            interval,
            timeout,
            Arc::clone(&cancel),
        ));
        self.scan = Some(ActiveScan { cancel, task });

        Ok(DiscoveryEvents { rx })
    }

    /// Cancels the scan loop and releases the seeker socket. Idempotent.
    ///
    /// Already-discovered sessions stay visible until the next scan clears
    /// them. `ScanComplete` is deliberately not emitted on this path.
    pub fn stop_scan(&mut self) {
        let Some(scan) = self.scan.take() else {
            return;
        };
        scan.cancel.store(true, Ordering::Relaxed);
        scan.task.abort();
        // Close the event sequence; the scan is over.
        self.state
            .events
            .lock()
            .expect("directory events lock poisoned")
            .take();
        self.engine.lock().expect("engine lock poisoned").stop();
        debug!("discovery scan stopped");
    }

    /// Scans until a session satisfying `predicate` appears.
    ///
    /// Resolves with the first match (from either a `Discovered` or an
    /// `Updated` event), or `None` when the scan ends without one. Never
    /// leaves a scan running after it resolves.
    pub async fn find_session<F>(
        &mut self,
        predicate: F,
        timeout: Option<Duration>,
    ) -> Option<DiscoveredSession>
    where
        F: Fn(&DiscoveredSession) -> bool,
    {
        let mut events = match self.start_scan(timeout) {
            Ok(events) => events,
            Err(e) => {
                warn!("find_session could not start a scan: {e}");
                return None;
            }
        };

        let found = loop {
            match events.next().await {
                Some(event) => match event.kind {
                    DiscoveryEventKind::Discovered(s) | DiscoveryEventKind::Updated(s)
                        if predicate(&s) =>
                    {
                        break Some(s);
                    }
                    DiscoveryEventKind::ScanComplete => break None,
                    _ => continue,
                },
                None => break None,
            }
        };

        self.stop_scan();
        found
    }
}

impl Drop for SessionDirectory {
    fn drop(&mut self) {
        if let Some(scan) = self.scan.take() {
            scan.cancel.store(true, Ordering::Relaxed);
            scan.task.abort();
        }
    }
}

/// Periodic broadcast + prune loop for one scan.
async fn scan_loop(
    state: Arc<DirectoryState>,
    engine: Arc<Mutex<DiscoveryEngine>>,
    broadcast: BroadcastMessage,
    interval: Duration,
    timeout: Duration,
    cancel: Arc<AtomicBool>,
) {
    let deadline = Instant::now() + timeout;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return;
        }

        engine
            .lock()
            .expect("engine lock poisoned")
            .send_broadcast(&broadcast);
        state.prune_stale(Instant::now());

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }

    if cancel.load(Ordering::Relaxed) {
        return;
    }

    // Natural completion: announce it, end the sequence, release the socket.
    state.emit(DiscoveryEventKind::ScanComplete);
    state
        .events
        .lock()
        .expect("directory events lock poisoned")
        .take();
    engine.lock().expect("engine lock poisoned").stop();
    info!("discovery scan complete");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::MainThreadDispatcher;

    fn test_config(stale_secs: u64, interval_ms: u64) -> DiscoveryConfig {
        DiscoveryConfig {
            port: 0, // tests below never bind the fixed advertiser port
            scan_timeout_secs: 1,
            broadcast_interval_ms: interval_ms,
            stale_timeout_secs: stale_secs,
        }
    }

    /// Directory whose scan loop idles for 60 s between iterations, so tests
    /// that inject responses and prunes by hand see no concurrent activity.
    fn make_directory(stale_secs: u64) -> (SessionDirectory, MainThreadDispatcher) {
        make_directory_with_interval(stale_secs, 60_000)
    }

    fn make_directory_with_interval(
        stale_secs: u64,
        interval_ms: u64,
    ) -> (SessionDirectory, MainThreadDispatcher) {
        let dispatcher = MainThreadDispatcher::new();
        let engine = Arc::new(Mutex::new(DiscoveryEngine::new(0, dispatcher.handle())));
        (
            SessionDirectory::new(test_config(stale_secs, interval_ms), 1, engine),
            dispatcher,
        )
    }

    fn response(name: &str, port: u16, players: i32) -> ResponseMessage {
        ResponseMessage {
            port,
            server_name: name.to_string(),
            current_players: players,
            max_players: 8,
            has_password: false,
            protocol_version: 1,
            map_index: 0,
            custom_data_json: None,
        }
    }

    fn sender() -> SocketAddr {
        "192.168.1.20:51000".parse().unwrap()
    }

    #[test]
    fn test_first_response_inserts_session_keyed_by_game_endpoint() {
        let (directory, _dispatcher) = make_directory(5);
        directory
            .state
            .response_received(sender(), response("Alpha", 7777, 2));

        let sessions = directory.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].endpoint, "192.168.1.20:7777".parse().unwrap());
        assert_eq!(sessions[0].name, "Alpha");
        assert_eq!(sessions[0].current_players, 2);
    }

    #[test]
    fn test_repeat_response_updates_in_place() {
        let (directory, _dispatcher) = make_directory(5);
        directory
            .state
            .response_received(sender(), response("Alpha", 7777, 2));
        directory
            .state
            .response_received(sender(), response("Alpha Renamed", 7777, 3));

        let sessions = directory.sessions();
        assert_eq!(sessions.len(), 1, "same endpoint must not duplicate");
        assert_eq!(sessions[0].name, "Alpha Renamed");
        assert_eq!(sessions[0].current_players, 3);
    }

    #[test]
    fn test_different_hosts_get_distinct_entries() {
        let (directory, _dispatcher) = make_directory(5);
        directory
            .state
            .response_received("192.168.1.20:51000".parse().unwrap(), response("A", 7777, 0));
        directory
            .state
            .response_received("192.168.1.21:51000".parse().unwrap(), response("B", 7777, 0));

        assert_eq!(directory.sessions().len(), 2);
    }

    #[test]
    fn test_prune_removes_only_stale_entries() {
        let (directory, _dispatcher) = make_directory(5);
        directory
            .state
            .response_received(sender(), response("Fresh", 7777, 0));

        // Nothing is stale yet.
        directory.state.prune_stale(Instant::now());
        assert_eq!(directory.sessions().len(), 1);

        // Pretend the stale timeout has long passed.
        directory
            .state
            .prune_stale(Instant::now() + Duration::from_secs(60));
        assert!(directory.sessions().is_empty());
    }

    #[test]
    fn test_refresh_before_timeout_prevents_removal() {
        let (directory, _dispatcher) = make_directory(5);
        directory
            .state
            .response_received(sender(), response("Alpha", 7777, 0));

        // A refresh resets last_seen, so a prune dated from "4 seconds after
        // the original sighting" no longer exceeds the 5 s timeout.
        directory
            .state
            .response_received(sender(), response("Alpha", 7777, 1));
        directory
            .state
            .prune_stale(Instant::now() + Duration::from_secs(4));

        assert_eq!(directory.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_emits_started_discovered_and_lost_in_order() {
        let (mut directory, _dispatcher) = make_directory(0);
        let mut events = directory.start_scan(Some(Duration::from_secs(30))).unwrap();

        directory
            .state
            .response_received(sender(), response("Alpha", 7777, 0));
        directory
            .state
            .prune_stale(Instant::now() + Duration::from_secs(1));

        let first = events.next().await.expect("ScanStarted");
        assert!(matches!(first.kind, DiscoveryEventKind::ScanStarted));
        let second = events.next().await.expect("Discovered");
        match second.kind {
            DiscoveryEventKind::Discovered(s) => assert_eq!(s.name, "Alpha"),
            other => panic!("expected Discovered, got {other:?}"),
        }
        let third = events.next().await.expect("Lost");
        assert!(matches!(third.kind, DiscoveryEventKind::Lost(_)));

        directory.stop_scan();
        assert!(directory.sessions().is_empty(), "lost session was removed");
    }

    #[tokio::test]
    async fn test_updated_event_on_refresh() {
        let (mut directory, _dispatcher) = make_directory(5);
        let mut events = directory.start_scan(Some(Duration::from_secs(30))).unwrap();

        directory
            .state
            .response_received(sender(), response("Alpha", 7777, 0));
        directory
            .state
            .response_received(sender(), response("Alpha", 7777, 1));

        events.next().await; // ScanStarted
        events.next().await; // Discovered
        let third = events.next().await.expect("Updated");
        match third.kind {
            DiscoveryEventKind::Updated(s) => assert_eq!(s.current_players, 1),
            other => panic!("expected Updated, got {other:?}"),
        }
        directory.stop_scan();
    }

    #[tokio::test]
    async fn test_scan_deadline_emits_scan_complete_and_keeps_sessions() {
        let (mut directory, _dispatcher) = make_directory_with_interval(600, 50);
        let mut events = directory
            .start_scan(Some(Duration::from_millis(120)))
            .unwrap();

        directory
            .state
            .response_received(sender(), response("Alpha", 7777, 0));

        let mut saw_complete = false;
        while let Some(event) = events.next().await {
            if matches!(event.kind, DiscoveryEventKind::ScanComplete) {
                saw_complete = true;
            }
        }
        assert!(saw_complete, "deadline expiry must emit ScanComplete");
        assert_eq!(
            directory.sessions().len(),
            1,
            "sessions survive scan completion until staleness expiry"
        );
    }

    #[tokio::test]
    async fn test_manual_stop_does_not_emit_scan_complete() {
        let (mut directory, _dispatcher) = make_directory(5);
        let mut events = directory.start_scan(Some(Duration::from_secs(30))).unwrap();

        directory.stop_scan();

        let mut kinds = Vec::new();
        while let Some(event) = events.next().await {
            kinds.push(event.kind);
        }
        assert!(
            !kinds
                .iter()
                .any(|k| matches!(k, DiscoveryEventKind::ScanComplete)),
            "manual stop must not look like natural completion"
        );
    }

    #[tokio::test]
    async fn test_stop_scan_twice_is_harmless() {
        let (mut directory, _dispatcher) = make_directory(5);
        let _events = directory.start_scan(Some(Duration::from_secs(30))).unwrap();
        directory.stop_scan();
        directory.stop_scan();
        assert!(!directory.is_scanning());
    }

    #[tokio::test]
    async fn test_new_scan_clears_previous_results() {
        let (mut directory, _dispatcher) = make_directory(5);
        let _events = directory.start_scan(Some(Duration::from_secs(30))).unwrap();
        directory
            .state
            .response_received(sender(), response("Alpha", 7777, 0));
        directory.stop_scan();
        assert_eq!(directory.sessions().len(), 1, "results persist after stop");

        let _events = directory.start_scan(Some(Duration::from_secs(30))).unwrap();
        assert!(
            directory.sessions().is_empty(),
            "starting a scan clears the directory"
        );
        directory.stop_scan();
    }

    #[tokio::test]
    async fn test_find_session_resolves_on_matching_discovery() {
        let (mut directory, _dispatcher) = make_directory(5);

        // Inject the response after the scan is underway.
        let state = Arc::clone(&directory.state);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            state.response_received(sender(), response("Target", 7777, 0));
        });

        let found = directory
            .find_session(|s| s.name == "Target", Some(Duration::from_secs(10)))
            .await;

        assert_eq!(found.expect("must find the session").name, "Target");
        assert!(!directory.is_scanning(), "no scan may outlive find_session");
    }

    #[tokio::test]
    async fn test_find_session_returns_none_on_timeout() {
        let (mut directory, _dispatcher) = make_directory(5);
        let found = directory
            .find_session(|_| true, Some(Duration::from_millis(100)))
            .await;
        assert!(found.is_none());
        assert!(!directory.is_scanning());
    }
}
