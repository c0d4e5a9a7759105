//! LanLobby headless demo binary.
//!
//! Two modes, both driven entirely by the discovery stack (no game transport
//! involved):
//!
//! ```text
//! lanlobby host [name]   advertise a demo session on the LAN
//! lanlobby scan          scan the LAN and print discovered sessions
//! ```
//!
//! Useful for checking discovery connectivity between two machines before
//! wiring the orchestrator into an actual game.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use lobby_core::session::manager::{SessionManager, SessionManagerConfig};
use lobby_core::session::types::SessionSettings;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lobby_net::config::{self, AppConfig};
use lobby_net::discovery::directory::{DiscoveryEventKind, SessionDirectory};
use lobby_net::discovery::engine::DiscoveryEngine;
use lobby_net::dispatch::MainThreadDispatcher;
use lobby_net::orchestrator::SessionResponder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_config()?;

    // Initialise structured logging. `RUST_LOG` overrides the config level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.general.log_level.clone())),
        )
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("host") => run_host(config, args.next()).await,
        Some("scan") | None => run_scan(config).await,
        Some(other) => {
            anyhow::bail!("unknown mode {other:?}; expected \"host\" or \"scan\"");
        }
    }
}

/// Watches for Ctrl-C and clears `running` when it arrives.
fn spawn_shutdown_watcher(running: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running.store(false, Ordering::Relaxed);
        }
    });
}

/// Hosts a demo session and answers discovery broadcasts until Ctrl-C.
async fn run_host(config: AppConfig, name: Option<String>) -> anyhow::Result<()> {
    let mut dispatcher = MainThreadDispatcher::new();
    let mut engine = DiscoveryEngine::new(config.discovery.port, dispatcher.handle());

    let manager = Arc::new(Mutex::new(SessionManager::new(SessionManagerConfig {
        default_max_players: config.session.default_max_players,
        default_name_prefix: config.session.default_name_prefix.clone(),
    })));
    {
        let mut manager = manager.lock().expect("session manager lock poisoned");
        let session = manager.create_session(
            SessionSettings {
                name: name.unwrap_or_default(),
                max_players: config.session.default_max_players,
                ..SessionSettings::default()
            },
            config.session.protocol_version,
        );
        info!("hosting demo session \"{}\"", session.name);
    }

    engine.start_advertiser(Arc::new(SessionResponder::new(
        Arc::clone(&manager),
        config.session.game_port,
    )))?;
    info!(
        "advertising on UDP {}; press Ctrl-C to stop",
        config.discovery.port
    );

    let running = Arc::new(AtomicBool::new(true));
    spawn_shutdown_watcher(Arc::clone(&running));

    // The owner-thread tick: drain dispatched broadcast handlers.
    while running.load(Ordering::Relaxed) {
        dispatcher.drain();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    engine.stop();
    manager
        .lock()
        .expect("session manager lock poisoned")
        .destroy_session();
    info!("host stopped");
    Ok(())
}

/// Runs one discovery scan and prints everything it finds.
async fn run_scan(config: AppConfig) -> anyhow::Result<()> {
    let mut dispatcher = MainThreadDispatcher::new();
    let engine = Arc::new(Mutex::new(DiscoveryEngine::new(
        config.discovery.port,
        dispatcher.handle(),
    )));
    let mut directory = SessionDirectory::new(
        config.discovery.clone(),
        config.session.protocol_version,
        engine,
    );

    let running = Arc::new(AtomicBool::new(true));
    spawn_shutdown_watcher(Arc::clone(&running));

    let mut events = directory.start_scan(None)?;
    info!(
        "scanning for {}s; press Ctrl-C to stop early",
        config.discovery.scan_timeout_secs
    );

    loop {
        if !running.load(Ordering::Relaxed) {
            directory.stop_scan();
            break;
        }
        dispatcher.drain();
        match tokio::time::timeout(Duration::from_millis(100), events.next()).await {
            Ok(Some(event)) => match event.kind {
                DiscoveryEventKind::Discovered(s) => {
                    info!(
                        "found \"{}\" at {} ({}/{} players{})",
                        s.name,
                        s.endpoint,
                        s.current_players,
                        s.max_players,
                        if s.has_password { ", password" } else { "" }
                    );
                }
                DiscoveryEventKind::Updated(s) => {
                    info!("updated \"{}\": {}/{} players", s.name, s.current_players, s.max_players);
                }
                DiscoveryEventKind::Lost(s) => warn!("lost \"{}\" at {}", s.name, s.endpoint),
                DiscoveryEventKind::ScanStarted => {}
                DiscoveryEventKind::ScanComplete => info!("scan complete"),
            },
            Ok(None) => break,
            Err(_) => continue,
        }
    }

    let sessions = directory.sessions();
    info!("{} session(s) in the directory", sessions.len());
    Ok(())
}
