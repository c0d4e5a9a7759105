//! Session data model shared by the hosting and joining sides.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Instant, SystemTime};

use uuid::Uuid;

/// Desired session parameters supplied by the host when creating a session.
///
/// `extension_data` is host-local: the map is never sent over the wire as a
/// group, though a response builder may copy individual values into the
/// discovery response's custom-data field.
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    /// Display name; a blank name gets a generated placeholder.
    pub name: String,
    /// Capacity; non-positive values fall back to the configured default.
    pub max_players: i32,
    /// Join password; `None` means the session is open.
    pub password: Option<String>,
    /// Index of the map/level to run.
    pub map_index: i32,
    /// Free-form host-local key/value extension data.
    pub extension_data: HashMap<String, String>,
}

/// The authoritative record of an active hosted session.
///
/// Owned exclusively by the `SessionManager`; exactly one instance exists per
/// hosting process at a time. Identity fields (`session_id`, `created_at`,
/// `protocol_version`) never change after creation; only `current_players`
/// is mutated, and only through the manager.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Unique id of this session instance.
    pub session_id: Uuid,
    /// Wall-clock creation time.
    pub created_at: SystemTime,
    /// Protocol version the host speaks.
    pub protocol_version: i32,
    /// Display name after defaulting.
    pub name: String,
    /// Players currently connected, always in `[0, max_players]`.
    pub current_players: i32,
    /// Capacity after defaulting.
    pub max_players: i32,
    /// Join password; never echoed in discovery responses except as a flag.
    pub password: Option<String>,
    /// Index of the map/level the session is running.
    pub map_index: i32,
    /// Host-local extension metadata.
    pub extension_data: HashMap<String, String>,
}

impl SessionInfo {
    /// Whether joining this session requires a password.
    pub fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Whether the session is at capacity.
    pub fn is_full(&self) -> bool {
        self.current_players >= self.max_players
    }
}

/// Seeker-side read view of a remote session, keyed by its endpoint.
///
/// Mutated only by the session directory in response to discovery responses
/// and staleness pruning.
#[derive(Debug, Clone)]
pub struct DiscoveredSession {
    /// Transport endpoint (address + game port) to connect to.
    pub endpoint: SocketAddr,
    /// Display name from the discovery response.
    pub name: String,
    /// Players currently connected.
    pub current_players: i32,
    /// Session capacity.
    pub max_players: i32,
    /// Whether joining requires a password.
    pub has_password: bool,
    /// Protocol version of the hosting process.
    pub protocol_version: i32,
    /// Index of the map/level the session is running.
    pub map_index: i32,
    /// When the last response for this endpoint arrived.
    pub last_seen: Instant,
    /// Opaque host-defined metadata.
    pub custom_data_json: Option<String>,
}

/// Per-connected-peer record kept by the hosting side.
///
/// Lifetime is bounded by the peer's connection: created when the transport
/// reports the peer connected, dropped when it disconnects.
#[derive(Debug, Clone)]
pub struct PlayerData {
    /// Display name from the validated connection payload.
    pub player_name: String,
    /// Transport-level identifier for this peer.
    pub peer_id: u64,
}
