//! SessionManager: the advertiser-side authoritative session record.
//!
//! At most one session exists per hosting process. The manager owns that
//! record exclusively: collaborators never mutate `SessionInfo` directly,
//! they go through [`SessionManager::increment_player_count`] /
//! [`SessionManager::decrement_player_count`] so the count can never escape
//! `[0, max_players]`.
//!
//! # Join validation
//!
//! `validate_join` runs an ordered, short-circuiting pipeline and returns the
//! **first** failing reason:
//!
//! ```text
//! session exists?   → SessionNotFound
//! protocol match?   → ProtocolMismatch
//! name valid?       → InvalidPlayerName
//! seat available?   → ServerFull
//! password match?   → IncorrectPassword
//! extension hook    → caller-defined status
//! ```
//!
//! The existence check is structural (there is nothing to validate against
//! without a session); every other step is an injected [`JoinRules`] strategy,
//! so an embedder can replace one rule without reimplementing the rest.

use std::time::SystemTime;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::messages::ResponseMessage;
use crate::protocol::payload::ConnectionPayload;
use crate::session::status::ConnectionStatus;
use crate::session::types::{SessionInfo, SessionSettings};

/// Maximum accepted player-name length in characters.
pub const PLAYER_NAME_MAX_CHARS: usize = 32;

/// Extension-data key whose value is copied into discovery responses.
pub const CUSTOM_DATA_KEY: &str = "custom_data";

/// Tuning knobs applied when a host supplies incomplete settings.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Capacity used when settings carry a non-positive `max_players`.
    pub default_max_players: i32,
    /// Prefix for generated names when settings carry a blank name.
    pub default_name_prefix: String,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            default_max_players: 8,
            default_name_prefix: "Game Session".to_string(),
        }
    }
}

/// A single join-validation step.
///
/// Returns `Ok(())` to let the pipeline continue, or the rejection status
/// that ends it.
pub type JoinRule =
    Box<dyn Fn(&SessionInfo, &ConnectionPayload) -> Result<(), ConnectionStatus> + Send + Sync>;

/// The replaceable steps of the join-validation pipeline, in execution order.
///
/// `JoinRules::default()` supplies the standard rules; replace any single
/// field to customize that step alone.
pub struct JoinRules {
    pub protocol: JoinRule,
    pub player_name: JoinRule,
    pub capacity: JoinRule,
    pub password: JoinRule,
    /// Game-defined final gate; the default always passes.
    pub extension: JoinRule,
}

impl Default for JoinRules {
    fn default() -> Self {
        Self {
            protocol: Box::new(|session, payload| {
                if payload.protocol_version == session.protocol_version {
                    Ok(())
                } else {
                    Err(ConnectionStatus::ProtocolMismatch)
                }
            }),
            player_name: Box::new(|_, payload| {
                let name = payload.player_name.trim();
                if name.is_empty() || payload.player_name.chars().count() > PLAYER_NAME_MAX_CHARS {
                    Err(ConnectionStatus::InvalidPlayerName)
                } else {
                    Ok(())
                }
            }),
            capacity: Box::new(|session, _| {
                if session.is_full() {
                    Err(ConnectionStatus::ServerFull)
                } else {
                    Ok(())
                }
            }),
            password: Box::new(|session, payload| {
                // Case-sensitive exact compare; an open session accepts anything.
                if !session.has_password() {
                    return Ok(());
                }
                if session.password.as_deref() == payload.password.as_deref() {
                    Ok(())
                } else {
                    Err(ConnectionStatus::IncorrectPassword)
                }
            }),
            extension: Box::new(|_, _| Ok(())),
        }
    }
}

type SessionListener = Box<dyn Fn(&SessionInfo) + Send + Sync>;
type DestroyListener = Box<dyn Fn() + Send + Sync>;
type CountListener = Box<dyn Fn(i32) + Send + Sync>;

/// Owns the single hosted-session record and the join-validation pipeline.
pub struct SessionManager {
    config: SessionManagerConfig,
    rules: JoinRules,
    session: Option<SessionInfo>,
    /// Numeric suffix for generated session names; advances per creation.
    name_counter: u32,
    created_listeners: Vec<SessionListener>,
    destroyed_listeners: Vec<DestroyListener>,
    count_listeners: Vec<CountListener>,
}

impl SessionManager {
    /// Creates a manager with the standard validation rules.
    pub fn new(config: SessionManagerConfig) -> Self {
        Self::with_rules(config, JoinRules::default())
    }

    /// Creates a manager with custom validation rules.
    pub fn with_rules(config: SessionManagerConfig, rules: JoinRules) -> Self {
        Self {
            config,
            rules,
            session: None,
            name_counter: 0,
            created_listeners: Vec::new(),
            destroyed_listeners: Vec::new(),
            count_listeners: Vec::new(),
        }
    }

    /// The active session, if this process is hosting.
    pub fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    /// Registers a listener invoked after a session is created.
    pub fn on_session_created(&mut self, f: impl Fn(&SessionInfo) + Send + Sync + 'static) {
        self.created_listeners.push(Box::new(f));
    }

    /// Registers a listener invoked after the session is destroyed.
    pub fn on_session_destroyed(&mut self, f: impl Fn() + Send + Sync + 'static) {
        self.destroyed_listeners.push(Box::new(f));
    }

    /// Registers a listener invoked after the player count changes.
    pub fn on_player_count_changed(&mut self, f: impl Fn(i32) + Send + Sync + 'static) {
        self.count_listeners.push(Box::new(f));
    }

    /// Creates the session, applying defaults for blank/invalid settings.
    ///
    /// An already-existing session is destroyed first; that path indicates the
    /// embedder skipped a `destroy_session` and is logged as unexpected.
    pub fn create_session(
        &mut self,
        settings: SessionSettings,
        protocol_version: i32,
    ) -> &SessionInfo {
        if self.session.is_some() {
            warn!("create_session called while a session already exists; destroying the old one");
            self.destroy_session();
        }

        self.name_counter += 1;
        let name = if settings.name.trim().is_empty() {
            format!("{} {}", self.config.default_name_prefix, self.name_counter)
        } else {
            settings.name
        };
        let max_players = if settings.max_players <= 0 {
            self.config.default_max_players
        } else {
            settings.max_players
        };

        let info = SessionInfo {
            session_id: Uuid::new_v4(),
            created_at: SystemTime::now(),
            protocol_version,
            name,
            current_players: 0,
            max_players,
            password: settings.password.filter(|p| !p.is_empty()),
            map_index: settings.map_index,
            extension_data: settings.extension_data,
        };
        debug!(session_id = %info.session_id, name = %info.name, "session created");

        for listener in &self.created_listeners {
            listener(&info);
        }
        self.session.insert(info)
    }

    /// Destroys the session; no-op when none exists.
    pub fn destroy_session(&mut self) {
        if self.session.take().is_some() {
            debug!("session destroyed");
            for listener in &self.destroyed_listeners {
                listener();
            }
        }
    }

    /// Increments the player count, saturating at capacity.
    ///
    /// No-op when no session exists.
    pub fn increment_player_count(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.current_players >= session.max_players {
            warn!(
                current = session.current_players,
                max = session.max_players,
                "increment_player_count at capacity; count unchanged"
            );
            return;
        }
        session.current_players += 1;
        let count = session.current_players;
        for listener in &self.count_listeners {
            listener(count);
        }
    }

    /// Decrements the player count, flooring at zero.
    ///
    /// No-op when no session exists.
    pub fn decrement_player_count(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.current_players == 0 {
            warn!("decrement_player_count at zero; count unchanged");
            return;
        }
        session.current_players -= 1;
        let count = session.current_players;
        for listener in &self.count_listeners {
            listener(count);
        }
    }

    /// Runs the ordered join-validation pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's [`ConnectionStatus`].
    pub fn validate_join(&self, payload: &ConnectionPayload) -> Result<(), ConnectionStatus> {
        let session = self.session.as_ref().ok_or(ConnectionStatus::SessionNotFound)?;
        (self.rules.protocol)(session, payload)?;
        (self.rules.player_name)(session, payload)?;
        (self.rules.capacity)(session, payload)?;
        (self.rules.password)(session, payload)?;
        (self.rules.extension)(session, payload)?;
        Ok(())
    }

    /// Builds the discovery response describing the active session.
    ///
    /// Returns `None` when not hosting. The password travels only as the
    /// `has_password` flag; extension data contributes only the value under
    /// [`CUSTOM_DATA_KEY`].
    pub fn build_response(&self, port: u16) -> Option<ResponseMessage> {
        let session = self.session.as_ref()?;
        Some(ResponseMessage {
            port,
            server_name: session.name.clone(),
            current_players: session.current_players,
            max_players: session.max_players,
            has_password: session.has_password(),
            protocol_version: session.protocol_version,
            map_index: session.map_index,
            custom_data_json: session.extension_data.get(CUSTOM_DATA_KEY).cloned(),
        })
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionManagerConfig::default())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
