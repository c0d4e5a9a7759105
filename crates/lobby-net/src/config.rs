//! TOML-based configuration for the LanLobby runtime.
//!
//! Reads and writes [`AppConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\LanLobby\config.toml`
//! - Linux:    `~/.config/lanlobby/config.toml`
//! - macOS:    `~/Library/Application Support/LanLobby/config.toml`
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file, so the app
//! works on first run (before a config file exists) and when upgrading from
//! an older file missing newer fields.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// General runtime behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether hosting also advertises the session on the LAN.
    #[serde(default = "default_true")]
    pub lan_discovery: bool,
}

/// UDP discovery tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// UDP port advertisers listen on and seekers broadcast to.
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    /// How long a scan runs before emitting `ScanComplete`.
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,
    /// Interval between broadcast frames during a scan.
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,
    /// Age after which an unrefreshed directory entry is pruned.
    #[serde(default = "default_stale_timeout_secs")]
    pub stale_timeout_secs: u64,
}

/// Session defaults and connection limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Capacity used when the host supplies a non-positive max.
    #[serde(default = "default_max_players")]
    pub default_max_players: i32,
    /// Prefix for generated session names.
    #[serde(default = "default_name_prefix")]
    pub default_name_prefix: String,
    /// Largest accepted connect-time payload in bytes.
    #[serde(default = "default_max_connect_payload")]
    pub max_connect_payload_bytes: usize,
    /// How long host/join waits for the transport before giving up.
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
    /// Protocol version advertised and required from joiners.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: i32,
    /// Game transport port announced in discovery responses.
    #[serde(default = "default_game_port")]
    pub game_port: u16,
}

impl DiscoveryConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }
}

impl SessionConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_discovery_port() -> u16 {
    47777
}
fn default_scan_timeout_secs() -> u64 {
    5
}
fn default_broadcast_interval_ms() -> u64 {
    1000
}
fn default_stale_timeout_secs() -> u64 {
    5
}
fn default_max_players() -> i32 {
    8
}
fn default_name_prefix() -> String {
    "Game Session".to_string()
}
fn default_max_connect_payload() -> usize {
    1024
}
fn default_connection_timeout_secs() -> u64 {
    10
}
fn default_protocol_version() -> i32 {
    lobby_core::PROTOCOL_VERSION
}
fn default_game_port() -> u16 {
    7777
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            lan_discovery: default_true(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            scan_timeout_secs: default_scan_timeout_secs(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
            stale_timeout_secs: default_stale_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_max_players: default_max_players(),
            default_name_prefix: default_name_prefix(),
            max_connect_payload_bytes: default_max_connect_payload(),
            connection_timeout_secs: default_connection_timeout_secs(),
            protocol_version: default_protocol_version(),
            game_port: default_game_port(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`AppConfig`] from disk, returning `AppConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LanLobby"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("lanlobby"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LanLobby")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_expected_discovery_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.discovery.port, 47777);
        assert_eq!(cfg.discovery.scan_timeout_secs, 5);
        assert_eq!(cfg.discovery.broadcast_interval_ms, 1000);
        assert_eq!(cfg.discovery.stale_timeout_secs, 5);
    }

    #[test]
    fn test_default_config_has_expected_session_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.session.default_max_players, 8);
        assert_eq!(cfg.session.default_name_prefix, "Game Session");
        assert_eq!(cfg.session.max_connect_payload_bytes, 1024);
        assert_eq!(cfg.session.protocol_version, lobby_core::PROTOCOL_VERSION);
        assert_eq!(cfg.session.game_port, 7777);
    }

    #[test]
    fn test_duration_helpers_convert_units() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.discovery.scan_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.discovery.broadcast_interval(), Duration::from_millis(1000));
        assert_eq!(cfg.session.connection_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_serializes_and_deserializes_round_trip() {
        let mut cfg = AppConfig::default();
        cfg.discovery.port = 50000;
        cfg.session.default_max_players = 32;
        cfg.general.lan_discovery = false;

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_deserialize_partial_section_overrides_defaults() {
        let toml_str = r#"
[discovery]
port = 48000
"#;
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");
        assert_eq!(cfg.discovery.port, 48000);
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.discovery.scan_timeout_secs, 5);
        assert_eq!(cfg.session.game_port, 7777);
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load_round_trip_via_temp_dir() {
        let dir = std::env::temp_dir().join(format!("lanlobby_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.discovery.port = 12345;
        cfg.general.log_level = "debug".to_string();

        let content = toml::to_string_pretty(&cfg).unwrap();
        std::fs::write(&path, &content).unwrap();
        let loaded: AppConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(loaded.discovery.port, 12345);
        assert_eq!(loaded.general.log_level, "debug");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"));
        }
        // NoPlatformConfigDir in a stripped CI environment is also acceptable.
    }
}
