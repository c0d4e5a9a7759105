//! Connection lifecycle states and join-outcome codes.

use serde::{Deserialize, Serialize};

/// All connection statuses, discriminated into two disjoint ranges.
///
/// Lifecycle states (`0x00`–`0x0F`) describe where a peer currently is;
/// outcome codes (`0x10` and up) describe how a connection attempt ended.
/// A status is exactly one of these at a time; rejection codes are terminal
/// outcomes of a `Connecting` attempt, never resting states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnectionStatus {
    // Lifecycle (0x00–0x0F)
    Disconnected = 0x00,
    Connecting = 0x01,
    Connected = 0x02,
    Hosting = 0x03,
    // Outcomes (0x10–)
    Success = 0x10,
    ServerFull = 0x11,
    IncorrectPassword = 0x12,
    ProtocolMismatch = 0x13,
    InvalidPlayerName = 0x14,
    PayloadTooLarge = 0x15,
    AlreadyConnected = 0x16,
    Banned = 0x17,
    SessionNotFound = 0x18,
    Timeout = 0x19,
    GenericFailure = 0x1A,
}

impl ConnectionStatus {
    /// Returns `true` for lifecycle states (`Disconnected`, `Connecting`,
    /// `Connected`, `Hosting`).
    pub fn is_lifecycle(self) -> bool {
        (self as u8) < 0x10
    }

    /// Returns `true` for outcome codes other than [`ConnectionStatus::Success`].
    pub fn is_rejection(self) -> bool {
        !self.is_lifecycle() && self != ConnectionStatus::Success
    }

    /// Human-readable reason delivered to a rejected peer.
    ///
    /// Lifecycle states have no rejection text; they return a neutral
    /// description so callers can log any status uniformly.
    pub fn reason_text(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Hosting => "hosting",
            ConnectionStatus::Success => "connection accepted",
            ConnectionStatus::ServerFull => "the session is full",
            ConnectionStatus::IncorrectPassword => "incorrect password",
            ConnectionStatus::ProtocolMismatch => {
                "protocol version does not match the host"
            }
            ConnectionStatus::InvalidPlayerName => "invalid player name",
            ConnectionStatus::PayloadTooLarge => "connection payload too large",
            ConnectionStatus::AlreadyConnected => "already connected to this session",
            ConnectionStatus::Banned => "you are banned from this session",
            ConnectionStatus::SessionNotFound => "no session is being hosted",
            ConnectionStatus::Timeout => "the connection attempt timed out",
            ConnectionStatus::GenericFailure => "the connection was refused",
        }
    }
}

impl TryFrom<u8> for ConnectionStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x00 => Ok(ConnectionStatus::Disconnected),
            0x01 => Ok(ConnectionStatus::Connecting),
            0x02 => Ok(ConnectionStatus::Connected),
            0x03 => Ok(ConnectionStatus::Hosting),
            0x10 => Ok(ConnectionStatus::Success),
            0x11 => Ok(ConnectionStatus::ServerFull),
            0x12 => Ok(ConnectionStatus::IncorrectPassword),
            0x13 => Ok(ConnectionStatus::ProtocolMismatch),
            0x14 => Ok(ConnectionStatus::InvalidPlayerName),
            0x15 => Ok(ConnectionStatus::PayloadTooLarge),
            0x16 => Ok(ConnectionStatus::AlreadyConnected),
            0x17 => Ok(ConnectionStatus::Banned),
            0x18 => Ok(ConnectionStatus::SessionNotFound),
            0x19 => Ok(ConnectionStatus::Timeout),
            0x1A => Ok(ConnectionStatus::GenericFailure),
            _ => Err(()),
        }
    }
}
