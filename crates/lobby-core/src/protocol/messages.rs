//! Discovery protocol message types.
//!
//! Every discovery datagram starts with an 8-byte application tag followed by
//! a 1-byte message type, so unrelated traffic on the discovery port can be
//! rejected before any payload parsing happens.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// 8-byte application tag prepended to every discovery frame.
///
/// Any datagram whose first eight bytes differ from this tag, even by a
/// single bit, is treated as noise from another application and dropped.
pub const MAGIC: [u8; 8] = *b"LANLOBBY";

/// Total size of the frame header in bytes (magic tag + message type).
pub const HEADER_SIZE: usize = 9;

/// Current discovery protocol version carried inside broadcast frames.
pub const PROTOCOL_VERSION: i32 = 1;

// ── Message type codes ────────────────────────────────────────────────────────

/// Message type byte following the magic tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Seeker → subnet: "is anyone hosting?"
    Broadcast = 0x00,
    /// Advertiser → seeker: "yes, here is my session."
    Response = 0x01,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x00 => Ok(MessageType::Broadcast),
            0x01 => Ok(MessageType::Response),
            _ => Err(()),
        }
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// BROADCAST (0x00): sent by a seeker to the subnet broadcast address.
///
/// Deliberately small: the only thing an advertiser needs to know is whether
/// the seeker speaks a compatible protocol before answering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    /// Protocol version the seeker speaks.
    pub protocol_version: i32,
}

/// RESPONSE (0x01): an advertiser's answer describing its hosted session.
///
/// The session password itself is never included; only the `has_password`
/// flag travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Game transport port the session accepts connections on.
    pub port: u16,
    /// Display name of the hosted session.
    pub server_name: String,
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
    /// Opaque host-defined extension data, if any.
    pub custom_data_json: Option<String>,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid discovery messages, discriminated by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiscoveryMessage {
    Broadcast(BroadcastMessage),
    Response(ResponseMessage),
}

impl DiscoveryMessage {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            DiscoveryMessage::Broadcast(_) => MessageType::Broadcast,
            DiscoveryMessage::Response(_) => MessageType::Response,
        }
    }
}
