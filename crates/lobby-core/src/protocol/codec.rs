//! Binary codec for encoding and decoding discovery frames.
//!
//! Wire format:
//! ```text
//! [magic:8][msg_type:1][payload:N]
//! ```
//! Total header size: 9 bytes. All multi-byte integers are big-endian.
//! Strings are 2-byte-length-prefixed UTF-8; optional strings carry a 1-byte
//! presence flag before the string itself.

use crate::protocol::messages::{
    BroadcastMessage, DiscoveryMessage, MessageType, ResponseMessage, HEADER_SIZE, MAGIC,
};
use thiserror::Error;

/// Errors that can occur while decoding a discovery frame.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The first eight bytes do not match the application tag.
    #[error("bad magic tag: frame is not a discovery frame")]
    BadMagic,

    /// The message type byte is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The payload could not be parsed (truncated field, invalid UTF-8, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`DiscoveryMessage`] into a byte vector including the 9-byte header.
///
/// # Examples
///
/// ```rust
/// use lobby_core::protocol::{encode_frame, decode_frame};
/// use lobby_core::protocol::messages::{BroadcastMessage, DiscoveryMessage};
///
/// let msg = DiscoveryMessage::Broadcast(BroadcastMessage { protocol_version: 1 });
/// let bytes = encode_frame(&msg);
/// let decoded = decode_frame(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// ```
pub fn encode_frame(msg: &DiscoveryMessage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + 64);
    buf.extend_from_slice(&MAGIC);
    buf.push(msg.message_type() as u8);
    match msg {
        DiscoveryMessage::Broadcast(m) => encode_broadcast(&mut buf, m),
        DiscoveryMessage::Response(m) => encode_response(&mut buf, m),
    }
    buf
}

/// Decodes one [`DiscoveryMessage`] from `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is truncated, carries the wrong
/// magic tag, declares an unknown message type, or has a malformed payload.
pub fn decode_frame(bytes: &[u8]) -> Result<DiscoveryMessage, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    // Exact-match gate: a single flipped bit in the tag rejects the frame.
    if bytes[..MAGIC.len()] != MAGIC {
        return Err(ProtocolError::BadMagic);
    }

    let msg_type_byte = bytes[MAGIC.len()];
    let msg_type = MessageType::try_from(msg_type_byte)
        .map_err(|_| ProtocolError::UnknownMessageType(msg_type_byte))?;

    let payload = &bytes[HEADER_SIZE..];
    match msg_type {
        MessageType::Broadcast => decode_broadcast(payload).map(DiscoveryMessage::Broadcast),
        MessageType::Response => decode_response(payload).map(DiscoveryMessage::Response),
    }
}

// ── Per-message encode helpers ────────────────────────────────────────────────

fn encode_broadcast(buf: &mut Vec<u8>, m: &BroadcastMessage) {
    buf.extend_from_slice(&m.protocol_version.to_be_bytes());
}

fn encode_response(buf: &mut Vec<u8>, m: &ResponseMessage) {
    buf.extend_from_slice(&m.port.to_be_bytes());
    write_length_prefixed_string(buf, &m.server_name);
    buf.extend_from_slice(&m.current_players.to_be_bytes());
    buf.extend_from_slice(&m.max_players.to_be_bytes());
    buf.push(if m.has_password { 0x01 } else { 0x00 });
    buf.extend_from_slice(&m.protocol_version.to_be_bytes());
    buf.extend_from_slice(&m.map_index.to_be_bytes());
    write_optional_string(buf, m.custom_data_json.as_deref());
}

// ── Per-message decode helpers ────────────────────────────────────────────────

fn decode_broadcast(p: &[u8]) -> Result<BroadcastMessage, ProtocolError> {
    let protocol_version = read_i32(p, 0, "Broadcast.protocol_version")?;
    Ok(BroadcastMessage { protocol_version })
}

fn decode_response(p: &[u8]) -> Result<ResponseMessage, ProtocolError> {
    // 2 (port) + 2 (name_len) + 4+4 (counts) + 1 (flag) + 4+4 (version, map) + 1 (opt flag)
    require_len(p, 22, "Response")?;
    let port = u16::from_be_bytes([p[0], p[1]]);
    let (server_name, off) = read_length_prefixed_string(p, 2)?;
    let current_players = read_i32(p, off, "Response.current_players")?;
    let max_players = read_i32(p, off + 4, "Response.max_players")?;
    require_len(p, off + 9, "Response.has_password")?;
    let has_password = p[off + 8] != 0;
    let protocol_version = read_i32(p, off + 9, "Response.protocol_version")?;
    let map_index = read_i32(p, off + 13, "Response.map_index")?;
    let (custom_data_json, _) = read_optional_string(p, off + 17)?;
    Ok(ResponseMessage {
        port,
        server_name,
        current_players,
        max_players,
        has_password,
        protocol_version,
        map_index,
        custom_data_json,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_i32(buf: &[u8], offset: usize, context: &str) -> Result<i32, ProtocolError> {
    if buf.len() < offset + 4 {
        return Err(ProtocolError::MalformedPayload(format!(
            "{context}: need 4 bytes at offset {offset}, got {}",
            buf.len().saturating_sub(offset)
        )));
    }
    Ok(i32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

/// Writes a 1-byte presence flag, then the string when present.
fn write_optional_string(buf: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => {
            buf.push(0x01);
            write_length_prefixed_string(buf, s);
        }
        None => buf.push(0x00),
    }
}

/// Reads a 1-byte presence flag and, when set, a length-prefixed string.
fn read_optional_string(
    buf: &[u8],
    offset: usize,
) -> Result<(Option<String>, usize), ProtocolError> {
    if buf.len() < offset + 1 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 1 byte for optional-string flag at offset {offset}"
        )));
    }
    match buf[offset] {
        0x00 => Ok((None, offset + 1)),
        0x01 => {
            let (s, end) = read_length_prefixed_string(buf, offset + 1)?;
            Ok((Some(s), end))
        }
        other => Err(ProtocolError::MalformedPayload(format!(
            "invalid optional-string flag: 0x{other:02X}"
        ))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
