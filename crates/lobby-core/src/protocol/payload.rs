//! Connect-time payload carried through the reliable transport.
//!
//! When a client asks to join a session, the transport delivers an opaque
//! byte blob to the host before the connection is accepted. That blob is a
//! UTF-8 JSON encoding of [`ConnectionPayload`]; the host decodes it and runs
//! the join-validation pipeline against the result.
//!
//! JSON (not the binary discovery framing) is used here on purpose: the blob
//! travels inside the transport's own framing, so self-description and
//! debuggability matter more than size.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while decoding a connection payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The bytes are not valid JSON for a [`ConnectionPayload`].
    #[error("malformed connection payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A client's join request, serialized to bytes for the transport.
///
/// Field names on the wire are fixed camelCase keys; renaming a field here
/// without updating the serde attribute is a protocol break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPayload {
    /// Unique identifier of the client instance.
    #[serde(rename = "clientGUID")]
    pub client_guid: Uuid,
    /// Scene/context the client wants to join into.
    #[serde(rename = "clientScene")]
    pub client_scene: String,
    /// Display name the client wants to use.
    #[serde(rename = "playerName")]
    pub player_name: String,
    /// Protocol version the client speaks.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: i32,
    /// Session password, when the client supplied one.
    #[serde(rename = "password")]
    pub password: Option<String>,
    /// Opaque game-defined extension data.
    #[serde(rename = "customDataJson")]
    pub custom_data_json: Option<String>,
}

impl ConnectionPayload {
    /// Serializes the payload to UTF-8 JSON bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serialization of a plain struct with string/uuid fields cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Decodes a payload from transport bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Malformed`] when the bytes are not a valid
    /// JSON encoding of a payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> ConnectionPayload {
        ConnectionPayload {
            client_guid: Uuid::new_v4(),
            client_scene: "ArenaScene".to_string(),
            player_name: "PlayerOne".to_string(),
            protocol_version: 1,
            password: Some("hunter2".to_string()),
            custom_data_json: Some(r#"{"skin":"red"}"#.to_string()),
        }
    }

    #[test]
    fn test_payload_round_trips_losslessly() {
        let original = sample_payload();
        let bytes = original.to_bytes();
        let decoded = ConnectionPayload::from_bytes(&bytes).expect("decode");
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_payload_round_trips_with_absent_optionals() {
        let mut p = sample_payload();
        p.password = None;
        p.custom_data_json = None;
        let decoded = ConnectionPayload::from_bytes(&p.to_bytes()).expect("decode");
        assert_eq!(p, decoded);
    }

    #[test]
    fn test_payload_uses_camel_case_wire_keys() {
        let json = String::from_utf8(sample_payload().to_bytes()).unwrap();
        assert!(json.contains("\"clientGUID\""));
        assert!(json.contains("\"clientScene\""));
        assert!(json.contains("\"playerName\""));
        assert!(json.contains("\"protocolVersion\""));
        assert!(json.contains("\"customDataJson\""));
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(ConnectionPayload::from_bytes(b"not json at all").is_err());
        assert!(ConnectionPayload::from_bytes(b"").is_err());
    }

    #[test]
    fn test_from_bytes_rejects_json_with_missing_fields() {
        let result = ConnectionPayload::from_bytes(br#"{"playerName":"x"}"#);
        assert!(result.is_err());
    }
}
