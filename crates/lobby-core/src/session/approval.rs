//! ApprovalValidator: turns raw connect-time bytes into an accept/reject
//! decision.
//!
//! The validator sits between the transport's approval hook and the
//! [`SessionManager`](crate::session::manager::SessionManager): it size-checks
//! and decodes the opaque blob, then delegates the semantic checks to the
//! manager's pipeline. Oversized blobs are rejected before any decode attempt
//! so a hostile peer cannot make the host parse arbitrarily large input.

use tracing::debug;

use crate::protocol::payload::ConnectionPayload;
use crate::session::manager::SessionManager;
use crate::session::status::ConnectionStatus;

/// Result of validating one connection attempt.
#[derive(Debug, Clone)]
pub struct Approval {
    /// Whether the connection should be accepted.
    pub approved: bool,
    /// `Success`, or the first failing check's rejection code.
    pub status: ConnectionStatus,
    /// The decoded payload when decoding succeeded; kept on pipeline
    /// rejections for diagnostics.
    pub payload: Option<ConnectionPayload>,
}

impl Approval {
    fn reject(status: ConnectionStatus, payload: Option<ConnectionPayload>) -> Self {
        Self {
            approved: false,
            status,
            payload,
        }
    }
}

/// Validates raw connection bytes against size, shape, and session rules.
#[derive(Debug, Clone)]
pub struct ApprovalValidator {
    /// Maximum accepted connect-payload size in bytes.
    max_payload_bytes: usize,
}

impl ApprovalValidator {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    /// Runs the approval checks in order and returns the decision.
    ///
    /// Order: empty bytes → `GenericFailure`; oversize → `PayloadTooLarge`
    /// (no decode attempt); decode failure → `GenericFailure`; otherwise the
    /// manager's pipeline decides.
    pub fn validate(&self, raw: &[u8], manager: &SessionManager) -> Approval {
        if raw.is_empty() {
            debug!("approval rejected: empty connection payload");
            return Approval::reject(ConnectionStatus::GenericFailure, None);
        }
        if raw.len() > self.max_payload_bytes {
            debug!(
                size = raw.len(),
                max = self.max_payload_bytes,
                "approval rejected: connection payload too large"
            );
            return Approval::reject(ConnectionStatus::PayloadTooLarge, None);
        }

        let payload = match ConnectionPayload::from_bytes(raw) {
            Ok(p) => p,
            Err(e) => {
                debug!("approval rejected: {e}");
                return Approval::reject(ConnectionStatus::GenericFailure, None);
            }
        };

        match manager.validate_join(&payload) {
            Ok(()) => Approval {
                approved: true,
                status: ConnectionStatus::Success,
                payload: Some(payload),
            },
            Err(status) => {
                debug!(?status, player = %payload.player_name, "approval rejected by pipeline");
                Approval::reject(status, Some(payload))
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
