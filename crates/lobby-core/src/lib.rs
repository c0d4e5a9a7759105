//! # lobby-core
//!
//! Shared library for LanLobby containing the discovery wire protocol, the
//! connect-time payload, the session data model, and the join-validation
//! pipeline.
//!
//! This crate is used by both the hosting and joining sides. It has zero
//! dependencies on sockets, async runtimes, or any particular game engine:
//! everything here is pure logic that the `lobby-net` runtime crate drives.
//!
//! - **`protocol`** – How bytes travel over the network: a 9-byte-header
//!   binary frame for UDP discovery, and a JSON payload handed to the
//!   reliable transport at connect time.
//!
//! - **`session`** – The session model and its rules: the authoritative
//!   hosted-session record, lifecycle/outcome status codes, and the ordered
//!   approval pipeline that gates incoming connections.

pub mod protocol;
pub mod session;

// Re-export the most-used types at the crate root so callers can write
// `lobby_core::SessionManager` instead of `lobby_core::session::manager::SessionManager`.
pub use protocol::codec::{decode_frame, encode_frame, ProtocolError};
pub use protocol::messages::{
    BroadcastMessage, DiscoveryMessage, MessageType, ResponseMessage, HEADER_SIZE, MAGIC,
    PROTOCOL_VERSION,
};
pub use protocol::payload::{ConnectionPayload, PayloadError};
pub use session::approval::{Approval, ApprovalValidator};
pub use session::manager::{JoinRules, SessionManager, SessionManagerConfig};
pub use session::status::ConnectionStatus;
pub use session::types::{DiscoveredSession, PlayerData, SessionInfo, SessionSettings};
