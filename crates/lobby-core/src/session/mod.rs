//! Session domain: status codes, the session data model, the authoritative
//! session manager, and connection approval.

pub mod approval;
pub mod manager;
pub mod status;
pub mod types;

pub use approval::{Approval, ApprovalValidator};
pub use manager::{JoinRule, JoinRules, SessionManager, SessionManagerConfig};
pub use status::ConnectionStatus;
pub use types::{DiscoveredSession, PlayerData, SessionInfo, SessionSettings};
