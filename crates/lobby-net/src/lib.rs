//! # lobby-net
//!
//! Runtime crate for LanLobby: the UDP discovery engine, the seeker-side
//! session directory, the main-thread dispatcher, the transport abstraction,
//! and the connection orchestrator that ties them together.
//!
//! Re-exports all public modules so that integration tests in `tests/` and
//! the binary entry point in `main.rs` share the same module tree.

pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod orchestrator;
pub mod transport;

pub use config::{AppConfig, ConfigError, DiscoveryConfig, GeneralConfig, SessionConfig};
pub use discovery::{
    BroadcastHandler, DiscoveryEngine, DiscoveryError, DiscoveryEvent, DiscoveryEventKind,
    DiscoveryEvents, DiscoveryRole, ResponseHandler, SessionDirectory,
};
pub use dispatch::{DispatchHandle, MainThreadDispatcher};
pub use orchestrator::{
    ConnectionOrchestrator, LocalIdentity, OrchestratorError, OrchestratorEvent, PeerRecord,
    SessionResponder, TargetedRpcParams,
};
pub use transport::{ApprovalDecision, PeerId, SessionTransport, TransportError, TransportEvent};
