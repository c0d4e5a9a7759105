//! Discovery runtime: the role-based UDP engine and the seeker-side session
//! directory built on top of it.

pub mod directory;
pub mod engine;

pub use directory::{DiscoveryEvent, DiscoveryEventKind, DiscoveryEvents, SessionDirectory};
pub use engine::{
    BroadcastHandler, DiscoveryEngine, DiscoveryError, DiscoveryRole, ResponseHandler,
};
