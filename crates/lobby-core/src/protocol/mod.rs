//! Protocol module containing discovery message types, the binary frame
//! codec, and the JSON connect-time payload.

pub mod codec;
pub mod messages;
pub mod payload;

pub use codec::{decode_frame, encode_frame, ProtocolError};
pub use messages::*;
pub use payload::{ConnectionPayload, PayloadError};
