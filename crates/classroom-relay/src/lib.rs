//! classroom-relay: WebSocket relay for classroom rooms.
//!
//! Tracks which connections are in which room and forwards signaling and
//! classroom events between them. Payloads are forwarded as received; the
//! relay only reads the envelope.

pub mod connection;
pub mod error;
pub mod registry;
pub mod relay;
pub mod server;

pub use error::RelayError;
pub use registry::{ConnectionId, RoomRegistry};
pub use relay::Relay;
pub use server::RelayServer;
