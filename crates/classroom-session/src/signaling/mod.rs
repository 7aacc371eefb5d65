//! Relay signaling client.
//!
//! Keeps one WebSocket open to the classroom relay using `tokio-tungstenite`,
//! reconnects with exponential backoff and re-joins the remembered room
//! after every reconnect.

mod client;
mod connection;
mod types;

pub use client::SignalingClient;
pub use types::{SignalingConfig, SignalingEvent};

#[cfg(test)]
pub(crate) use types::SignalingCommand;
