//! Configuration and event/command enums for the signaling client.

use std::time::Duration;

use classroom_common::{ClientMessage, ServerMessage};
use classroom_config::ClientConfig;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Relay WebSocket URL (`ws://` or `wss://`).
    pub url: String,
    pub connect_timeout: Duration,
    /// Reconnect base delay, doubled per failed attempt.
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for SignalingConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            url: config.url.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
            max_reconnect_delay: Duration::from_secs(config.max_reconnect_delay_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Events & Commands
// ---------------------------------------------------------------------------

/// Events emitted by the signaling client.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// WebSocket connection established (initially or after a reconnect).
    Connected,
    /// WebSocket connection lost.
    Disconnected,
    Message(ServerMessage),
    Error(String),
}

/// The room membership re-sent after every reconnect.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Membership {
    pub room_id: String,
    pub user_id: String,
    pub user_name: String,
}

impl Membership {
    pub(crate) fn join_message(&self) -> ClientMessage {
        ClientMessage::JoinRoom {
            room_id: self.room_id.clone(),
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
        }
    }
}

/// Commands sent from the client handle to the connection task.
#[derive(Debug)]
pub(crate) enum SignalingCommand {
    Join(Membership),
    Leave,
    Send(ClientMessage),
    Disconnect,
}
