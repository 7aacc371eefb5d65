//! Wire protocol between classroom clients and the relay.
//!
//! Every frame is a JSON text frame holding a tagged envelope. The relay
//! validates the envelope on receipt; `payload` fields stay opaque and are
//! forwarded exactly as received.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// WebRTC signaling exchanged between two peers through the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    /// SDP offer to establish a peer connection.
    Offer { sdp: String },
    /// SDP answer in response to an offer.
    Answer { sdp: String },
    /// ICE candidate for NAT traversal.
    IceCandidate {
        candidate: String,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u32>,
    },
}

impl Signal {
    pub fn is_offer(&self) -> bool {
        matches!(self, Self::Offer { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice_candidate",
        }
    }
}

// ---------------------------------------------------------------------------
// Client → relay
// ---------------------------------------------------------------------------

/// Messages a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom {
        room_id: String,
        user_id: String,
        user_name: String,
    },
    LeaveRoom,
    /// Routed to the single connection registered as `target`.
    SendingSignal { target: String, signal: Signal },
    ToggleAudio { is_muted: bool },
    ToggleVideo { is_video_off: bool },
    Draw {
        #[serde(default)]
        payload: serde_json::Value,
    },
    ChatMessage {
        #[serde(default)]
        payload: serde_json::Value,
    },
    ChatFile {
        #[serde(default)]
        payload: serde_json::Value,
    },
    ClearWhiteboard,
    ShareFile {
        #[serde(default)]
        payload: serde_json::Value,
    },
    DeleteFile {
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl ClientMessage {
    /// Event name as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::LeaveRoom => "leave-room",
            Self::SendingSignal { .. } => "sending-signal",
            Self::ToggleAudio { .. } => "toggle-audio",
            Self::ToggleVideo { .. } => "toggle-video",
            Self::Draw { .. } => "draw",
            Self::ChatMessage { .. } => "chat-message",
            Self::ChatFile { .. } => "chat-file",
            Self::ClearWhiteboard => "clear-whiteboard",
            Self::ShareFile { .. } => "share-file",
            Self::DeleteFile { .. } => "delete-file",
        }
    }
}

// ---------------------------------------------------------------------------
// Relay → client
// ---------------------------------------------------------------------------

/// A room member as reported in the join acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_video_off: bool,
}

/// Messages the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Acknowledges `join-room` to the joiner with the members already present.
    RoomJoined {
        room_id: String,
        connection_id: u64,
        members: Vec<MemberInfo>,
    },
    UserJoined { user_id: String, user_name: String },
    UserLeft { user_id: String },
    ReceivingSignal { from: String, signal: Signal },
    UserToggleAudio { user_id: String, is_muted: bool },
    UserToggleVideo { user_id: String, is_video_off: bool },
    Draw {
        from: String,
        payload: serde_json::Value,
    },
    ChatMessage {
        from: String,
        payload: serde_json::Value,
    },
    ChatFile {
        from: String,
        payload: serde_json::Value,
    },
    ClearWhiteboard { from: String },
    ShareFile {
        from: String,
        payload: serde_json::Value,
    },
    DeleteFile {
        from: String,
        payload: serde_json::Value,
    },
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
