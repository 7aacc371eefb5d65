//! Types, options and events for a classroom session.

use classroom_common::{ClassroomError, ClientMessage};
use classroom_config::{ClassroomConfig, MediaConfig};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::media::{DeviceInfo, MediaStream};
use crate::peer::{PeerConnection, PeerEvent};
use crate::signaling::SignalingConfig;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Who joins which room, and how.
#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub room_id: String,
    pub user_id: String,
    pub user_name: String,
    pub signaling: SignalingConfig,
    pub media: MediaConfig,
}

impl JoinOptions {
    pub fn new(
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            signaling: SignalingConfig::default(),
            media: MediaConfig::default(),
        }
    }

    /// Take the relay URL, backoff and media defaults from a loaded config.
    pub fn with_config(mut self, config: &ClassroomConfig) -> Self {
        self.signaling = SignalingConfig::from(&config.client);
        self.media = config.media.clone();
        self
    }
}

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// Snapshot of one remote participant.
#[derive(Debug, Clone)]
pub struct Participant {
    pub user_id: String,
    pub user_name: String,
    pub is_muted: bool,
    pub is_video_off: bool,
    /// Set once the peer connection delivers remote media.
    pub stream: Option<MediaStream>,
    pub connected: bool,
}

/// A live peer connection to one remote participant.
pub(crate) struct PeerSession {
    pub connection: Box<dyn PeerConnection>,
    pub initiator: bool,
    /// Distinguishes this connection's events from a replaced one's.
    pub generation: u64,
    pub remote_stream: Option<MediaStream>,
    pub connected: bool,
    pub forwarder: JoinHandle<()>,
}

impl PeerSession {
    pub async fn close(self) {
        self.forwarder.abort();
        self.connection.close().await;
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by a classroom session for the UI.
#[derive(Debug, Clone)]
pub enum ClassroomEvent {
    /// Signaling transport is up (initially or after a reconnect).
    Connected,
    Disconnected,
    RoomJoined {
        room_id: String,
        participants: Vec<Participant>,
    },
    ParticipantJoined {
        user_id: String,
        user_name: String,
    },
    ParticipantLeft {
        user_id: String,
    },
    RemoteStream {
        user_id: String,
        stream: MediaStream,
    },
    PeerConnected {
        user_id: String,
    },
    PeerClosed {
        user_id: String,
    },
    ParticipantAudio {
        user_id: String,
        is_muted: bool,
    },
    ParticipantVideo {
        user_id: String,
        is_video_off: bool,
    },
    LocalAudio {
        is_muted: bool,
    },
    LocalVideo {
        is_video_off: bool,
    },
    ScreenShareStarted,
    ScreenShareStopped,
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
    WhiteboardCleared {
        from: String,
    },
    FileShared {
        from: String,
        payload: serde_json::Value,
    },
    FileDeleted {
        from: String,
        payload: serde_json::Value,
    },
    /// User-facing error (device failure, relay error, transport failure).
    Error(String),
    /// The session has ended.
    Left,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub(crate) type Reply<T> = oneshot::Sender<Result<T, ClassroomError>>;

/// Commands sent from the session handle to the actor.
pub(crate) enum SessionCommand {
    ToggleAudio(Reply<bool>),
    ToggleVideo(Reply<bool>),
    StartScreenShare(Reply<()>),
    StopScreenShare(Reply<()>),
    SwitchCamera { device_id: String, reply: Reply<()> },
    ListCameras(Reply<Vec<DeviceInfo>>),
    Participants(oneshot::Sender<Vec<Participant>>),
    /// Room event forwarded to the relay as-is.
    Relay(ClientMessage, Reply<()>),
    Leave(oneshot::Sender<()>),
}

/// Internal notifications the actor sends to itself.
pub(crate) enum Inbox {
    Peer {
        remote_id: String,
        generation: u64,
        event: PeerEvent,
    },
    ScreenShareEnded {
        track_id: String,
    },
}
