use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures while acquiring or switching local media.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("no local stream")]
    NoLocalStream,

    #[error("no {0} track")]
    MissingTrack(&'static str),

    #[error("media unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("connect timed out after {0}s")]
    Timeout(u64),

    #[error("signaling client is closed")]
    Closed,

    #[error("relay error: {0}")]
    Relay(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("peer connection failed: {0}")]
    ConnectionFailed(String),

    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("track replacement failed: {0}")]
    ReplaceTrack(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClassroomError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("session closed")]
    SessionClosed,
}
