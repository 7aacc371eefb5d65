//! Local media primitives and the platform device seam.
//!
//! Tracks are shared handles: clones observe the same `enabled` flag and
//! the same end-of-track signal, so a track handed to a peer connection
//! and the copy kept by the device controller stay in sync.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use classroom_common::{new_id, MediaError};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
    Remote,
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: TrackKind,
    source: TrackSource,
    label: String,
    enabled: AtomicBool,
    ended: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, source: TrackSource, label: impl Into<String>) -> Self {
        let (ended, _) = watch::channel(false);
        Self {
            inner: Arc::new(TrackInner {
                id: new_id(),
                kind,
                source,
                label: label.into(),
                enabled: AtomicBool::new(true),
                ended,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Mute or unmute without stopping capture.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    /// Stop capture. Ending is permanent.
    pub fn stop(&self) {
        self.inner.ended.send_replace(true);
    }

    pub fn is_ended(&self) -> bool {
        *self.inner.ended.borrow()
    }

    /// Resolves once the track has ended, whether through `stop` or the
    /// platform (e.g. the user pressing the system "stop sharing" button).
    pub async fn ended(&self) {
        let mut rx = self.inner.ended.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }

    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// An ordered set of tracks.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: new_id(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn video_track(&self) -> Option<&MediaTrack> {
        self.video_tracks().next()
    }

    pub fn add_track(&mut self, track: MediaTrack) {
        self.tracks.push(track);
    }

    /// Swap the track with `old`'s id for `new`, keeping its position.
    pub fn replace_track(&mut self, old: &MediaTrack, new: MediaTrack) -> bool {
        match self.tracks.iter_mut().find(|t| t.same_track(old)) {
            Some(slot) => {
                *slot = new;
                true
            }
            None => false,
        }
    }

    pub fn remove_track(&mut self, track: &MediaTrack) -> bool {
        let before = self.tracks.len();
        self.tracks.retain(|t| !t.same_track(track));
        self.tracks.len() != before
    }

    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Camera,
    Microphone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoConstraint {
    Off,
    Any,
    Device(String),
}

/// What to capture from `get_user_media`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: VideoConstraint,
}

impl MediaConstraints {
    pub fn camera_and_microphone() -> Self {
        Self {
            audio: true,
            video: VideoConstraint::Any,
        }
    }

    pub fn camera(device_id: impl Into<String>) -> Self {
        Self {
            audio: false,
            video: VideoConstraint::Device(device_id.into()),
        }
    }
}

/// Platform media stack: device enumeration and capture.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, MediaError>;

    async fn get_user_media(&self, constraints: &MediaConstraints)
        -> Result<MediaStream, MediaError>;

    async fn get_display_media(&self) -> Result<MediaStream, MediaError>;
}

/// Device stack of a host with no capture hardware.
///
/// Only an empty capture (no audio, video off) succeeds, which lets a
/// receive-only participant join with `media.audio = false` and
/// `media.video = false`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDevices;

#[async_trait]
impl MediaDevices for NoDevices {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, MediaError> {
        Ok(Vec::new())
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        if constraints.audio {
            return Err(MediaError::Unavailable("no microphone on this host".into()));
        }
        match &constraints.video {
            VideoConstraint::Off => Ok(MediaStream::default()),
            VideoConstraint::Any => Err(MediaError::Unavailable("no camera on this host".into())),
            VideoConstraint::Device(id) => Err(MediaError::DeviceNotFound(id.clone())),
        }
    }

    async fn get_display_media(&self) -> Result<MediaStream, MediaError> {
        Err(MediaError::Unavailable("screen capture is not supported".into()))
    }
}
