//! In-memory media devices and peer connections for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use classroom_common::{MediaError, PeerError, Signal};
use tokio::sync::mpsc;

use crate::media::{
    DeviceInfo, DeviceKind, MediaConstraints, MediaDevices, MediaStream, MediaTrack, TrackKind,
    TrackSource, VideoConstraint,
};
use crate::peer::{PeerConnection, PeerConnector, PeerEvent, PeerOptions};

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

pub(crate) struct FakeDevices {
    pub cameras: Vec<DeviceInfo>,
    pub deny_user_media: AtomicBool,
    pub deny_display: AtomicBool,
    pub screen_tracks: Mutex<Vec<MediaTrack>>,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self {
            cameras: vec![
                DeviceInfo {
                    device_id: "cam-front".into(),
                    label: "FaceTime HD Camera".into(),
                    kind: DeviceKind::Camera,
                },
                DeviceInfo {
                    device_id: "cam-usb".into(),
                    label: "USB Document Camera".into(),
                    kind: DeviceKind::Camera,
                },
            ],
            deny_user_media: AtomicBool::new(false),
            deny_display: AtomicBool::new(false),
            screen_tracks: Mutex::new(Vec::new()),
        }
    }

    pub fn last_screen_track(&self) -> Option<MediaTrack> {
        self.screen_tracks.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, MediaError> {
        let mut devices = self.cameras.clone();
        devices.push(DeviceInfo {
            device_id: "mic-default".into(),
            label: "Built-in Microphone".into(),
            kind: DeviceKind::Microphone,
        });
        Ok(devices)
    }

    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        if self.deny_user_media.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("camera".into()));
        }
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(
                TrackKind::Audio,
                TrackSource::Microphone,
                "Built-in Microphone",
            ));
        }
        match &constraints.video {
            VideoConstraint::Off => {}
            VideoConstraint::Any => {
                tracks.push(MediaTrack::new(
                    TrackKind::Video,
                    TrackSource::Camera,
                    self.cameras[0].label.clone(),
                ));
            }
            VideoConstraint::Device(id) => {
                let camera = self
                    .cameras
                    .iter()
                    .find(|c| &c.device_id == id)
                    .ok_or_else(|| MediaError::DeviceNotFound(id.clone()))?;
                tracks.push(MediaTrack::new(
                    TrackKind::Video,
                    TrackSource::Camera,
                    camera.label.clone(),
                ));
            }
        }
        Ok(MediaStream::new(tracks))
    }

    async fn get_display_media(&self) -> Result<MediaStream, MediaError> {
        if self.deny_display.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied("screen".into()));
        }
        let track = MediaTrack::new(TrackKind::Video, TrackSource::Screen, "Entire screen");
        self.screen_tracks.lock().unwrap().push(track.clone());
        Ok(MediaStream::new(vec![track]))
    }
}

// ---------------------------------------------------------------------------
// Peers
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakePeerState {
    pub signals: Mutex<Vec<Signal>>,
    pub video: Mutex<Option<MediaTrack>>,
    pub closed: AtomicBool,
}

impl FakePeerState {
    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }

    pub fn video(&self) -> Option<MediaTrack> {
        self.video.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakePeer {
    state: Arc<FakePeerState>,
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn signal(&self, signal: Signal) -> Result<(), PeerError> {
        self.state.signals.lock().unwrap().push(signal);
        Ok(())
    }

    async fn replace_video_track(&self, track: &MediaTrack) -> Result<(), PeerError> {
        *self.state.video.lock().unwrap() = Some(track.clone());
        Ok(())
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub(crate) struct CreatedPeer {
    pub remote_id: String,
    pub initiator: bool,
    pub local_stream: MediaStream,
    pub state: Arc<FakePeerState>,
    pub events: mpsc::Sender<PeerEvent>,
}

#[derive(Default)]
pub(crate) struct FakeConnector {
    created: Mutex<Vec<CreatedPeer>>,
}

impl FakeConnector {
    pub fn created(&self) -> Vec<CreatedPeer> {
        self.created.lock().unwrap().clone()
    }

    pub fn latest_for(&self, remote_id: &str) -> Option<CreatedPeer> {
        self.created()
            .into_iter()
            .rev()
            .find(|p| p.remote_id == remote_id)
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(
        &self,
        options: PeerOptions,
    ) -> Result<(Box<dyn PeerConnection>, mpsc::Receiver<PeerEvent>), PeerError> {
        let (events, rx) = mpsc::channel(16);
        let state = Arc::new(FakePeerState::default());
        *state.video.lock().unwrap() = options.local_stream.video_track().cloned();
        self.created.lock().unwrap().push(CreatedPeer {
            remote_id: options.remote_id,
            initiator: options.initiator,
            local_stream: options.local_stream,
            state: Arc::clone(&state),
            events,
        });
        Ok((Box::new(FakePeer { state }), rx))
    }
}
