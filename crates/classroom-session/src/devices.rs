//! Local device controller: capture, mute/video-off, screen share and
//! camera switching.

use std::sync::Arc;

use classroom_common::MediaError;
use tracing::{debug, info, warn};

use crate::media::{
    DeviceInfo, DeviceKind, MediaConstraints, MediaDevices, MediaStream, MediaTrack,
};
use crate::peer::PeerConnection;

// ---------------------------------------------------------------------------
// Device Controller
// ---------------------------------------------------------------------------

/// Owns the local stream and decides which video track goes out.
///
/// While a screen share is active the camera track is kept (still
/// capturing) so it can be restored when sharing ends.
pub struct DeviceController {
    devices: Arc<dyn MediaDevices>,
    local: Option<MediaStream>,
    camera: Option<MediaTrack>,
    screen: Option<MediaTrack>,
    muted: bool,
    video_off: bool,
}

impl DeviceController {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            local: None,
            camera: None,
            screen: None,
            muted: false,
            video_off: false,
        }
    }

    /// Video input devices only.
    pub async fn list_cameras(&self) -> Result<Vec<DeviceInfo>, MediaError> {
        let devices = self.devices.enumerate_devices().await?;
        Ok(devices
            .into_iter()
            .filter(|d| d.kind == DeviceKind::Camera)
            .collect())
    }

    /// Capture the local stream. Replaces any previous capture.
    pub async fn acquire(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        let stream = self.devices.get_user_media(constraints).await?;
        if let Some(old) = self.local.take() {
            old.stop();
        }
        // During a share the camera is held outside the local stream.
        for held in [self.camera.take(), self.screen.take()].into_iter().flatten() {
            held.stop();
        }
        self.camera = stream.video_track().cloned();
        self.muted = false;
        self.video_off = false;
        info!(
            tracks = stream.tracks().len(),
            camera = ?self.camera.as_ref().map(MediaTrack::label),
            "Local media acquired"
        );
        self.local = Some(stream.clone());
        Ok(stream)
    }

    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.local.as_ref()
    }

    /// The video track currently sent to peers.
    pub fn outgoing_video(&self) -> Option<&MediaTrack> {
        self.screen.as_ref().or(self.camera.as_ref())
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_video_off(&self) -> bool {
        self.video_off
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.screen.is_some()
    }

    pub fn screen_track(&self) -> Option<&MediaTrack> {
        self.screen.as_ref()
    }

    // -- Mute / video-off ---------------------------------------------------

    /// Flip the `enabled` flag on every local audio track.
    pub fn set_muted(&mut self, muted: bool) -> Result<(), MediaError> {
        let stream = self.local.as_ref().ok_or(MediaError::NoLocalStream)?;
        let mut found = false;
        for track in stream.audio_tracks() {
            track.set_enabled(!muted);
            found = true;
        }
        if !found {
            return Err(MediaError::MissingTrack("audio"));
        }
        self.muted = muted;
        debug!(muted, "Local audio toggled");
        Ok(())
    }

    /// Returns the new muted state.
    pub fn toggle_audio(&mut self) -> Result<bool, MediaError> {
        self.set_muted(!self.muted)?;
        Ok(self.muted)
    }

    /// Flip the `enabled` flag on the camera track. A screen share in
    /// progress keeps sending.
    pub fn set_video_off(&mut self, off: bool) -> Result<(), MediaError> {
        if self.local.is_none() {
            return Err(MediaError::NoLocalStream);
        }
        let camera = self.camera.as_ref().ok_or(MediaError::MissingTrack("video"))?;
        camera.set_enabled(!off);
        self.video_off = off;
        debug!(video_off = off, "Local video toggled");
        Ok(())
    }

    /// Returns the new video-off state.
    pub fn toggle_video(&mut self) -> Result<bool, MediaError> {
        self.set_video_off(!self.video_off)?;
        Ok(self.video_off)
    }

    // -- Screen share -------------------------------------------------------

    /// Capture the display and send it instead of the camera on every
    /// peer. Audio senders are untouched.
    pub async fn start_screen_share(
        &mut self,
        peers: &[&dyn PeerConnection],
    ) -> Result<MediaTrack, MediaError> {
        if let Some(screen) = &self.screen {
            return Ok(screen.clone());
        }
        let local = self.local.as_mut().ok_or(MediaError::NoLocalStream)?;

        let display = self.devices.get_display_media().await?;
        let screen = display
            .video_track()
            .cloned()
            .ok_or(MediaError::MissingTrack("video"))?;

        replace_on_peers(peers, &screen).await;
        match &self.camera {
            Some(camera) => {
                local.replace_track(camera, screen.clone());
            }
            None => local.add_track(screen.clone()),
        }

        info!(peers = peers.len(), label = screen.label(), "Screen share started");
        self.screen = Some(screen.clone());
        Ok(screen)
    }

    /// Stop the display capture and restore the camera on every peer.
    /// Returns `false` when no share was active.
    pub async fn stop_screen_share(&mut self, peers: &[&dyn PeerConnection]) -> bool {
        let Some(screen) = self.screen.take() else {
            return false;
        };
        screen.stop();

        if let Some(local) = self.local.as_mut() {
            match &self.camera {
                Some(camera) => {
                    replace_on_peers(peers, camera).await;
                    local.replace_track(&screen, camera.clone());
                }
                None => {
                    local.remove_track(&screen);
                }
            }
        }

        info!(peers = peers.len(), "Screen share stopped");
        true
    }

    // -- Camera switch ------------------------------------------------------

    /// Capture `device_id` and make it the camera track. When a screen
    /// share is active the new camera is held back until sharing stops.
    pub async fn switch_camera(
        &mut self,
        device_id: &str,
        peers: &[&dyn PeerConnection],
    ) -> Result<MediaTrack, MediaError> {
        if self.local.is_none() {
            return Err(MediaError::NoLocalStream);
        }

        let stream = self
            .devices
            .get_user_media(&MediaConstraints::camera(device_id))
            .await?;
        let camera = stream
            .video_track()
            .cloned()
            .ok_or(MediaError::MissingTrack("video"))?;
        camera.set_enabled(!self.video_off);

        let sharing = self.screen.is_some();
        if !sharing {
            replace_on_peers(peers, &camera).await;
        }

        let old = self.camera.replace(camera.clone());
        if let Some(local) = self.local.as_mut() {
            match (&old, sharing) {
                (Some(old), false) => {
                    local.replace_track(old, camera.clone());
                }
                (None, false) => local.add_track(camera.clone()),
                (_, true) => {}
            }
        }
        if let Some(old) = old {
            old.stop();
        }

        info!(device_id, label = camera.label(), "Camera switched");
        Ok(camera)
    }

    /// Stop every local track.
    pub fn stop_all(&mut self) {
        if let Some(local) = self.local.take() {
            local.stop();
        }
        if let Some(camera) = self.camera.take() {
            camera.stop();
        }
        if let Some(screen) = self.screen.take() {
            screen.stop();
        }
    }
}

/// Replace the outgoing video track on each peer. A failing peer is
/// logged and skipped.
async fn replace_on_peers(peers: &[&dyn PeerConnection], track: &MediaTrack) {
    for peer in peers {
        if let Err(e) = peer.replace_video_track(track).await {
            warn!(error = %e, track = track.id(), "Video track replacement failed");
        }
    }
}
