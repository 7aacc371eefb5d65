//! Client side of a classroom: local devices, peer connections and the
//! relay signaling connection.

pub mod devices;
pub mod media;
pub mod peer;
#[cfg(feature = "webrtc")]
pub mod rtc;
pub mod session;
pub mod signaling;

#[cfg(test)]
pub(crate) mod test_support;

pub use devices::DeviceController;
pub use media::{
    DeviceInfo, DeviceKind, MediaConstraints, MediaDevices, MediaStream, MediaTrack, NoDevices,
    TrackKind, TrackSource, VideoConstraint,
};
pub use peer::{PeerConnection, PeerConnector, PeerEvent, PeerOptions};
#[cfg(feature = "webrtc")]
pub use rtc::WebRtcConnector;
pub use session::{acquire_local_media, ClassroomEvent, ClassroomSession, JoinOptions, Participant};
pub use signaling::{SignalingClient, SignalingConfig, SignalingEvent};
