//! Peer connection seam.
//!
//! A `PeerConnector` builds one connection per remote participant. The
//! connection reports local signaling it wants sent, the remote stream and
//! its lifecycle through the returned event receiver.

use async_trait::async_trait;
use classroom_common::{PeerError, Signal};
use tokio::sync::mpsc;

use crate::media::{MediaStream, MediaTrack};

/// Events produced by a peer connection.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// Local offer/answer/candidate to relay to the remote side.
    Signal(Signal),
    /// Remote media arrived.
    Stream(MediaStream),
    Connected,
    Closed,
    Error(String),
}

/// Parameters for a new peer connection.
#[derive(Debug, Clone)]
pub struct PeerOptions {
    pub remote_id: String,
    /// The initiator creates the offer.
    pub initiator: bool,
    /// Tracks to send.
    pub local_stream: MediaStream,
}

#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Feed remote signaling into the connection.
    async fn signal(&self, signal: Signal) -> Result<(), PeerError>;

    /// Swap the outgoing video track in place. Audio is untouched and no
    /// renegotiation is required.
    async fn replace_video_track(&self, track: &MediaTrack) -> Result<(), PeerError>;

    async fn close(&self);
}

#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        options: PeerOptions,
    ) -> Result<(Box<dyn PeerConnection>, mpsc::Receiver<PeerEvent>), PeerError>;
}
