//! Peer connections backed by the `webrtc` crate.
//!
//! Each [`MediaTrack`] is published through one `TrackLocalStaticSample`,
//! shared by every peer connection that sends it. The platform capture
//! layer writes encoded samples into [`WebRtcConnector::sample_track`];
//! this module only wires tracks, signaling and connection state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use classroom_common::{PeerError, Signal};
use classroom_config::ClientConfig;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::media::{MediaStream, MediaTrack, TrackKind, TrackSource};
use crate::peer::{PeerConnection, PeerConnector, PeerEvent, PeerOptions};

type SampleTracks = Arc<Mutex<HashMap<String, Arc<TrackLocalStaticSample>>>>;

fn failed(e: webrtc::Error) -> PeerError {
    PeerError::ConnectionFailed(e.to_string())
}

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Builds `RTCPeerConnection`s with the default codecs and the configured
/// ICE servers.
pub struct WebRtcConnector {
    api: API,
    ice_servers: Vec<String>,
    tracks: SampleTracks,
}

impl WebRtcConnector {
    pub fn new(ice_servers: Vec<String>) -> Result<Self, PeerError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(failed)?;
        let api = APIBuilder::new().with_media_engine(media_engine).build();
        Ok(Self {
            api,
            ice_servers,
            tracks: Arc::default(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, PeerError> {
        Self::new(config.ice_servers.clone())
    }

    /// The sample sink that feeds `track` to every peer sending it.
    pub async fn sample_track(&self, track: &MediaTrack) -> Arc<TrackLocalStaticSample> {
        sample_track(&self.tracks, track).await
    }

    fn configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

async fn sample_track(tracks: &SampleTracks, track: &MediaTrack) -> Arc<TrackLocalStaticSample> {
    let mut tracks = tracks.lock().await;
    tracks
        .entry(track.id().to_string())
        .or_insert_with(|| {
            let mime_type = match track.kind() {
                TrackKind::Audio => MIME_TYPE_OPUS,
                TrackKind::Video => MIME_TYPE_VP8,
            };
            Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: mime_type.to_owned(),
                    ..Default::default()
                },
                track.id().to_string(),
                "classroom".to_owned(),
            ))
        })
        .clone()
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn connect(
        &self,
        options: PeerOptions,
    ) -> Result<(Box<dyn PeerConnection>, mpsc::Receiver<PeerEvent>), PeerError> {
        let (event_tx, event_rx) = mpsc::channel(64);
        let pc = Arc::new(
            self.api
                .new_peer_connection(self.configuration())
                .await
                .map_err(failed)?,
        );

        let mut video_sender = None;
        for track in options.local_stream.tracks() {
            let sample = sample_track(&self.tracks, track).await;
            let sender = pc
                .add_track(sample as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(failed)?;
            if track.kind() == TrackKind::Video {
                video_sender = Some(sender);
            }
        }

        let remote_tracks: Arc<Mutex<Vec<MediaTrack>>> = Arc::default();
        register_handlers(&pc, &options.remote_id, &event_tx, &remote_tracks);

        let peer = WebRtcPeer {
            remote_id: options.remote_id,
            pc,
            video_sender: Mutex::new(video_sender),
            tracks: Arc::clone(&self.tracks),
            remote_tracks,
            event_tx,
        };

        if options.initiator {
            let offer = peer.pc.create_offer(None).await.map_err(failed)?;
            peer.pc
                .set_local_description(offer.clone())
                .await
                .map_err(failed)?;
            debug!(peer = %peer.remote_id, "Offer created");
            peer.emit(PeerEvent::Signal(Signal::Offer { sdp: offer.sdp }))
                .await;
        }

        Ok((Box::new(peer), event_rx))
    }
}

fn register_handlers(
    pc: &RTCPeerConnection,
    remote_id: &str,
    event_tx: &mpsc::Sender<PeerEvent>,
    remote_tracks: &Arc<Mutex<Vec<MediaTrack>>>,
) {
    let tx = event_tx.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let tx = tx.clone();
        Box::pin(async move {
            // `None` marks the end of gathering.
            let Some(candidate) = candidate else { return };
            match candidate.to_json() {
                Ok(init) => {
                    let signal = Signal::IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_m_line_index: init.sdp_mline_index.map(u32::from),
                    };
                    let _ = tx.send(PeerEvent::Signal(signal)).await;
                }
                Err(e) => warn!(error = %e, "Failed to encode ICE candidate"),
            }
        })
    }));

    let tx = event_tx.clone();
    let remote = Arc::clone(remote_tracks);
    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
            let tx = tx.clone();
            let remote = Arc::clone(&remote);
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => return,
                };
                let stream = {
                    let mut tracks = remote.lock().await;
                    tracks.push(MediaTrack::new(kind, TrackSource::Remote, track.id()));
                    MediaStream::new(tracks.clone())
                };
                let _ = tx.send(PeerEvent::Stream(stream)).await;
            })
        },
    ));

    let tx = event_tx.clone();
    let remote_id = remote_id.to_string();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let tx = tx.clone();
        let remote_id = remote_id.clone();
        Box::pin(async move {
            debug!(peer = %remote_id, %state, "Peer connection state changed");
            let event = match state {
                RTCPeerConnectionState::Connected => PeerEvent::Connected,
                RTCPeerConnectionState::Failed => {
                    PeerEvent::Error("ICE negotiation failed".into())
                }
                RTCPeerConnectionState::Closed => PeerEvent::Closed,
                _ => return,
            };
            let _ = tx.send(event).await;
        })
    }));
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

struct WebRtcPeer {
    remote_id: String,
    pc: Arc<RTCPeerConnection>,
    video_sender: Mutex<Option<Arc<RTCRtpSender>>>,
    tracks: SampleTracks,
    remote_tracks: Arc<Mutex<Vec<MediaTrack>>>,
    event_tx: mpsc::Sender<PeerEvent>,
}

impl WebRtcPeer {
    async fn emit(&self, event: PeerEvent) {
        let _ = self.event_tx.send(event).await;
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    async fn signal(&self, signal: Signal) -> Result<(), PeerError> {
        match signal {
            Signal::Offer { sdp } => {
                let offer = RTCSessionDescription::offer(sdp)
                    .map_err(|e| PeerError::InvalidSignal(e.to_string()))?;
                self.pc.set_remote_description(offer).await.map_err(failed)?;
                let answer = self.pc.create_answer(None).await.map_err(failed)?;
                self.pc
                    .set_local_description(answer.clone())
                    .await
                    .map_err(failed)?;
                debug!(peer = %self.remote_id, "Answer created");
                self.emit(PeerEvent::Signal(Signal::Answer { sdp: answer.sdp }))
                    .await;
            }
            Signal::Answer { sdp } => {
                let answer = RTCSessionDescription::answer(sdp)
                    .map_err(|e| PeerError::InvalidSignal(e.to_string()))?;
                self.pc.set_remote_description(answer).await.map_err(failed)?;
            }
            Signal::IceCandidate {
                candidate,
                sdp_mid,
                sdp_m_line_index,
            } => {
                let sdp_mline_index = sdp_m_line_index
                    .map(u16::try_from)
                    .transpose()
                    .map_err(|_| PeerError::InvalidSignal("m-line index out of range".into()))?;
                self.pc
                    .add_ice_candidate(RTCIceCandidateInit {
                        candidate,
                        sdp_mid,
                        sdp_mline_index,
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| PeerError::InvalidSignal(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn replace_video_track(&self, track: &MediaTrack) -> Result<(), PeerError> {
        let sender = self.video_sender.lock().await;
        let Some(sender) = sender.as_ref() else {
            return Err(PeerError::ReplaceTrack(
                "connection was opened without a video sender".into(),
            ));
        };
        let sample = sample_track(&self.tracks, track).await;
        sender
            .replace_track(Some(sample as Arc<dyn TrackLocal + Send + Sync>))
            .await
            .map_err(|e| PeerError::ReplaceTrack(e.to_string()))
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            warn!(peer = %self.remote_id, error = %e, "Peer close failed");
        }
        for track in self.remote_tracks.lock().await.iter() {
            track.stop();
        }
        info!(peer = %self.remote_id, "Peer connection closed");
    }
}
