//! Classroom session: public handle plus the actor that owns the peer table
//! and the local devices.

use std::collections::HashMap;
use std::sync::Arc;

use classroom_common::{
    ClassroomError, ClientMessage, MediaError, MemberInfo, ServerMessage, Signal,
};
use classroom_config::MediaConfig;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::devices::DeviceController;
use crate::media::{
    DeviceInfo, MediaConstraints, MediaDevices, MediaTrack, VideoConstraint,
};
use crate::peer::{PeerConnection, PeerConnector, PeerEvent, PeerOptions};
use crate::signaling::{SignalingClient, SignalingEvent};

use super::types::{
    ClassroomEvent, Inbox, JoinOptions, Participant, PeerSession, SessionCommand,
};

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a joined classroom.
///
/// Every method forwards to the background actor. Dropping the last handle
/// leaves the room.
pub struct ClassroomSession {
    command_tx: mpsc::Sender<SessionCommand>,
    room_id: String,
    user_id: String,
}

impl ClassroomSession {
    /// Capture local media, connect to the relay and join the room.
    ///
    /// Fails without touching the network when media capture fails.
    pub async fn join(
        options: JoinOptions,
        devices: Arc<dyn MediaDevices>,
        connector: Arc<dyn PeerConnector>,
    ) -> Result<(Self, mpsc::Receiver<ClassroomEvent>), ClassroomError> {
        let controller = acquire_local_media(&options.media, devices).await?;
        let (signaling, signal_rx) = SignalingClient::connect(options.signaling.clone());
        Self::start(options, controller, signaling, signal_rx, connector).await
    }

    /// Join over an existing signaling client with media already captured.
    pub async fn start(
        options: JoinOptions,
        devices: DeviceController,
        signaling: SignalingClient,
        signal_rx: mpsc::Receiver<SignalingEvent>,
        connector: Arc<dyn PeerConnector>,
    ) -> Result<(Self, mpsc::Receiver<ClassroomEvent>), ClassroomError> {
        signaling
            .join(&options.room_id, &options.user_id, &options.user_name)
            .await?;

        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);
        let (inbox_tx, inbox_rx) = mpsc::channel(256);

        info!(room = %options.room_id, user = %options.user_id, "Joining classroom");

        let actor = SessionActor {
            room_id: options.room_id.clone(),
            user_id: options.user_id.clone(),
            devices,
            connector,
            signaling,
            peers: HashMap::new(),
            roster: HashMap::new(),
            event_tx,
            inbox_tx,
            generation: 0,
            has_connected: false,
        };
        tokio::spawn(actor.run(command_rx, signal_rx, inbox_rx));

        let session = Self {
            command_tx,
            room_id: options.room_id,
            user_id: options.user_id,
        };
        Ok((session, event_rx))
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the new muted state.
    pub async fn toggle_audio(&self) -> Result<bool, ClassroomError> {
        self.request(SessionCommand::ToggleAudio).await?
    }

    /// Returns the new video-off state.
    pub async fn toggle_video(&self) -> Result<bool, ClassroomError> {
        self.request(SessionCommand::ToggleVideo).await?
    }

    pub async fn start_screen_share(&self) -> Result<(), ClassroomError> {
        self.request(SessionCommand::StartScreenShare).await?
    }

    pub async fn stop_screen_share(&self) -> Result<(), ClassroomError> {
        self.request(SessionCommand::StopScreenShare).await?
    }

    pub async fn switch_camera(&self, device_id: &str) -> Result<(), ClassroomError> {
        let device_id = device_id.to_string();
        self.request(|reply| SessionCommand::SwitchCamera { device_id, reply })
            .await?
    }

    pub async fn list_cameras(&self) -> Result<Vec<DeviceInfo>, ClassroomError> {
        self.request(SessionCommand::ListCameras).await?
    }

    pub async fn participants(&self) -> Result<Vec<Participant>, ClassroomError> {
        self.request(SessionCommand::Participants).await
    }

    pub async fn draw(&self, payload: serde_json::Value) -> Result<(), ClassroomError> {
        self.relay(ClientMessage::Draw { payload }).await
    }

    pub async fn send_chat(&self, payload: serde_json::Value) -> Result<(), ClassroomError> {
        self.relay(ClientMessage::ChatMessage { payload }).await
    }

    pub async fn send_chat_file(&self, payload: serde_json::Value) -> Result<(), ClassroomError> {
        self.relay(ClientMessage::ChatFile { payload }).await
    }

    pub async fn clear_whiteboard(&self) -> Result<(), ClassroomError> {
        self.relay(ClientMessage::ClearWhiteboard).await
    }

    pub async fn share_file(&self, payload: serde_json::Value) -> Result<(), ClassroomError> {
        self.relay(ClientMessage::ShareFile { payload }).await
    }

    pub async fn delete_file(&self, payload: serde_json::Value) -> Result<(), ClassroomError> {
        self.relay(ClientMessage::DeleteFile { payload }).await
    }

    /// Close every peer, stop local tracks and leave the room.
    pub async fn leave(self) -> Result<(), ClassroomError> {
        self.request(SessionCommand::Leave).await
    }

    async fn relay(&self, msg: ClientMessage) -> Result<(), ClassroomError> {
        self.request(|reply| SessionCommand::Relay(msg, reply)).await?
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, ClassroomError> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(make(tx))
            .await
            .map_err(|_| ClassroomError::SessionClosed)?;
        rx.await.map_err(|_| ClassroomError::SessionClosed)
    }
}

/// Capture local media according to `media` and apply the start-muted /
/// start-video-off defaults.
pub async fn acquire_local_media(
    media: &MediaConfig,
    devices: Arc<dyn MediaDevices>,
) -> Result<DeviceController, MediaError> {
    let video = match (media.video, &media.camera_device) {
        (false, _) => VideoConstraint::Off,
        (true, Some(id)) => VideoConstraint::Device(id.clone()),
        (true, None) => VideoConstraint::Any,
    };
    let mut controller = DeviceController::new(devices);
    controller
        .acquire(&MediaConstraints {
            audio: media.audio,
            video,
        })
        .await?;

    if media.start_muted && media.audio {
        controller.set_muted(true)?;
    }
    if media.start_video_off && media.video {
        controller.set_video_off(true)?;
    }
    Ok(controller)
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct SessionActor {
    room_id: String,
    user_id: String,
    devices: DeviceController,
    connector: Arc<dyn PeerConnector>,
    signaling: SignalingClient,
    /// remote user_id → live peer connection.
    peers: HashMap<String, PeerSession>,
    /// remote user_id → last known member info.
    roster: HashMap<String, MemberInfo>,
    event_tx: mpsc::Sender<ClassroomEvent>,
    inbox_tx: mpsc::Sender<Inbox>,
    generation: u64,
    has_connected: bool,
}

impl SessionActor {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<SessionCommand>,
        mut signal_rx: mpsc::Receiver<SignalingEvent>,
        mut inbox_rx: mpsc::Receiver<Inbox>,
    ) {
        let mut signaling_open = true;

        loop {
            tokio::select! {
                cmd = command_rx.recv() => match cmd {
                    Some(SessionCommand::Leave(done)) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        return;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        self.shutdown().await;
                        return;
                    }
                },

                event = signal_rx.recv(), if signaling_open => match event {
                    Some(event) => self.handle_signaling(event).await,
                    None => {
                        warn!(room = %self.room_id, "Signaling task ended");
                        signaling_open = false;
                    }
                },

                Some(msg) = inbox_rx.recv() => self.handle_inbox(msg).await,
            }
        }
    }

    async fn emit(&self, event: ClassroomEvent) {
        let _ = self.event_tx.send(event).await;
    }

    async fn send_to_relay(&self, msg: ClientMessage) {
        if let Err(e) = self.signaling.send(msg).await {
            warn!(error = %e, "Failed to queue message for relay");
        }
    }

    /// Surface a device failure as a toast and hand it back to the caller.
    async fn media_failure(&self, err: MediaError) -> ClassroomError {
        warn!(error = %err, "Media operation failed");
        self.emit(ClassroomEvent::Error(err.to_string())).await;
        err.into()
    }

    // -- Commands -----------------------------------------------------------

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::ToggleAudio(reply) => {
                let result = match self.devices.toggle_audio() {
                    Ok(is_muted) => {
                        self.send_to_relay(ClientMessage::ToggleAudio { is_muted })
                            .await;
                        self.emit(ClassroomEvent::LocalAudio { is_muted }).await;
                        Ok(is_muted)
                    }
                    Err(e) => Err(self.media_failure(e).await),
                };
                let _ = reply.send(result);
            }
            SessionCommand::ToggleVideo(reply) => {
                let result = match self.devices.toggle_video() {
                    Ok(is_video_off) => {
                        self.send_to_relay(ClientMessage::ToggleVideo { is_video_off })
                            .await;
                        self.emit(ClassroomEvent::LocalVideo { is_video_off }).await;
                        Ok(is_video_off)
                    }
                    Err(e) => Err(self.media_failure(e).await),
                };
                let _ = reply.send(result);
            }
            SessionCommand::StartScreenShare(reply) => {
                let _ = reply.send(self.start_screen_share().await);
            }
            SessionCommand::StopScreenShare(reply) => {
                self.stop_screen_share().await;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::SwitchCamera { device_id, reply } => {
                let conns: Vec<&dyn PeerConnection> =
                    self.peers.values().map(|p| p.connection.as_ref()).collect();
                let result = self.devices.switch_camera(&device_id, &conns).await;
                let result = match result {
                    Ok(_) => Ok(()),
                    Err(e) => Err(self.media_failure(e).await),
                };
                let _ = reply.send(result);
            }
            SessionCommand::ListCameras(reply) => {
                let result = match self.devices.list_cameras().await {
                    Ok(cameras) => Ok(cameras),
                    Err(e) => Err(self.media_failure(e).await),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Participants(reply) => {
                let _ = reply.send(self.participants());
            }
            SessionCommand::Relay(msg, reply) => {
                let result = self.signaling.send(msg).await.map_err(Into::into);
                let _ = reply.send(result);
            }
            SessionCommand::Leave(done) => {
                // Handled in `run`.
                let _ = done.send(());
            }
        }
    }

    async fn start_screen_share(&mut self) -> Result<(), ClassroomError> {
        if self.devices.is_screen_sharing() {
            return Ok(());
        }
        let conns: Vec<&dyn PeerConnection> =
            self.peers.values().map(|p| p.connection.as_ref()).collect();
        match self.devices.start_screen_share(&conns).await {
            Ok(track) => {
                self.watch_screen_track(track);
                self.emit(ClassroomEvent::ScreenShareStarted).await;
                Ok(())
            }
            Err(e) => Err(self.media_failure(e).await),
        }
    }

    async fn stop_screen_share(&mut self) {
        let conns: Vec<&dyn PeerConnection> =
            self.peers.values().map(|p| p.connection.as_ref()).collect();
        if self.devices.stop_screen_share(&conns).await {
            self.emit(ClassroomEvent::ScreenShareStopped).await;
        }
    }

    /// Notify the actor when the platform ends the screen capture.
    fn watch_screen_track(&self, track: MediaTrack) {
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            track.ended().await;
            let _ = inbox
                .send(Inbox::ScreenShareEnded {
                    track_id: track.id().to_string(),
                })
                .await;
        });
    }

    fn participants(&self) -> Vec<Participant> {
        let mut list: Vec<Participant> = self
            .roster
            .values()
            .map(|member| {
                let peer = self.peers.get(&member.user_id);
                Participant {
                    user_id: member.user_id.clone(),
                    user_name: member.user_name.clone(),
                    is_muted: member.is_muted,
                    is_video_off: member.is_video_off,
                    stream: peer.and_then(|p| p.remote_stream.clone()),
                    connected: peer.is_some_and(|p| p.connected),
                }
            })
            .collect();
        list.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        list
    }

    // -- Signaling ----------------------------------------------------------

    async fn handle_signaling(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Connected => {
                if self.has_connected {
                    info!(room = %self.room_id, peers = self.peers.len(), "Reconnected, resetting peers");
                    self.close_all_peers().await;
                }
                self.has_connected = true;
                self.emit(ClassroomEvent::Connected).await;
                self.resend_local_state().await;
            }
            SignalingEvent::Disconnected => {
                self.emit(ClassroomEvent::Disconnected).await;
            }
            SignalingEvent::Error(message) => {
                self.emit(ClassroomEvent::Error(message)).await;
            }
            SignalingEvent::Message(msg) => self.handle_server(msg).await,
        }
    }

    /// The relay only knows flags it was told on this connection.
    async fn resend_local_state(&self) {
        if self.devices.is_muted() {
            self.send_to_relay(ClientMessage::ToggleAudio { is_muted: true })
                .await;
        }
        if self.devices.is_video_off() {
            self.send_to_relay(ClientMessage::ToggleVideo { is_video_off: true })
                .await;
        }
    }

    async fn handle_server(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::RoomJoined {
                room_id, members, ..
            } => {
                self.roster = members
                    .into_iter()
                    .filter(|m| m.user_id != self.user_id)
                    .map(|m| (m.user_id.clone(), m))
                    .collect();
                info!(room = %room_id, members = self.roster.len(), "Joined room");
                let participants = self.participants();
                self.emit(ClassroomEvent::RoomJoined {
                    room_id,
                    participants,
                })
                .await;
            }
            ServerMessage::UserJoined { user_id, user_name } => {
                if user_id == self.user_id {
                    debug!(user = %user_id, "Ignoring own user-joined");
                    return;
                }
                info!(user = %user_id, name = %user_name, "Participant joined");
                self.roster.insert(
                    user_id.clone(),
                    MemberInfo {
                        user_id: user_id.clone(),
                        user_name: user_name.clone(),
                        is_muted: false,
                        is_video_off: false,
                    },
                );
                self.open_peer(&user_id, true).await;
                self.emit(ClassroomEvent::ParticipantJoined { user_id, user_name })
                    .await;
            }
            ServerMessage::UserLeft { user_id } => {
                info!(user = %user_id, "Participant left");
                self.roster.remove(&user_id);
                if let Some(peer) = self.peers.remove(&user_id) {
                    peer.close().await;
                }
                self.emit(ClassroomEvent::ParticipantLeft { user_id }).await;
            }
            ServerMessage::ReceivingSignal { from, signal } => {
                self.handle_remote_signal(from, signal).await;
            }
            ServerMessage::UserToggleAudio { user_id, is_muted } => {
                if let Some(member) = self.roster.get_mut(&user_id) {
                    member.is_muted = is_muted;
                }
                self.emit(ClassroomEvent::ParticipantAudio { user_id, is_muted })
                    .await;
            }
            ServerMessage::UserToggleVideo {
                user_id,
                is_video_off,
            } => {
                if let Some(member) = self.roster.get_mut(&user_id) {
                    member.is_video_off = is_video_off;
                }
                self.emit(ClassroomEvent::ParticipantVideo {
                    user_id,
                    is_video_off,
                })
                .await;
            }
            ServerMessage::Draw { from, payload } => {
                self.emit(ClassroomEvent::Draw { from, payload }).await;
            }
            ServerMessage::ChatMessage { from, payload } => {
                self.emit(ClassroomEvent::ChatMessage { from, payload }).await;
            }
            ServerMessage::ChatFile { from, payload } => {
                self.emit(ClassroomEvent::ChatFile { from, payload }).await;
            }
            ServerMessage::ClearWhiteboard { from } => {
                self.emit(ClassroomEvent::WhiteboardCleared { from }).await;
            }
            ServerMessage::ShareFile { from, payload } => {
                self.emit(ClassroomEvent::FileShared { from, payload }).await;
            }
            ServerMessage::DeleteFile { from, payload } => {
                self.emit(ClassroomEvent::FileDeleted { from, payload }).await;
            }
            ServerMessage::Error { message } => {
                warn!(room = %self.room_id, error = %message, "Relay reported error");
                self.emit(ClassroomEvent::Error(message)).await;
            }
        }
    }

    async fn handle_remote_signal(&mut self, from: String, signal: Signal) {
        if !self.peers.contains_key(&from) {
            if !signal.is_offer() {
                debug!(peer = %from, kind = signal.kind(), "Dropping signal for unknown peer");
                return;
            }
            // Newcomer side: an existing member is calling us.
            self.roster.entry(from.clone()).or_insert_with(|| MemberInfo {
                user_id: from.clone(),
                user_name: from.clone(),
                is_muted: false,
                is_video_off: false,
            });
            if !self.open_peer(&from, false).await {
                return;
            }
        }

        let Some(peer) = self.peers.get(&from) else {
            return;
        };
        let kind = signal.kind();
        if let Err(e) = peer.connection.signal(signal).await {
            warn!(peer = %from, kind, error = %e, "Peer rejected signal");
            self.emit(ClassroomEvent::Error(format!("peer {from}: {e}")))
                .await;
        }
    }

    // -- Peers --------------------------------------------------------------

    /// Create a peer connection to `remote_id`, replacing any existing one.
    async fn open_peer(&mut self, remote_id: &str, initiator: bool) -> bool {
        if let Some(stale) = self.peers.remove(remote_id) {
            info!(peer = %remote_id, "Replacing stale peer connection");
            stale.close().await;
        }

        let options = PeerOptions {
            remote_id: remote_id.to_string(),
            initiator,
            local_stream: self.devices.local_stream().cloned().unwrap_or_default(),
        };
        let (connection, mut events) = match self.connector.connect(options).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(peer = %remote_id, error = %e, "Failed to create peer connection");
                self.emit(ClassroomEvent::Error(format!("peer {remote_id}: {e}")))
                    .await;
                return false;
            }
        };

        self.generation += 1;
        let generation = self.generation;
        let inbox = self.inbox_tx.clone();
        let id = remote_id.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let msg = Inbox::Peer {
                    remote_id: id.clone(),
                    generation,
                    event,
                };
                if inbox.send(msg).await.is_err() {
                    break;
                }
            }
        });

        self.peers.insert(
            remote_id.to_string(),
            PeerSession {
                connection,
                initiator,
                generation,
                remote_stream: None,
                connected: false,
                forwarder,
            },
        );
        debug!(peer = %remote_id, initiator, generation, "Peer connection created");
        true
    }

    async fn close_all_peers(&mut self) {
        let peers: Vec<(String, PeerSession)> = self.peers.drain().collect();
        for (user_id, peer) in peers {
            debug!(peer = %user_id, initiator = peer.initiator, "Closing peer");
            peer.close().await;
            self.emit(ClassroomEvent::PeerClosed { user_id }).await;
        }
    }

    async fn handle_inbox(&mut self, msg: Inbox) {
        match msg {
            Inbox::Peer {
                remote_id,
                generation,
                event,
            } => self.handle_peer_event(remote_id, generation, event).await,
            Inbox::ScreenShareEnded { track_id } => {
                let current = self
                    .devices
                    .screen_track()
                    .is_some_and(|t| t.id() == track_id);
                if current {
                    info!("Screen share ended by platform");
                    self.stop_screen_share().await;
                }
            }
        }
    }

    async fn handle_peer_event(&mut self, remote_id: String, generation: u64, event: PeerEvent) {
        let Some(peer) = self.peers.get_mut(&remote_id) else {
            debug!(peer = %remote_id, "Event for closed peer");
            return;
        };
        if peer.generation != generation {
            debug!(peer = %remote_id, generation, "Event from replaced peer");
            return;
        }

        match event {
            PeerEvent::Signal(signal) => {
                self.send_to_relay(ClientMessage::SendingSignal {
                    target: remote_id,
                    signal,
                })
                .await;
            }
            PeerEvent::Stream(stream) => {
                peer.remote_stream = Some(stream.clone());
                debug!(peer = %remote_id, tracks = stream.tracks().len(), "Remote stream attached");
                self.emit(ClassroomEvent::RemoteStream {
                    user_id: remote_id,
                    stream,
                })
                .await;
            }
            PeerEvent::Connected => {
                peer.connected = true;
                info!(peer = %remote_id, "Peer connected");
                self.emit(ClassroomEvent::PeerConnected { user_id: remote_id })
                    .await;
            }
            PeerEvent::Closed => {
                if let Some(peer) = self.peers.remove(&remote_id) {
                    peer.close().await;
                }
                info!(peer = %remote_id, "Peer closed");
                self.emit(ClassroomEvent::PeerClosed { user_id: remote_id })
                    .await;
            }
            PeerEvent::Error(e) => {
                warn!(peer = %remote_id, error = %e, "Peer error");
                self.emit(ClassroomEvent::Error(format!("peer {remote_id}: {e}")))
                    .await;
            }
        }
    }

    async fn shutdown(&mut self) {
        self.close_all_peers().await;
        self.devices.stop_all();
        let _ = self.signaling.leave().await;
        self.signaling.disconnect().await;
        info!(room = %self.room_id, user = %self.user_id, "Left classroom");
        self.emit(ClassroomEvent::Left).await;
    }
}
