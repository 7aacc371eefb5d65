//! Event relay: validates client frames and fans them out through the registry.
//!
//! Payloads are never inspected. Delivery is best-effort: a full or closed
//! outbound queue drops the frame for that recipient only.

use classroom_common::{ClientMessage, ServerMessage};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::registry::{ConnectionId, Departure, JoinOutcome, Outbound, RoomRegistry};

#[derive(Clone, Default)]
pub struct Relay {
    registry: RoomRegistry,
}

impl Relay {
    pub fn new(registry: RoomRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Parse and dispatch one text frame. Rejections are answered on `tx`.
    pub async fn handle_text(&self, conn: ConnectionId, tx: &Outbound, text: &str) {
        let result = match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.dispatch(conn, tx, msg).await,
            Err(e) => Err(RelayError::Malformed(e.to_string())),
        };
        if let Err(e) = result {
            debug!(conn = %conn, error = %e, "Rejected client frame");
            reply(tx, &ServerMessage::error(e.to_string()));
        }
    }

    /// Dispatch a validated message from `conn`.
    pub async fn dispatch(
        &self,
        conn: ConnectionId,
        tx: &Outbound,
        msg: ClientMessage,
    ) -> Result<(), RelayError> {
        match msg {
            ClientMessage::JoinRoom {
                room_id,
                user_id,
                user_name,
            } => {
                self.join(conn, tx, room_id, user_id, user_name).await;
                Ok(())
            }
            ClientMessage::LeaveRoom => {
                match self.registry.leave(conn).await {
                    Some(departure) => announce_departure(&departure),
                    None => debug!(conn = %conn, "leave-room outside of a room"),
                }
                Ok(())
            }
            ClientMessage::SendingSignal { target, signal } => {
                match self.registry.route(conn, &target).await? {
                    Some(route) => {
                        debug!(
                            conn = %conn,
                            target = %route.target,
                            kind = signal.kind(),
                            "Routing signal"
                        );
                        let msg = ServerMessage::ReceivingSignal {
                            from: route.from_user,
                            signal,
                        };
                        deliver(&[route.tx], &msg);
                    }
                    None => {
                        debug!(conn = %conn, target = %target, "Signal target not in room, dropped");
                    }
                }
                Ok(())
            }
            ClientMessage::ToggleAudio { is_muted } => {
                let broadcast = self.registry.set_muted(conn, is_muted).await?;
                let msg = ServerMessage::UserToggleAudio {
                    user_id: broadcast.user_id,
                    is_muted,
                };
                deliver(&broadcast.peers, &msg);
                Ok(())
            }
            ClientMessage::ToggleVideo { is_video_off } => {
                let broadcast = self.registry.set_video_off(conn, is_video_off).await?;
                let msg = ServerMessage::UserToggleVideo {
                    user_id: broadcast.user_id,
                    is_video_off,
                };
                deliver(&broadcast.peers, &msg);
                Ok(())
            }
            other => {
                let broadcast = self.registry.broadcast_from(conn).await?;
                let event = other.event_name();
                let msg = room_event(broadcast.user_id, other);
                debug!(
                    conn = %conn,
                    room = %broadcast.room_id,
                    event,
                    recipients = broadcast.peers.len(),
                    "Relaying room event"
                );
                deliver(&broadcast.peers, &msg);
                Ok(())
            }
        }
    }

    async fn join(
        &self,
        conn: ConnectionId,
        tx: &Outbound,
        room_id: String,
        user_id: String,
        user_name: String,
    ) {
        let outcome = self
            .registry
            .join(conn, &room_id, &user_id, &user_name, tx.clone())
            .await;

        match outcome {
            JoinOutcome::AlreadyJoined { members } => {
                debug!(conn = %conn, room = %room_id, "Repeated join-room, acknowledging");
                reply(
                    tx,
                    &ServerMessage::RoomJoined {
                        room_id,
                        connection_id: conn.as_u64(),
                        members,
                    },
                );
            }
            JoinOutcome::Joined {
                previous,
                members,
                peers,
            } => {
                if let Some(departure) = previous {
                    announce_departure(&departure);
                }
                info!(
                    conn = %conn,
                    room = %room_id,
                    user = %user_id,
                    existing = members.len(),
                    "Joined room"
                );
                reply(
                    tx,
                    &ServerMessage::RoomJoined {
                        room_id,
                        connection_id: conn.as_u64(),
                        members,
                    },
                );
                deliver(
                    &peers,
                    &ServerMessage::UserJoined { user_id, user_name },
                );
            }
        }
    }

    /// Tear down a closed connection and tell its room.
    pub async fn disconnect(&self, conn: ConnectionId) {
        if let Some(departure) = self.registry.leave(conn).await {
            announce_departure(&departure);
        }
    }
}

/// Wrap a room-scoped client event as the frame its peers receive.
fn room_event(from: String, msg: ClientMessage) -> ServerMessage {
    match msg {
        ClientMessage::Draw { payload } => ServerMessage::Draw { from, payload },
        ClientMessage::ChatMessage { payload } => ServerMessage::ChatMessage { from, payload },
        ClientMessage::ChatFile { payload } => ServerMessage::ChatFile { from, payload },
        ClientMessage::ClearWhiteboard => ServerMessage::ClearWhiteboard { from },
        ClientMessage::ShareFile { payload } => ServerMessage::ShareFile { from, payload },
        ClientMessage::DeleteFile { payload } => ServerMessage::DeleteFile { from, payload },
        // Handled explicitly by `Relay::dispatch`.
        ClientMessage::JoinRoom { .. }
        | ClientMessage::LeaveRoom
        | ClientMessage::SendingSignal { .. }
        | ClientMessage::ToggleAudio { .. }
        | ClientMessage::ToggleVideo { .. } => {
            ServerMessage::error(format!("{} is not a room event", msg.event_name()))
        }
    }
}

fn announce_departure(departure: &Departure) {
    if departure.user_still_present {
        // A newer connection took over this user id; the room keeps seeing them.
        debug!(
            room = %departure.room_id,
            user = %departure.user_id,
            "Stale connection closed, user still present"
        );
        return;
    }
    info!(
        room = %departure.room_id,
        user = %departure.user_id,
        remaining = departure.peers.len(),
        "Left room"
    );
    if departure.room_closed {
        info!(room = %departure.room_id, "Room closed (empty)");
    }
    deliver(
        &departure.peers,
        &ServerMessage::UserLeft {
            user_id: departure.user_id.clone(),
        },
    );
}

pub(crate) fn reply(tx: &Outbound, msg: &ServerMessage) {
    deliver(std::slice::from_ref(tx), msg);
}

/// Serialize once and queue on every recipient.
fn deliver(recipients: &[Outbound], msg: &ServerMessage) {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize relay message");
            return;
        }
    };
    for tx in recipients {
        match tx.try_send(json.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full, dropping frame");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Recipient already disconnected");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classroom_common::Signal;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Client {
        conn: ConnectionId,
        tx: Outbound,
        rx: mpsc::Receiver<String>,
    }

    impl Client {
        fn new() -> Self {
            let (tx, rx) = mpsc::channel(32);
            Self {
                conn: ConnectionId::next(),
                tx,
                rx,
            }
        }

        async fn send(&self, relay: &Relay, msg: ClientMessage) {
            let text = serde_json::to_string(&msg).unwrap();
            relay.handle_text(self.conn, &self.tx, &text).await;
        }

        async fn join(&self, relay: &Relay, room: &str, user: &str) {
            self.send(
                relay,
                ClientMessage::JoinRoom {
                    room_id: room.into(),
                    user_id: user.into(),
                    user_name: user.to_uppercase(),
                },
            )
            .await;
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                out.push(serde_json::from_str(&text).unwrap());
            }
            out
        }
    }

    #[tokio::test]
    async fn join_notifies_existing_members_only() {
        let relay = Relay::default();
        let mut a = Client::new();
        let mut b = Client::new();
        let mut other_room = Client::new();

        a.join(&relay, "abc123", "a").await;
        other_room.join(&relay, "zzz", "z").await;
        a.drain();
        other_room.drain();

        b.join(&relay, "abc123", "b").await;

        let to_a = a.drain();
        assert_eq!(
            to_a,
            vec![ServerMessage::UserJoined {
                user_id: "b".into(),
                user_name: "B".into(),
            }]
        );

        let to_b = b.drain();
        assert_eq!(to_b.len(), 1);
        match &to_b[0] {
            ServerMessage::RoomJoined { room_id, members, .. } => {
                assert_eq!(room_id, "abc123");
                assert_eq!(members.len(), 1);
                assert_eq!(members[0].user_id, "a");
            }
            other => panic!("unexpected message: {other:?}"),
        }

        assert!(other_room.drain().is_empty());
    }

    #[tokio::test]
    async fn signal_reaches_only_its_target() {
        let relay = Relay::default();
        let mut a = Client::new();
        let mut b = Client::new();
        let mut c = Client::new();
        a.join(&relay, "abc123", "a").await;
        b.join(&relay, "abc123", "b").await;
        c.join(&relay, "abc123", "c").await;
        a.drain();
        b.drain();
        c.drain();

        let offer = Signal::Offer { sdp: "v=0".into() };
        a.send(
            &relay,
            ClientMessage::SendingSignal {
                target: "b".into(),
                signal: offer.clone(),
            },
        )
        .await;

        assert_eq!(
            b.drain(),
            vec![ServerMessage::ReceivingSignal {
                from: "a".into(),
                signal: offer,
            }]
        );
        assert!(a.drain().is_empty());
        assert!(c.drain().is_empty());
    }

    #[tokio::test]
    async fn signal_to_departed_user_is_dropped() {
        let relay = Relay::default();
        let mut a = Client::new();
        let mut b = Client::new();
        a.join(&relay, "abc123", "a").await;
        b.join(&relay, "abc123", "b").await;
        relay.disconnect(b.conn).await;

        assert!(a
            .drain()
            .contains(&ServerMessage::UserLeft { user_id: "b".into() }));
        b.drain();

        a.send(
            &relay,
            ClientMessage::SendingSignal {
                target: "b".into(),
                signal: Signal::Answer { sdp: "v=0".into() },
            },
        )
        .await;
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn stale_socket_close_keeps_reconnected_user() {
        let relay = Relay::default();
        let mut a = Client::new();
        let mut b_old = Client::new();
        let mut b_new = Client::new();
        a.join(&relay, "abc123", "a").await;
        b_old.join(&relay, "abc123", "b").await;
        b_new.join(&relay, "abc123", "b").await;
        a.drain();
        b_old.drain();
        b_new.drain();

        relay.disconnect(b_old.conn).await;
        assert!(a.drain().is_empty());

        a.send(
            &relay,
            ClientMessage::SendingSignal {
                target: "b".into(),
                signal: Signal::Offer { sdp: "v=0".into() },
            },
        )
        .await;
        assert_eq!(b_new.drain().len(), 1);

        relay.disconnect(b_new.conn).await;
        assert_eq!(a.drain(), vec![ServerMessage::UserLeft { user_id: "b".into() }]);
    }

    #[tokio::test]
    async fn toggle_audio_is_broadcast_to_others() {
        let relay = Relay::default();
        let mut a = Client::new();
        let mut b = Client::new();
        a.join(&relay, "abc123", "a").await;
        b.join(&relay, "abc123", "b").await;
        a.drain();
        b.drain();

        a.send(&relay, ClientMessage::ToggleAudio { is_muted: true })
            .await;
        assert_eq!(
            b.drain(),
            vec![ServerMessage::UserToggleAudio {
                user_id: "a".into(),
                is_muted: true,
            }]
        );
        assert!(a.drain().is_empty());
        assert!(relay.registry().members("abc123").await[0].is_muted);
    }

    #[tokio::test]
    async fn room_events_are_forwarded_verbatim() {
        let relay = Relay::default();
        let mut a = Client::new();
        let mut b = Client::new();
        a.join(&relay, "abc123", "a").await;
        b.join(&relay, "abc123", "b").await;
        a.drain();
        b.drain();

        let stroke = json!({"points": [[0, 0], [10, 12]], "color": "#ff0000", "width": 3});
        a.send(
            &relay,
            ClientMessage::Draw {
                payload: stroke.clone(),
            },
        )
        .await;
        a.send(&relay, ClientMessage::ClearWhiteboard).await;
        a.send(
            &relay,
            ClientMessage::ShareFile {
                payload: json!({"id": "f1", "name": "worksheet.pdf"}),
            },
        )
        .await;

        let received = b.drain();
        assert_eq!(received.len(), 3);
        assert_eq!(
            received[0],
            ServerMessage::Draw {
                from: "a".into(),
                payload: stroke,
            }
        );
        assert_eq!(received[1], ServerMessage::ClearWhiteboard { from: "a".into() });
        assert!(matches!(received[2], ServerMessage::ShareFile { ref from, .. } if from == "a"));
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn events_before_join_are_rejected() {
        let relay = Relay::default();
        let mut a = Client::new();
        a.send(&relay, ClientMessage::ChatMessage { payload: json!("hi") })
            .await;
        assert_eq!(a.drain(), vec![ServerMessage::error("not in a room")]);
    }

    #[tokio::test]
    async fn malformed_frame_gets_error_reply() {
        let relay = Relay::default();
        let mut a = Client::new();
        relay.handle_text(a.conn, &a.tx, "{not json").await;
        let replies = a.drain();
        assert_eq!(replies.len(), 1);
        assert!(
            matches!(&replies[0], ServerMessage::Error { message } if message.starts_with("malformed message"))
        );
    }

    #[tokio::test]
    async fn switching_rooms_notifies_old_room() {
        let relay = Relay::default();
        let mut a = Client::new();
        let mut b = Client::new();
        a.join(&relay, "room-1", "a").await;
        b.join(&relay, "room-1", "b").await;
        a.drain();

        b.join(&relay, "room-2", "b").await;
        assert_eq!(a.drain(), vec![ServerMessage::UserLeft { user_id: "b".into() }]);
        assert_eq!(relay.registry().room_count().await, 2);
    }

    #[tokio::test]
    async fn repeated_join_does_not_rebroadcast() {
        let relay = Relay::default();
        let mut a = Client::new();
        let mut b = Client::new();
        a.join(&relay, "abc123", "a").await;
        b.join(&relay, "abc123", "b").await;
        a.drain();

        b.join(&relay, "abc123", "b").await;
        assert!(a.drain().is_empty());
        assert!(matches!(
            b.drain().last(),
            Some(ServerMessage::RoomJoined { .. })
        ));
    }

    #[tokio::test]
    async fn leave_room_closes_empty_room() {
        let relay = Relay::default();
        let a = Client::new();
        a.join(&relay, "abc123", "a").await;
        a.send(&relay, ClientMessage::LeaveRoom).await;
        assert_eq!(relay.registry().room_count().await, 0);
    }
}
