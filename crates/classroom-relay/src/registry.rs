//! Room registry: connection table plus per-room membership indexes.
//!
//! Every accepted connection gets a process-unique [`ConnectionId`]. A
//! connection is in at most one room at a time. Rooms exist only while
//! they have members; the last departure removes the room.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use classroom_common::MemberInfo;
use tokio::sync::{mpsc, RwLock};

use crate::error::RelayError;

/// Outbound frame queue of one connection.
pub type Outbound = mpsc::Sender<String>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one transport connection, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connection that has joined a room.
struct Member {
    room_id: String,
    user_id: String,
    user_name: String,
    is_muted: bool,
    is_video_off: bool,
    tx: Outbound,
}

impl Member {
    fn info(&self) -> MemberInfo {
        MemberInfo {
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            is_muted: self.is_muted,
            is_video_off: self.is_video_off,
        }
    }
}

#[derive(Default)]
struct Room {
    /// Ordered by connection id, which is join order.
    connections: BTreeSet<ConnectionId>,
    /// user_id → connection most recently registered under that id.
    by_user: HashMap<String, ConnectionId>,
}

#[derive(Default)]
struct RegistryState {
    members: HashMap<ConnectionId, Member>,
    rooms: HashMap<String, Room>,
}

impl RegistryState {
    fn peers(&self, room_id: &str, except: ConnectionId) -> Vec<Outbound> {
        self.rooms
            .get(room_id)
            .map(|room| {
                room.connections
                    .iter()
                    .filter(|id| **id != except)
                    .filter_map(|id| self.members.get(id))
                    .map(|m| m.tx.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn roster(&self, room_id: &str, except: Option<ConnectionId>) -> Vec<MemberInfo> {
        self.rooms
            .get(room_id)
            .map(|room| {
                room.connections
                    .iter()
                    .filter(|id| Some(**id) != except)
                    .filter_map(|id| self.members.get(id))
                    .map(Member::info)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn remove(&mut self, conn: ConnectionId) -> Option<Departure> {
        let member = self.members.remove(&conn)?;
        let mut room_closed = false;
        let mut user_still_present = false;
        if let Some(room) = self.rooms.get_mut(&member.room_id) {
            room.connections.remove(&conn);
            if room.by_user.get(&member.user_id) == Some(&conn) {
                room.by_user.remove(&member.user_id);
                // Fall back to an older connection still using the same user id.
                let replacement = room
                    .connections
                    .iter()
                    .rev()
                    .find(|id| {
                        self.members
                            .get(*id)
                            .is_some_and(|m| m.user_id == member.user_id)
                    })
                    .copied();
                if let Some(id) = replacement {
                    room.by_user.insert(member.user_id.clone(), id);
                }
            }
            user_still_present = room.by_user.contains_key(&member.user_id);
            room_closed = room.connections.is_empty();
        }
        if room_closed {
            self.rooms.remove(&member.room_id);
        }
        let peers = self.peers(&member.room_id, conn);
        Some(Departure {
            room_id: member.room_id,
            user_id: member.user_id,
            peers,
            room_closed,
            user_still_present,
        })
    }
}

/// A member removed from its room, with the members left to notify.
#[derive(Debug)]
pub struct Departure {
    pub room_id: String,
    pub user_id: String,
    pub peers: Vec<Outbound>,
    pub room_closed: bool,
    /// Another connection in the room still uses the same user id.
    pub user_still_present: bool,
}

/// Result of a `join-room` request.
#[derive(Debug)]
pub enum JoinOutcome {
    /// The connection was already in this room under the same user id.
    AlreadyJoined { members: Vec<MemberInfo> },
    Joined {
        /// Departure from the room the connection was in before, if any.
        previous: Option<Departure>,
        /// Members present before the join, in join order.
        members: Vec<MemberInfo>,
        /// Their outbound queues.
        peers: Vec<Outbound>,
    },
}

/// The sender's identity plus the queues of everyone else in its room.
#[derive(Debug)]
pub struct Broadcast {
    pub room_id: String,
    pub user_id: String,
    pub peers: Vec<Outbound>,
}

/// A resolved point-to-point route.
#[derive(Debug)]
pub struct Route {
    pub from_user: String,
    pub target: ConnectionId,
    pub tx: Outbound,
}

/// Shared room membership table.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` to `room_id`, leaving any other room first.
    pub async fn join(
        &self,
        conn: ConnectionId,
        room_id: &str,
        user_id: &str,
        user_name: &str,
        tx: Outbound,
    ) -> JoinOutcome {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let same_room = state
            .members
            .get(&conn)
            .map(|m| m.room_id == room_id && m.user_id == user_id);
        let previous = match same_room {
            Some(true) => {
                return JoinOutcome::AlreadyJoined {
                    members: state.roster(room_id, Some(conn)),
                };
            }
            Some(false) => state.remove(conn),
            None => None,
        };

        let room = state.rooms.entry(room_id.to_string()).or_default();
        let existing: Vec<ConnectionId> = room.connections.iter().copied().collect();
        room.connections.insert(conn);
        room.by_user.insert(user_id.to_string(), conn);

        let (members, peers): (Vec<MemberInfo>, Vec<Outbound>) = existing
            .iter()
            .filter_map(|id| state.members.get(id))
            .map(|m| (m.info(), m.tx.clone()))
            .unzip();

        state.members.insert(
            conn,
            Member {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                is_muted: false,
                is_video_off: false,
                tx,
            },
        );

        JoinOutcome::Joined {
            previous,
            members,
            peers,
        }
    }

    /// Remove `conn` from its room. `None` if it never joined one.
    pub async fn leave(&self, conn: ConnectionId) -> Option<Departure> {
        self.state.write().await.remove(conn)
    }

    /// Everyone else in the sender's room.
    pub async fn broadcast_from(&self, conn: ConnectionId) -> Result<Broadcast, RelayError> {
        let state = self.state.read().await;
        let member = state.members.get(&conn).ok_or(RelayError::NotInRoom)?;
        Ok(Broadcast {
            room_id: member.room_id.clone(),
            user_id: member.user_id.clone(),
            peers: state.peers(&member.room_id, conn),
        })
    }

    /// Resolve `target_user` inside the sender's room.
    ///
    /// `Ok(None)` when the target is not (or no longer) registered there.
    pub async fn route(
        &self,
        conn: ConnectionId,
        target_user: &str,
    ) -> Result<Option<Route>, RelayError> {
        let state = self.state.read().await;
        let member = state.members.get(&conn).ok_or(RelayError::NotInRoom)?;
        let route = state
            .rooms
            .get(&member.room_id)
            .and_then(|room| room.by_user.get(target_user))
            .and_then(|target| {
                state.members.get(target).map(|m| Route {
                    from_user: member.user_id.clone(),
                    target: *target,
                    tx: m.tx.clone(),
                })
            });
        Ok(route)
    }

    /// Record the sender's mute flag and return who to tell.
    pub async fn set_muted(&self, conn: ConnectionId, muted: bool) -> Result<Broadcast, RelayError> {
        self.update_member(conn, |m| m.is_muted = muted).await
    }

    /// Record the sender's video-off flag and return who to tell.
    pub async fn set_video_off(
        &self,
        conn: ConnectionId,
        video_off: bool,
    ) -> Result<Broadcast, RelayError> {
        self.update_member(conn, |m| m.is_video_off = video_off).await
    }

    async fn update_member(
        &self,
        conn: ConnectionId,
        apply: impl FnOnce(&mut Member),
    ) -> Result<Broadcast, RelayError> {
        let mut state = self.state.write().await;
        let member = state.members.get_mut(&conn).ok_or(RelayError::NotInRoom)?;
        apply(member);
        let room_id = member.room_id.clone();
        let user_id = member.user_id.clone();
        let peers = state.peers(&room_id, conn);
        Ok(Broadcast {
            room_id,
            user_id,
            peers,
        })
    }

    /// Snapshot of a room's members in join order.
    pub async fn members(&self, room_id: &str) -> Vec<MemberInfo> {
        self.state.read().await.roster(room_id, None)
    }

    /// Room the connection is currently in.
    pub async fn room_of(&self, conn: ConnectionId) -> Option<String> {
        self.state
            .read()
            .await
            .members
            .get(&conn)
            .map(|m| m.room_id.clone())
    }

    /// Number of active rooms.
    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    /// Number of connections that have joined a room.
    pub async fn member_count(&self) -> usize {
        self.state.read().await.members.len()
    }
}
