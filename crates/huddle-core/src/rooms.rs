//! Room registry: project id -> live member connections.
//!
//! Rooms are created lazily on first join and pruned when their last member
//! leaves. Broadcasts hold the room's shard lock for writing, so every member
//! of a room observes broadcasts in the same order.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use huddle_models::gateway::GatewayEvent;
use huddle_models::message::SenderInfo;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type RoomId = String;
pub type ConnectionId = Uuid;

/// A serialized gateway frame, shared between every recipient of a broadcast.
pub type Frame = Arc<str>;

#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub identity: SenderInfo,
    pub room: RoomId,
}

impl Connection {
    pub fn new(identity: SenderInfo, room: RoomId) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            room,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} already joined a room")]
    AlreadyJoined(ConnectionId),
}

struct Member {
    connection: Connection,
    outbound: mpsc::Sender<Frame>,
}

#[derive(Default)]
struct Room {
    members: HashMap<ConnectionId, Member>,
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Room>,
    /// Reverse index so `leave` only needs the connection id.
    memberships: DashMap<ConnectionId, RoomId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(
        &self,
        connection: Connection,
        outbound: mpsc::Sender<Frame>,
    ) -> Result<(), RegistryError> {
        let id = connection.id;
        match self.memberships.entry(id) {
            Entry::Occupied(_) => return Err(RegistryError::AlreadyJoined(id)),
            Entry::Vacant(slot) => {
                slot.insert(connection.room.clone());
            }
        }
        let room_id = connection.room.clone();
        self.rooms
            .entry(room_id.clone())
            .or_default()
            .members
            .insert(id, Member { connection, outbound });
        tracing::debug!(connection_id = %id, project_id = %room_id, "joined room");
        Ok(())
    }

    /// Returns false when the connection was not (or no longer) registered.
    pub fn leave(&self, connection_id: ConnectionId) -> bool {
        let Some((_, room_id)) = self.memberships.remove(&connection_id) else {
            return false;
        };
        if let Some(mut room) = self.rooms.get_mut(&room_id) {
            room.members.remove(&connection_id);
        }
        let pruned = self
            .rooms
            .remove_if(&room_id, |_, room| room.members.is_empty())
            .is_some();
        tracing::debug!(
            connection_id = %connection_id,
            project_id = %room_id,
            pruned,
            "left room"
        );
        true
    }

    /// Deliver to every member of `room` except `origin`. Returns the number of
    /// members the frame was queued for.
    pub fn broadcast_except(
        &self,
        room: &str,
        origin: ConnectionId,
        event: &GatewayEvent,
    ) -> usize {
        self.deliver(room, Some(origin), event)
    }

    /// Deliver to every current member of `room`.
    pub fn broadcast_all(&self, room: &str, event: &GatewayEvent) -> usize {
        self.deliver(room, None, event)
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|r| r.members.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn deliver(&self, room: &str, skip: Option<ConnectionId>, event: &GatewayEvent) -> usize {
        let frame: Frame = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::error!(project_id = %room, "failed to serialize gateway event: {e}");
                return 0;
            }
        };

        // Write lock: serializes broadcasts within one room.
        let Some(room_entry) = self.rooms.get_mut(room) else {
            return 0;
        };
        let mut delivered = 0;
        for (id, member) in room_entry.members.iter() {
            if Some(*id) == skip {
                continue;
            }
            match member.outbound.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %id,
                        user_id = %member.connection.identity.id,
                        project_id = %room,
                        "outbound queue full, dropping frame for member"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(
                        connection_id = %id,
                        user_id = %member.connection.identity.id,
                        project_id = %room,
                        "member transport closed, skipping"
                    );
                }
            }
        }
        delivered
    }
}
