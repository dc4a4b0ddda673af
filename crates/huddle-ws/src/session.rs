use std::sync::Arc;

use huddle_core::admission::Admitted;
use huddle_core::rooms::{Connection, Frame, RegistryError, RoomRegistry};
use huddle_core::AppState;
use huddle_models::gateway::{GatewayEvent, ReadyPayload};
use tokio::sync::mpsc;

/// An admitted connection's room membership. Dropping the session leaves the
/// room, whichever way the connection task ends.
pub struct Session {
    pub connection: Connection,
    rooms: Arc<RoomRegistry>,
}

impl Session {
    pub fn open(
        state: &AppState,
        admitted: Admitted,
    ) -> Result<(Self, mpsc::Receiver<Frame>), RegistryError> {
        let (tx, rx) = mpsc::channel(state.config.gateway.outbound_queue_capacity.max(1));
        let connection = Connection::new(admitted.identity, admitted.room);
        state.rooms.join(connection.clone(), tx)?;
        Ok((
            Self {
                connection,
                rooms: state.rooms.clone(),
            },
            rx,
        ))
    }

    pub fn ready_event(&self) -> GatewayEvent {
        GatewayEvent::Ready(ReadyPayload {
            connection_id: self.connection.id.to_string(),
            project_id: self.connection.room.clone(),
            user: self.connection.identity.clone(),
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.rooms.leave(self.connection.id);
    }
}
