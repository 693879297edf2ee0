use tokio::sync::mpsc;

use super::messages::ServerMessage;
use super::types::{ClientId, OutboundMessage, RoomId, SignalingError};

/// Protocol state, derived from what the session has set so far.
/// A closed session is simply gone from the client registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No name, no room
    Connected,
    /// Name set, no room
    Named,
    /// In a room (with or without a name)
    InRoom,
}

/// Per-connection state held by the router
#[derive(Debug)]
pub struct Session {
    id: ClientId,
    name: Option<String>,
    room: Option<RoomId>,
    /// Outbound channel to this connection's writer task
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Session {
    pub fn new(id: ClientId, tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self {
            id,
            name: None,
            room: None,
            tx,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn room(&self) -> Option<RoomId> {
        self.room
    }

    pub fn state(&self) -> SessionState {
        match (&self.name, self.room) {
            (_, Some(_)) => SessionState::InRoom,
            (Some(_), None) => SessionState::Named,
            (None, None) => SessionState::Connected,
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    pub(crate) fn enter_room(&mut self, room: RoomId) -> Result<(), SignalingError> {
        match self.room {
            Some(current) => Err(SignalingError::AlreadyInRoom(current)),
            None => {
                self.room = Some(room);
                Ok(())
            }
        }
    }

    pub(crate) fn exit_room(&mut self) -> Option<RoomId> {
        self.room.take()
    }

    /// Fire-and-forget. Returns false if the writer task is gone.
    pub fn deliver(&self, msg: OutboundMessage) -> bool {
        self.tx.send(msg).is_ok()
    }

    pub fn send(&self, msg: &ServerMessage) -> Result<(), SignalingError> {
        self.deliver(msg.encode()?);
        Ok(())
    }
}
