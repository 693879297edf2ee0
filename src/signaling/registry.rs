use std::collections::HashMap;

use indexmap::IndexMap;

use super::session::Session;
use super::types::{ClientId, ClientInfo, RoomId, RoomSummary};

/// A named group of connections. Members keep the display name they had
/// when they joined, in join order.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    name: String,
    members: IndexMap<ClientId, Option<String>>,
}

impl Room {
    fn new(id: RoomId, name: String) -> Self {
        Self {
            id,
            name,
            members: IndexMap::new(),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &ClientId) -> bool {
        self.members.contains_key(id)
    }

    pub fn member_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.members.keys().copied()
    }

    /// Point-in-time copy of the membership
    pub fn snapshot(&self) -> Vec<ClientInfo> {
        self.members
            .iter()
            .map(|(id, name)| ClientInfo {
                id: *id,
                name: name.clone(),
            })
            .collect()
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id,
            name: self.name.clone(),
            clients: self.members.clone(),
        }
    }

    pub(crate) fn add_member(&mut self, id: ClientId, name: Option<String>) {
        self.members.insert(id, name);
    }

    /// Returns false if `id` was not a member
    pub(crate) fn remove_member(&mut self, id: &ClientId) -> bool {
        self.members.shift_remove(id).is_some()
    }
}

/// Room id -> Room, in creation order
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: IndexMap<RoomId, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an empty room under a fresh id
    pub fn create(&mut self, name: impl Into<String>) -> RoomId {
        let mut id = RoomId::generate();
        while self.rooms.contains_key(&id) {
            id = RoomId::generate();
        }
        self.rooms.insert(id, Room::new(id, name.into()));
        id
    }

    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(id)
    }

    pub fn remove(&mut self, id: &RoomId) -> Option<Room> {
        self.rooms.shift_remove(id)
    }

    pub fn summaries(&self) -> Vec<RoomSummary> {
        self.rooms.values().map(Room::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// Connection id -> live session
#[derive(Debug, Default)]
pub struct ClientRegistry {
    sessions: HashMap<ClientId, Session>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// An id no live session is using
    pub fn allocate_id(&self) -> ClientId {
        let mut id = ClientId::generate();
        while self.sessions.contains_key(&id) {
            id = ClientId::generate();
        }
        id
    }

    pub fn register(&mut self, session: Session) {
        self.sessions.insert(session.id(), session);
    }

    pub fn deregister(&mut self, id: &ClientId) -> Option<Session> {
        self.sessions.remove(id)
    }

    pub fn lookup(&self, id: &ClientId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub(crate) fn lookup_mut(&mut self, id: &ClientId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
