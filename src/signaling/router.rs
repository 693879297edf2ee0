use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{InboundMessage, MessageKind, ServerMessage, stamp_relay};
use super::registry::{ClientRegistry, RoomRegistry};
use super::session::Session;
use super::types::{ClientId, OutboundMessage, RoomId, SignalingError};

/// What happens to a room once its last member leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoomPolicy {
    #[default]
    DeleteWhenEmpty,
    /// Empty rooms stay listed until the process exits
    KeepEmpty,
}

/// Owns both registries and runs every protocol handler.
///
/// Each call runs to completion without awaiting, so whoever owns the
/// router (the actor task) gets the ordering guarantees for free.
#[derive(Debug, Default)]
pub struct Router {
    clients: ClientRegistry,
    rooms: RoomRegistry,
    policy: RoomPolicy,
}

impl Router {
    pub fn new(policy: RoomPolicy) -> Self {
        Self {
            clients: ClientRegistry::new(),
            rooms: RoomRegistry::new(),
            policy,
        }
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Register a new connection and hand back its id
    pub fn connect(&mut self, tx: mpsc::UnboundedSender<OutboundMessage>) -> ClientId {
        let id = self.clients.allocate_id();
        self.clients.register(Session::new(id, tx));
        info!("Peer {} connected ({} online)", id, self.clients.len());
        id
    }

    /// Leave the current room (if any) and forget the session
    pub fn disconnect(&mut self, id: ClientId) -> bool {
        match self.handle_leave(id) {
            Ok(()) | Err(SignalingError::NotInRoom) => {}
            Err(e) => warn!("Leave on disconnect failed for {}: {}", id, e),
        }

        let removed = self.clients.deregister(&id).is_some();
        if removed {
            info!("Peer {} disconnected ({} online)", id, self.clients.len());
        }
        removed
    }

    /// Route one inbound message. Logical failures are logged and dropped;
    /// the sender never hears about them.
    pub fn dispatch(&mut self, from: ClientId, message: InboundMessage) {
        let kind = message.kind();

        let result = match message {
            InboundMessage::Name { name } => self.handle_name(from, name),
            InboundMessage::Create { name } => self.handle_create(from, name),
            InboundMessage::Join { room } => self.handle_join(from, &room),
            InboundMessage::Leave => self.handle_leave(from),
            InboundMessage::Relay { kind, to, payload } => {
                self.handle_relay(from, kind, &to, payload)
            }
            InboundMessage::Unknown { kind } => Err(SignalingError::UnknownType(kind)),
        };

        match result {
            Ok(()) => {}
            Err(SignalingError::UnknownType(kind)) => {
                warn!("Unknown message type {:?} from {}", kind, from);
            }
            Err(e) => {
                let kind = kind.map_or("?", MessageKind::as_str);
                debug!("Ignored {} from {}: {}", kind, from, e);
            }
        }
    }

    fn handle_name(&mut self, from: ClientId, name: String) -> Result<(), SignalingError> {
        let session = self
            .clients
            .lookup_mut(&from)
            .ok_or_else(|| unknown_session(from))?;

        debug!("Peer {} is now {:?}", from, name);
        session.set_name(name);

        session.send(&ServerMessage::Rooms {
            rooms: self.rooms.summaries(),
        })
    }

    fn handle_create(&mut self, from: ClientId, name: String) -> Result<(), SignalingError> {
        if self.clients.lookup(&from).is_none() {
            return Err(unknown_session(from));
        }

        let room_id = self.rooms.create(name);
        info!("Room created: {} by peer {}", room_id, from);

        match self.join_room(from, room_id) {
            Err(e @ SignalingError::AlreadyInRoom(_))
                if self.policy == RoomPolicy::DeleteWhenEmpty =>
            {
                self.rooms.remove(&room_id);
                info!("Room {} removed (creator already in a room)", room_id);
                Err(e)
            }
            other => other,
        }
    }

    fn handle_join(&mut self, from: ClientId, room: &str) -> Result<(), SignalingError> {
        let room_id =
            RoomId::parse(room).ok_or_else(|| SignalingError::RoomNotFound(room.to_string()))?;
        self.join_room(from, room_id)
    }

    fn join_room(&mut self, from: ClientId, room_id: RoomId) -> Result<(), SignalingError> {
        let session = self
            .clients
            .lookup_mut(&from)
            .ok_or_else(|| unknown_session(from))?;

        if let Some(current) = session.room() {
            return Err(SignalingError::AlreadyInRoom(current));
        }

        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| SignalingError::RoomNotFound(room_id.to_string()))?;

        // taken before the caller is added
        session.send(&ServerMessage::Clients {
            id: room_id,
            clients: room.snapshot(),
        })?;

        session.enter_room(room_id)?;
        room.add_member(from, session.name().map(str::to_string));

        info!("Peer {} joined room {} ({} members)", from, room_id, room.len());
        Ok(())
    }

    fn handle_leave(&mut self, from: ClientId) -> Result<(), SignalingError> {
        let session = self
            .clients
            .lookup(&from)
            .ok_or_else(|| unknown_session(from))?;
        let room_id = session.room().ok_or(SignalingError::NotInRoom)?;

        let left = ServerMessage::Left {
            id: from,
            name: session.name().map(str::to_string),
        }
        .encode()?;

        let now_empty = match self.rooms.get_mut(&room_id) {
            Some(room) => {
                room.remove_member(&from);
                for member in room.member_ids() {
                    match self.clients.lookup(&member) {
                        Some(peer) => {
                            peer.deliver(left.clone());
                        }
                        None => warn!("Room {} lists offline peer {}", room_id, member),
                    }
                }
                room.is_empty()
            }
            None => {
                warn!("Peer {} was in missing room {}", from, room_id);
                false
            }
        };

        if let Some(session) = self.clients.lookup_mut(&from) {
            session.exit_room();
        }
        info!("Peer {} left room {}", from, room_id);

        if now_empty && self.policy == RoomPolicy::DeleteWhenEmpty {
            self.rooms.remove(&room_id);
            info!("Room {} removed (empty)", room_id);
        }

        Ok(())
    }

    fn handle_relay(
        &self,
        from: ClientId,
        kind: MessageKind,
        to: &str,
        payload: Map<String, Value>,
    ) -> Result<(), SignalingError> {
        let sender = self
            .clients
            .lookup(&from)
            .ok_or_else(|| unknown_session(from))?;

        let destination = ClientId::parse(to)
            .and_then(|id| self.clients.lookup(&id))
            .ok_or_else(|| SignalingError::DestinationOffline(to.to_string()))?;

        let outbound = stamp_relay(payload, from, sender.name())?;
        if !destination.deliver(outbound) {
            return Err(SignalingError::DestinationOffline(to.to_string()));
        }

        debug!("Relayed {} from {} to {}", kind.as_str(), from, to);
        Ok(())
    }
}

fn unknown_session(id: ClientId) -> SignalingError {
    SignalingError::Internal(format!("no session for {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::mpsc::error::TryRecvError;

    fn connect(router: &mut Router) -> (ClientId, UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (router.connect(tx), rx)
    }

    fn send(router: &mut Router, from: ClientId, value: Value) {
        router.dispatch(from, InboundMessage::from_value(value).unwrap());
    }

    fn recv(rx: &mut UnboundedReceiver<OutboundMessage>) -> Value {
        let msg = rx.try_recv().expect("expected a message");
        serde_json::from_str(msg.as_str()).unwrap()
    }

    fn assert_silent(rx: &mut UnboundedReceiver<OutboundMessage>) {
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    /// Connects, names and creates a room; drains the replies.
    fn host(
        router: &mut Router,
        name: &str,
        room: &str,
    ) -> (ClientId, UnboundedReceiver<OutboundMessage>, RoomId) {
        let (id, mut rx) = connect(router);
        send(router, id, json!({"type": "name", "name": name}));
        recv(&mut rx);
        send(router, id, json!({"type": "create", "name": room}));
        let reply = recv(&mut rx);
        let room_id = RoomId::parse(reply["id"].as_str().unwrap()).unwrap();
        (id, rx, room_id)
    }

    #[test]
    fn name_replies_with_empty_room_list() {
        let mut router = Router::default();
        let (alice, mut rx) = connect(&mut router);

        send(&mut router, alice, json!({"type": "name", "name": "Alice"}));

        assert_eq!(recv(&mut rx), json!({"type": "rooms", "rooms": []}));
        assert_silent(&mut rx);
        assert_eq!(router.clients().lookup(&alice).unwrap().name(), Some("Alice"));
    }

    #[test]
    fn create_places_caller_in_new_room() {
        let mut router = Router::default();
        let (alice, mut rx) = connect(&mut router);
        send(&mut router, alice, json!({"type": "name", "name": "Alice"}));
        recv(&mut rx);

        send(&mut router, alice, json!({"type": "create", "name": "Room1"}));

        let reply = recv(&mut rx);
        assert_eq!(reply["type"], "clients");
        assert_eq!(reply["clients"], json!([]));
        let room_id = RoomId::parse(reply["id"].as_str().unwrap()).unwrap();

        let room = router.rooms().get(&room_id).unwrap();
        assert_eq!(room.name(), "Room1");
        assert!(room.contains(&alice));
        assert_eq!(router.clients().lookup(&alice).unwrap().room(), Some(room_id));
    }

    #[test]
    fn create_then_name_lists_room() {
        let mut router = Router::default();
        let (alice, _alice_rx, room_id) = host(&mut router, "Alice", "Room1");
        let (bob, mut bob_rx) = connect(&mut router);

        send(&mut router, bob, json!({"type": "name", "name": "Bob"}));

        let reply = recv(&mut bob_rx);
        assert_eq!(
            reply,
            json!({
                "type": "rooms",
                "rooms": [{
                    "id": room_id.as_str(),
                    "name": "Room1",
                    "clients": {alice.as_str(): "Alice"}
                }]
            })
        );
    }

    #[test]
    fn join_snapshot_excludes_caller() {
        let mut router = Router::default();
        let (alice, mut alice_rx, room_id) = host(&mut router, "Alice", "Room1");
        let (bob, mut bob_rx) = connect(&mut router);
        send(&mut router, bob, json!({"type": "name", "name": "Bob"}));
        recv(&mut bob_rx);

        send(&mut router, bob, json!({"type": "join", "id": room_id.as_str()}));

        assert_eq!(
            recv(&mut bob_rx),
            json!({
                "type": "clients",
                "id": room_id.as_str(),
                "clients": [{"id": alice.as_str(), "name": "Alice"}]
            })
        );
        let room = router.rooms().get(&room_id).unwrap();
        assert_eq!(room.member_ids().collect::<Vec<_>>(), vec![alice, bob]);
        // existing members are not notified of joins
        assert_silent(&mut alice_rx);
    }

    #[test]
    fn second_join_is_a_no_op() {
        let mut router = Router::default();
        let (_alice, _alice_rx, first) = host(&mut router, "Alice", "Room1");
        let (_carol, _carol_rx, second) = host(&mut router, "Carol", "Room2");
        let (bob, mut bob_rx) = connect(&mut router);

        send(&mut router, bob, json!({"type": "join", "id": first.as_str()}));
        recv(&mut bob_rx);
        send(&mut router, bob, json!({"type": "join", "id": second.as_str()}));
        send(&mut router, bob, json!({"type": "join", "id": first.as_str()}));

        assert_silent(&mut bob_rx);
        assert_eq!(router.clients().lookup(&bob).unwrap().room(), Some(first));
        assert!(!router.rooms().get(&second).unwrap().contains(&bob));
        assert_eq!(router.rooms().get(&first).unwrap().len(), 2);
    }

    #[test]
    fn join_missing_room_is_silent() {
        let mut router = Router::default();
        let (bob, mut bob_rx) = connect(&mut router);

        send(&mut router, bob, json!({"type": "join", "id": "nothere1"}));
        send(&mut router, bob, json!({"type": "join", "id": "not a room id"}));

        assert_silent(&mut bob_rx);
        assert_eq!(router.clients().lookup(&bob).unwrap().room(), None);
    }

    #[test]
    fn leave_notifies_remaining_members() {
        let mut router = Router::default();
        let (alice, mut alice_rx, room_id) = host(&mut router, "Alice", "Room1");
        let (bob, mut bob_rx) = connect(&mut router);
        send(&mut router, bob, json!({"type": "name", "name": "Bob"}));
        send(&mut router, bob, json!({"type": "join", "id": room_id.as_str()}));
        recv(&mut bob_rx);
        recv(&mut bob_rx);

        send(&mut router, bob, json!({"type": "leave"}));

        assert_eq!(
            recv(&mut alice_rx),
            json!({"type": "left", "id": bob.as_str(), "name": "Bob"})
        );
        assert_silent(&mut bob_rx);
        assert_eq!(router.clients().lookup(&bob).unwrap().room(), None);
        let room = router.rooms().get(&room_id).unwrap();
        assert_eq!(room.member_ids().collect::<Vec<_>>(), vec![alice]);
    }

    #[test]
    fn leave_without_room_is_silent() {
        let mut router = Router::default();
        let (bob, mut bob_rx) = connect(&mut router);
        send(&mut router, bob, json!({"type": "leave"}));
        assert_silent(&mut bob_rx);
    }

    #[test]
    fn last_leave_deletes_room_by_default() {
        let mut router = Router::default();
        let (alice, _rx, room_id) = host(&mut router, "Alice", "Room1");

        send(&mut router, alice, json!({"type": "leave"}));

        assert!(router.rooms().get(&room_id).is_none());
        assert!(router.rooms().is_empty());
    }

    #[test]
    fn keep_empty_policy_retains_room() {
        let mut router = Router::new(RoomPolicy::KeepEmpty);
        let (alice, mut rx, room_id) = host(&mut router, "Alice", "Room1");

        send(&mut router, alice, json!({"type": "leave"}));
        assert!(router.rooms().get(&room_id).unwrap().is_empty());

        send(&mut router, alice, json!({"type": "join", "id": room_id.as_str()}));
        assert_eq!(
            recv(&mut rx),
            json!({"type": "clients", "id": room_id.as_str(), "clients": []})
        );
    }

    #[test]
    fn create_while_in_room_leaves_no_orphan() {
        let mut router = Router::default();
        let (alice, mut rx, room_id) = host(&mut router, "Alice", "Room1");

        send(&mut router, alice, json!({"type": "create", "name": "Room2"}));

        assert_silent(&mut rx);
        assert_eq!(router.rooms().len(), 1);
        assert_eq!(router.clients().lookup(&alice).unwrap().room(), Some(room_id));
    }

    #[test]
    fn create_while_in_room_keeps_room_under_keep_empty() {
        let mut router = Router::new(RoomPolicy::KeepEmpty);
        let (alice, mut rx, _room_id) = host(&mut router, "Alice", "Room1");

        send(&mut router, alice, json!({"type": "create", "name": "Room2"}));

        assert_silent(&mut rx);
        assert_eq!(router.rooms().len(), 2);
    }

    #[test]
    fn relay_stamps_sender_identity() {
        let mut router = Router::default();
        let (alice, _alice_rx) = connect(&mut router);
        let (bob, mut bob_rx) = connect(&mut router);
        send(&mut router, alice, json!({"type": "name", "name": "Alice"}));

        send(
            &mut router,
            alice,
            json!({"type": "offer", "id": bob.as_str(), "offer": {"type": "offer", "sdp": "v=0"}}),
        );

        assert_eq!(
            recv(&mut bob_rx),
            json!({
                "type": "offer",
                "id": alice.as_str(),
                "name": "Alice",
                "offer": {"type": "offer", "sdp": "v=0"}
            })
        );
    }

    #[test]
    fn relay_all_kinds() {
        let mut router = Router::default();
        let (alice, _alice_rx) = connect(&mut router);
        let (bob, mut bob_rx) = connect(&mut router);

        for kind in ["offer", "ANSWER", "Candidate"] {
            send(&mut router, alice, json!({"type": kind, "id": bob.as_str()}));
            let got = recv(&mut bob_rx);
            assert_eq!(got["type"], kind);
            assert_eq!(got["id"], alice.as_str());
            assert_eq!(got["name"], Value::Null);
        }
    }

    #[test]
    fn relay_to_offline_peer_is_dropped() {
        let mut router = Router::default();
        let (alice, mut alice_rx) = connect(&mut router);
        let (bob, mut bob_rx) = connect(&mut router);
        router.disconnect(bob);

        send(&mut router, alice, json!({"type": "offer", "id": bob.as_str(), "sdp": "..."}));
        send(&mut router, alice, json!({"type": "offer", "id": "garbage", "sdp": "..."}));

        assert_silent(&mut alice_rx);
        assert!(matches!(bob_rx.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[test]
    fn unknown_type_changes_nothing() {
        let mut router = Router::default();
        let (alice, mut rx) = connect(&mut router);
        send(&mut router, alice, json!({"type": "dance", "id": "x"}));
        assert_silent(&mut rx);
        assert!(router.rooms().is_empty());
    }

    #[test]
    fn disconnect_acts_as_leave() {
        let mut router = Router::default();
        let (alice, _alice_rx, room_id) = host(&mut router, "Alice", "Room1");
        let (bob, mut bob_rx) = connect(&mut router);
        send(&mut router, bob, json!({"type": "join", "id": room_id.as_str()}));
        recv(&mut bob_rx);

        assert!(router.disconnect(alice));

        assert_eq!(
            recv(&mut bob_rx),
            json!({"type": "left", "id": alice.as_str(), "name": "Alice"})
        );
        assert!(router.clients().lookup(&alice).is_none());
        let room = router.rooms().get(&room_id).unwrap();
        assert_eq!(room.member_ids().collect::<Vec<_>>(), vec![bob]);
        assert!(!router.disconnect(alice));
    }

    #[test]
    fn membership_only_references_live_clients() {
        let mut router = Router::default();
        let (_alice, _alice_rx, room_id) = host(&mut router, "Alice", "Room1");
        let mut others = Vec::new();
        for _ in 0..5 {
            let (id, rx) = connect(&mut router);
            send(&mut router, id, json!({"type": "join", "id": room_id.as_str()}));
            others.push((id, rx));
        }
        for (id, _) in others.iter().step_by(2) {
            router.disconnect(*id);
        }

        let room = router.rooms().get(&room_id).unwrap();
        assert_eq!(room.len(), 3);
        for member in room.member_ids() {
            assert!(router.clients().lookup(&member).is_some());
        }
    }
}
