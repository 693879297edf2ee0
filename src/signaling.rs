//! WebSocket signaling relay: rooms, membership and offer/answer/candidate routing

mod actor;
mod messages;
mod registry;
mod router;
mod server;
mod session;
mod types;

pub use actor::{RouterHandle, RouterStats};
pub use messages::{InboundMessage, MessageKind, ServerMessage, stamp_relay};
pub use registry::{ClientRegistry, Room, RoomRegistry};
pub use router::{RoomPolicy, Router};
pub use server::{DEFAULT_SIGNALING_PORT, SignalingServer};
pub use session::{Session, SessionState};
pub use types::{ClientId, ClientInfo, OutboundMessage, RoomId, RoomSummary, SignalingError};
