use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling errors.
///
/// `MalformedMessage` is fatal for the connection that sent it. Every other
/// variant is recovered inside the router and never reaches a client.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("already in room {0}")]
    AlreadyInRoom(RoomId),

    #[error("destination offline: {0}")]
    DestinationOffline(String),

    #[error("not in a room")]
    NotInRoom,

    #[error("internal error: {0}")]
    Internal(String),
}

const ROOM_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ROOM_ID_LEN: usize = 8;
const CLIENT_ID_PREFIX: &[u8] = b"peer_";
const CLIENT_ID_LEN: usize = 21;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Room id: 8 chars of `[a-z0-9]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomId {
    bytes: [u8; ROOM_ID_LEN],
}

impl RoomId {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let mut bytes = [0u8; ROOM_ID_LEN];
        for byte in &mut bytes {
            *byte = ROOM_ID_CHARS[rng.random_range(0..ROOM_ID_CHARS.len())];
        }
        Self { bytes }
    }

    /// Strict parse. Anything that could not have been generated is `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let src = s.as_bytes();
        if src.len() != ROOM_ID_LEN || !src.iter().all(|b| ROOM_ID_CHARS.contains(b)) {
            return None;
        }
        let mut bytes = [0u8; ROOM_ID_LEN];
        bytes.copy_from_slice(src);
        Some(Self { bytes })
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RoomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RoomId::parse(&s).ok_or_else(|| serde::de::Error::custom("invalid room id"))
    }
}

/// Client id: "peer_" + 16 hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId {
    bytes: [u8; CLIENT_ID_LEN],
}

impl ClientId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CLIENT_ID_LEN];
        bytes[..CLIENT_ID_PREFIX.len()].copy_from_slice(CLIENT_ID_PREFIX);

        let value: u64 = rand::rng().random();

        for i in 0..16 {
            let nibble = ((value >> (60 - i * 4)) & 0xF) as usize;
            bytes[CLIENT_ID_PREFIX.len() + i] = HEX_CHARS[nibble];
        }
        Self { bytes }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let src = s.as_bytes();
        if src.len() != CLIENT_ID_LEN
            || !src.starts_with(CLIENT_ID_PREFIX)
            || !src[CLIENT_ID_PREFIX.len()..]
                .iter()
                .all(|b| HEX_CHARS.contains(b))
        {
            return None;
        }
        let mut bytes = [0u8; CLIENT_ID_LEN];
        bytes.copy_from_slice(src);
        Some(Self { bytes })
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ClientId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ClientId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ClientId::parse(&s).ok_or_else(|| serde::de::Error::custom("invalid client id"))
    }
}

/// Member entry in a `clients` snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: ClientId,
    pub name: Option<String>,
}

/// Room entry in a `rooms` listing. `clients` maps member id to display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub clients: indexmap::IndexMap<ClientId, Option<String>>,
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    /// Create a new outbound message from any string type
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}
