use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{ClientId, ClientInfo, OutboundMessage, RoomId, RoomSummary, SignalingError};

/// Recognized values of the inbound `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Name,
    Create,
    Join,
    Leave,
    Offer,
    Answer,
    Candidate,
}

impl MessageKind {
    pub const ALL: [MessageKind; 7] = [
        MessageKind::Name,
        MessageKind::Create,
        MessageKind::Join,
        MessageKind::Leave,
        MessageKind::Offer,
        MessageKind::Answer,
        MessageKind::Candidate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Name => "name",
            MessageKind::Create => "create",
            MessageKind::Join => "join",
            MessageKind::Leave => "leave",
            MessageKind::Offer => "offer",
            MessageKind::Answer => "answer",
            MessageKind::Candidate => "candidate",
        }
    }

    /// Case-insensitive lookup of a `type` string
    pub fn from_type(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
    }

    /// offer / answer / candidate
    pub fn is_relay(self) -> bool {
        matches!(
            self,
            MessageKind::Offer | MessageKind::Answer | MessageKind::Candidate
        )
    }
}

/// Messages sent from client to server.
///
/// Ids arrive as raw strings; the router decides whether they name anything.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Set the display name and request the room listing
    Name { name: String },

    /// Create a room and join it
    Create { name: String },

    /// Join an existing room by id
    Join { room: String },

    /// Leave the current room
    Leave,

    /// Offer, answer or candidate addressed to `to`. `payload` is the whole
    /// inbound object and is forwarded as-is apart from `id` and `name`.
    Relay {
        kind: MessageKind,
        to: String,
        payload: Map<String, Value>,
    },

    /// A well-formed message with a type nobody handles
    Unknown { kind: String },
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, SignalingError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| SignalingError::MalformedMessage(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, SignalingError> {
        let Value::Object(payload) = value else {
            return Err(SignalingError::MalformedMessage(
                "expected a JSON object".to_string(),
            ));
        };

        let kind = match payload.get("type") {
            Some(Value::String(kind)) => kind.as_str(),
            Some(_) => {
                return Err(SignalingError::MalformedMessage(
                    "`type` must be a string".to_string(),
                ));
            }
            None => {
                return Err(SignalingError::MalformedMessage(
                    "missing `type`".to_string(),
                ));
            }
        };

        let Some(kind) = MessageKind::from_type(kind) else {
            return Ok(InboundMessage::Unknown {
                kind: kind.to_string(),
            });
        };

        let message = match kind {
            MessageKind::Name => InboundMessage::Name {
                name: required_str(&payload, kind, "name")?,
            },
            MessageKind::Create => InboundMessage::Create {
                name: required_str(&payload, kind, "name")?,
            },
            MessageKind::Join => InboundMessage::Join {
                room: required_str(&payload, kind, "id")?,
            },
            MessageKind::Leave => InboundMessage::Leave,
            MessageKind::Offer | MessageKind::Answer | MessageKind::Candidate => {
                let to = required_str(&payload, kind, "id")?;
                InboundMessage::Relay { kind, to, payload }
            }
        };

        Ok(message)
    }

    /// `None` for unknown types
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            InboundMessage::Name { .. } => Some(MessageKind::Name),
            InboundMessage::Create { .. } => Some(MessageKind::Create),
            InboundMessage::Join { .. } => Some(MessageKind::Join),
            InboundMessage::Leave => Some(MessageKind::Leave),
            InboundMessage::Relay { kind, .. } => Some(*kind),
            InboundMessage::Unknown { .. } => None,
        }
    }
}

fn required_str(
    payload: &Map<String, Value>,
    kind: MessageKind,
    field: &str,
) -> Result<String, SignalingError> {
    match payload.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(SignalingError::MalformedMessage(format!(
            "`{}` requires string field `{}`",
            kind.as_str(),
            field
        ))),
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Snapshot of every room, sent in reply to `name`
    #[serde(rename = "rooms")]
    Rooms { rooms: Vec<RoomSummary> },

    /// Members of a room at the moment the caller joined (caller excluded)
    #[serde(rename = "clients")]
    Clients { id: RoomId, clients: Vec<ClientInfo> },

    /// A member left the room
    #[serde(rename = "left")]
    Left { id: ClientId, name: Option<String> },
}

impl ServerMessage {
    pub fn encode(&self) -> Result<OutboundMessage, SignalingError> {
        serde_json::to_string(self)
            .map(OutboundMessage::from)
            .map_err(|e| SignalingError::Internal(e.to_string()))
    }
}

/// Overwrite `id` and `name` with the sender's identity and encode.
pub fn stamp_relay(
    mut payload: Map<String, Value>,
    from: ClientId,
    name: Option<&str>,
) -> Result<OutboundMessage, SignalingError> {
    payload.insert("id".to_string(), Value::String(from.as_str().to_string()));
    payload.insert(
        "name".to_string(),
        name.map_or(Value::Null, |n| Value::String(n.to_string())),
    );
    serde_json::to_string(&payload)
        .map(OutboundMessage::from)
        .map_err(|e| SignalingError::Internal(e.to_string()))
}
