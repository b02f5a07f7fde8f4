//! Room event definitions and wire payloads
//!
//! The room topic carries `{"type": ...}` payloads (chat, typing); the status
//! topic carries `{"event": ...}` payloads (lifecycle). Both fold into one
//! closed [`RoomEvent`] union.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::Identity;
use crate::error::ProtocolError;

/// Topic and destination names (without broker prefixes)
pub struct Topics;

impl Topics {
    /// Application destination for chat messages
    pub const SEND_CHAT: &'static str = "chat.sendMessage";
    /// Application destination for the start control message
    pub const START: &'static str = "room/start";

    /// Room topic: chat and typing
    pub fn room(room_code: &str) -> String {
        format!("room/{room_code}")
    }

    /// Status topic: lifecycle events
    pub fn status(room_code: &str) -> String {
        format!("room/{room_code}/status")
    }

    /// Application destination for typing notifications
    pub fn typing(room_code: &str) -> String {
        format!("chat.typing/{room_code}")
    }
}

/// Final result broadcast when a match ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCompleted {
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub player1: Option<String>,
    #[serde(default)]
    pub player2: Option<String>,
    #[serde(default)]
    pub player1_score: Option<i64>,
    #[serde(default)]
    pub player2_score: Option<i64>,
}

impl MatchCompleted {
    /// Score of `identity` if they are one of the two players
    pub fn score_for(&self, identity: &Identity) -> Option<i64> {
        if self.player1.as_deref() == Some(identity.as_str()) {
            self.player1_score
        } else if self.player2.as_deref() == Some(identity.as_str()) {
            self.player2_score
        } else {
            None
        }
    }
}

/// Payloads on the room topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelMessage {
    #[serde(rename_all = "camelCase")]
    Chat {
        content: String,
        #[serde(default)]
        room_code: Option<String>,
        sender_username: String,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        sender_username: String,
        #[serde(default)]
        room_code: Option<String>,
    },
}

impl ChannelMessage {
    pub fn chat(room_code: &str, sender: &Identity, content: impl Into<String>) -> Self {
        Self::Chat {
            content: content.into(),
            room_code: Some(room_code.to_string()),
            sender_username: sender.as_str().to_string(),
        }
    }

    pub fn typing(room_code: &str, sender: &Identity) -> Self {
        Self::Typing {
            sender_username: sender.as_str().to_string(),
            room_code: Some(room_code.to_string()),
        }
    }
}

/// Payloads on the status topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusMessage {
    #[serde(rename_all = "camelCase")]
    PlayerJoined { username: String, player_count: u32 },
    StartMatch,
    MatchCompleted(MatchCompleted),
}

/// Body of the start control message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    pub room_code: String,
}

const CHANNEL_TYPES: &[&str] = &["CHAT", "TYPING"];
const STATUS_EVENTS: &[&str] = &["PLAYER_JOINED", "START_MATCH", "MATCH_COMPLETED"];

/// Every event a room view reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    PlayerJoined { username: String, count: u32 },
    StartMatch,
    MatchCompleted(MatchCompleted),
    Typing { sender: Identity },
    Chat { sender: Identity, content: String },
}

impl RoomEvent {
    /// Classify a raw payload by its discriminator
    pub fn classify(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;

        if let Some(event) = value.get("event") {
            let name = event
                .as_str()
                .ok_or_else(|| ProtocolError::InvalidPayload("event is not a string".into()))?;
            if !STATUS_EVENTS.contains(&name) {
                return Err(ProtocolError::UnknownDiscriminator(name.to_string()));
            }
            let message: StatusMessage = serde_json::from_value(value)
                .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
            return Ok(message.into());
        }

        if let Some(kind) = value.get("type") {
            let name = kind
                .as_str()
                .ok_or_else(|| ProtocolError::InvalidPayload("type is not a string".into()))?;
            if !CHANNEL_TYPES.contains(&name) {
                return Err(ProtocolError::UnknownDiscriminator(name.to_string()));
            }
            let message: ChannelMessage = serde_json::from_value(value)
                .map_err(|e| ProtocolError::InvalidPayload(e.to_string()))?;
            return Ok(message.into());
        }

        Err(ProtocolError::MissingDiscriminator)
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerJoined { .. } => "player_joined",
            Self::StartMatch => "start_match",
            Self::MatchCompleted(_) => "match_completed",
            Self::Typing { .. } => "typing",
            Self::Chat { .. } => "chat",
        }
    }
}

impl From<StatusMessage> for RoomEvent {
    fn from(message: StatusMessage) -> Self {
        match message {
            StatusMessage::PlayerJoined {
                username,
                player_count,
            } => Self::PlayerJoined {
                username,
                count: player_count,
            },
            StatusMessage::StartMatch => Self::StartMatch,
            StatusMessage::MatchCompleted(result) => Self::MatchCompleted(result),
        }
    }
}

impl From<ChannelMessage> for RoomEvent {
    fn from(message: ChannelMessage) -> Self {
        match message {
            ChannelMessage::Chat {
                content,
                sender_username,
                ..
            } => Self::Chat {
                sender: Identity::new(sender_username),
                content,
            },
            ChannelMessage::Typing {
                sender_username, ..
            } => Self::Typing {
                sender: Identity::new(sender_username),
            },
        }
    }
}
