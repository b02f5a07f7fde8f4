//! Request/response collaborators of the room view
//!
//! Only three calls matter here: fetch the authoritative room status, end the
//! test session, and load stored chat history.

mod http;
mod mock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use http::HttpRoomApi;
pub use mock::MockRoomApi;

use super::session::MatchResult;
use crate::chat::ChatMessage;
use crate::error::{ApiError, PollError};

/// Authoritative room status as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatusKind {
    Waiting,
    Active,
    Completed,
    #[serde(other)]
    Unknown,
}

/// Snapshot of the authoritative room record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStatus {
    pub status: RoomStatusKind,
    pub winner: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub expiry_duration_seconds: Option<i64>,
    pub created_by: Option<String>,
    pub joined_by: Option<String>,
}

impl RoomStatus {
    pub fn new(status: RoomStatusKind) -> Self {
        Self {
            status,
            winner: None,
            started_at: None,
            expiry_duration_seconds: None,
            created_by: None,
            joined_by: None,
        }
    }

    #[must_use]
    pub fn with_start(mut self, started_at: DateTime<Utc>, expiry_minutes: i64) -> Self {
        self.started_at = Some(started_at);
        self.expiry_duration_seconds = Some(minutes_to_seconds(expiry_minutes));
        self
    }

    #[must_use]
    pub fn with_expiry_minutes(mut self, expiry_minutes: i64) -> Self {
        self.expiry_duration_seconds = Some(minutes_to_seconds(expiry_minutes));
        self
    }

    #[must_use]
    pub fn with_players(mut self, created_by: &str, joined_by: Option<&str>) -> Self {
        self.created_by = Some(created_by.to_string());
        self.joined_by = joined_by.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_winner(mut self, winner: &str) -> Self {
        self.winner = Some(winner.to_string());
        self
    }

    /// Final result, only once the room is completed
    pub fn result(&self) -> Option<MatchResult> {
        (self.status == RoomStatusKind::Completed)
            .then(|| MatchResult::from_winner(self.winner.as_deref()))
    }

    /// Decode a `GET /rooms/{code}` response body
    pub fn from_response(body: &str) -> Result<Self, PollError> {
        let envelope: Envelope<RoomDetails> =
            serde_json::from_str(body).map_err(|e| PollError::Decode(e.to_string()))?;
        if !envelope.success {
            return Err(PollError::Decode(
                envelope
                    .message
                    .unwrap_or_else(|| "request unsuccessful".to_string()),
            ));
        }
        let details = envelope
            .data
            .ok_or_else(|| PollError::Decode("response has no data".to_string()))?;
        Ok(details.into())
    }
}

/// `{success, message, data}` wrapper used by the REST API
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "default_success")]
    success: bool,
    message: Option<String>,
    data: Option<T>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomDetails {
    status: RoomStatusKind,
    #[serde(default)]
    winner: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    started_at: Option<DateTime<Utc>>,
    /// Minutes
    #[serde(default)]
    expiry_duration: Option<i64>,
    #[serde(default)]
    created_by_name: Option<String>,
    #[serde(default)]
    joined_by_name: Option<String>,
}

impl From<RoomDetails> for RoomStatus {
    fn from(details: RoomDetails) -> Self {
        Self {
            status: details.status,
            winner: details.winner,
            started_at: details.started_at,
            expiry_duration_seconds: details.expiry_duration.map(minutes_to_seconds),
            created_by: details.created_by_name,
            joined_by: details.joined_by_name,
        }
    }
}

fn minutes_to_seconds(minutes: i64) -> i64 {
    minutes.saturating_mul(60)
}

/// Accepts RFC 3339, zone-less ISO-8601 (taken as UTC) or epoch milliseconds
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp {raw:?}"))),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid epoch millis {n}"))),
        Some(other) => Err(de::Error::custom(format!("invalid timestamp {other}"))),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc()))
}

/// Chat history is served either bare or wrapped
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryBody {
    List(Vec<ChatMessage>),
    Wrapped { data: Vec<ChatMessage> },
}

/// Decode a `GET /chat/history/{code}` response body
pub fn parse_history(body: &str) -> Result<Vec<ChatMessage>, ApiError> {
    match serde_json::from_str::<HistoryBody>(body) {
        Ok(HistoryBody::List(messages)) | Ok(HistoryBody::Wrapped { data: messages }) => {
            Ok(messages)
        }
        Err(e) => Err(ApiError::Deserialize(e.to_string())),
    }
}

/// Room collaborator calls
#[async_trait]
pub trait RoomApi: Send + Sync {
    /// Authoritative status of a room
    async fn fetch_status(&self, room_code: &str) -> Result<RoomStatus, PollError>;

    /// Ask the backend to end the test session
    async fn end_session(&self, room_code: &str) -> Result<(), ApiError>;

    /// Stored chat for a room, oldest first
    async fn chat_history(&self, room_code: &str) -> Result<Vec<ChatMessage>, ApiError>;
}
