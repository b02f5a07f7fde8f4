//! Error types for arena-core

use thiserror::Error;

use crate::auth::AuthError;

/// Top-level error type for arena-core
#[derive(Error, Debug)]
pub enum ArenaError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Poll error: {0}")]
    Poll(#[from] PollError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Action rejected: {0}")]
    Action(#[from] ActionError),
}

/// Result alias for arena-core operations
pub type Result<T> = std::result::Result<T, ArenaError>;

/// Errors from the push transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Handshake with {endpoint} did not complete within {timeout_ms}ms")]
    HandshakeTimeout { endpoint: String, timeout_ms: u64 },

    #[error("Broker rejected connection: {0}")]
    Rejected(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Connection closed")]
    Closed,
}

/// Payloads or frames that could not be understood
///
/// Never fatal: the router logs and drops whatever produced one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Unrecognized discriminator: {0}")]
    UnknownDiscriminator(String),

    #[error("Payload has no discriminator field")]
    MissingDiscriminator,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Failure to fetch authoritative room status
///
/// Retried on the next poll interval, never surfaced individually.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("Status request failed: {0}")]
    Request(String),

    #[error("Status request returned HTTP {status}")]
    Status { status: u16 },

    #[error("Could not decode status response: {0}")]
    Decode(String),
}

/// Failures of the other request/response collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

/// Synchronous rejection of a user-triggered action
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Match cannot start while the room is {phase}")]
    NotReady { phase: String },

    #[error("Only the room creator can start the match")]
    NotCreator,

    #[error("Cannot end the session while the room is {phase}")]
    NotActive { phase: String },

    #[error("Not connected to the room channel")]
    NotConnected,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Room view has been closed")]
    ViewClosed,
}

/// A second write to a write-once terminal field
///
/// Resolved first-writer-wins: the rejected value is dropped and the conflict
/// is only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Terminal value already set to {kept}, dropped {rejected}")]
pub struct TerminalConflict {
    pub kept: String,
    pub rejected: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_handshake_timeout_displays_endpoint() {
        let error = ConnectionError::HandshakeTimeout {
            endpoint: "ws://localhost:8080/ws-connect".to_string(),
            timeout_ms: 10_000,
        };
        assert!(error.to_string().contains("ws://localhost:8080/ws-connect"));
        assert!(error.to_string().contains("10000ms"));
    }

    #[test]
    fn protocol_error_unknown_discriminator_displays_value() {
        let error = ProtocolError::UnknownDiscriminator("ROUND_STARTED".to_string());
        assert!(error.to_string().contains("ROUND_STARTED"));
    }

    #[test]
    fn poll_error_status_displays_code() {
        let error = PollError::Status { status: 503 };
        assert!(error.to_string().contains("503"));
    }

    #[test]
    fn action_error_not_ready_mentions_phase() {
        let error = ActionError::NotReady {
            phase: "WAITING".to_string(),
        };
        assert!(error.to_string().contains("WAITING"));
    }

    #[test]
    fn terminal_conflict_displays_both_values() {
        let conflict = TerminalConflict {
            kept: "alice".to_string(),
            rejected: "bob".to_string(),
        };
        let text = conflict.to_string();
        assert!(text.contains("alice"));
        assert!(text.contains("bob"));
    }

    #[test]
    fn arena_error_converts_from_connection_error() {
        let error: ArenaError = ConnectionError::Closed.into();
        assert!(matches!(error, ArenaError::Connection(ConnectionError::Closed)));
        assert!(error.to_string().contains("Connection error"));
    }

    #[test]
    fn arena_error_converts_from_auth_error() {
        let error: ArenaError = AuthError::MissingToken.into();
        assert!(matches!(error, ArenaError::Auth(_)));
    }

    #[test]
    fn arena_error_converts_from_action_error() {
        let error: ArenaError = ActionError::NotCreator.into();
        assert!(error.to_string().contains("Only the room creator"));
    }
}
