//! arena-core: real-time room synchronization for the code arena client
//!
//! Two competitors in a room must agree on one lifecycle (waiting, ready,
//! active, ending, completed) even though events reach them over an
//! unreliable push channel. This crate provides:
//!
//! - **Push connection** - [`ConnectionManager`] opens an authenticated STOMP
//!   connection and hands out one owned [`ConnectionHandle`] with
//!   subscribe/publish and automatic reconnect
//! - **Event routing** - [`RoomEventRouter`] turns raw topic payloads into the
//!   closed [`RoomEvent`] union
//! - **Chat** - [`ChatSession`] keeps the message log, typing indicators and
//!   unread badge
//! - **Fallback polling** - [`FallbackPoller`] re-fetches authoritative status
//!   while push delivery cannot be trusted
//! - **Lifecycle** - [`RoomLifecycleCoordinator`] merges every input into one
//!   monotonic phase with exactly-once end and completion
//! - **Room view** - [`RoomView`] runs all of the above for one room and hands
//!   the connection on when the view is left
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use arena_core::{ArenaConfig, BearerToken, ConnectionManager, HttpRoomApi, RoomView};
//!
//! async fn example(raw_token: String) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ArenaConfig::default();
//!     let token = BearerToken::parse(raw_token)?;
//!
//!     let api = Arc::new(HttpRoomApi::new(&config.api, &token)?);
//!     let handle = ConnectionManager::websocket(&config).connect(token).await?;
//!
//!     let view = RoomView::enter(handle, api, "AB12", &config.room);
//!     view.send_chat("good luck").await?;
//!     view.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ConnectionManager ──> RoomEventRouter ──┬──> ChatSession
//!                                         └──> RoomLifecycleCoordinator
//! FallbackPoller ────────────────────────────> RoomLifecycleCoordinator
//! ```

pub mod auth;
pub mod chat;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod room;
pub mod transport;

// Re-export key types for convenience
pub use auth::{AuthError, BearerToken, Identity};
pub use chat::{ChatMessage, ChatSession, TypingTracker, UnreadCounter};
pub use config::{ApiConfig, ArenaConfig, ReconnectConfig, ReconnectMode, RoomConfig, TransportConfig};
pub use connection::{
    ConnectionHandle, ConnectionManager, ConnectionState, Delivery, ReconnectPolicy, Subscription,
};
pub use error::{
    ActionError, ApiError, ArenaError, ConnectionError, PollError, ProtocolError, Result,
    TerminalConflict,
};
pub use events::{MatchCompleted, RoomEvent, RoomEventRouter, Topics};
pub use room::{
    FallbackPoller, HttpRoomApi, MatchResult, MockRoomApi, Outcome, RoomApi, RoomLifecycleCoordinator,
    RoomPhase, RoomSnapshot, RoomStatus, RoomUpdate, RoomView,
};
pub use transport::{MemoryBroker, Transport, WsTransport};
