//! Room events
//!
//! Wire payloads, the closed [`RoomEvent`] union and the router that turns a
//! room's push traffic into a typed stream.

pub mod router;
pub mod types;

pub use router::RoomEventRouter;
pub use types::{
    ChannelMessage, MatchCompleted, RoomEvent, StartPayload, StatusMessage, Topics,
};
