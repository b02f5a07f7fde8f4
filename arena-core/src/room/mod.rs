//! Room lifecycle
//!
//! Session state, the countdown, the authoritative request/response client,
//! the fallback poller, the lifecycle coordinator and the async view that
//! drives them together.

pub mod api;
pub mod coordinator;
pub mod countdown;
pub mod poller;
pub mod runtime;
pub mod session;

pub use api::{HttpRoomApi, MockRoomApi, RoomApi, RoomStatus, RoomStatusKind};
pub use coordinator::{Action, EndTrigger, LifecycleSnapshot, Moment, RoomLifecycleCoordinator};
pub use countdown::Countdown;
pub use poller::FallbackPoller;
pub use runtime::{RoomSnapshot, RoomUpdate, RoomView};
pub use session::{
    CompletionSource, MAX_PARTICIPANTS, MatchResult, OneShotLatch, Outcome, RoomPhase, Session,
    WriteOnce,
};
