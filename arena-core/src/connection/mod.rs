//! Push connection management

mod manager;
mod policy;

pub use manager::{
    ConnectionHandle, ConnectionManager, ConnectionState, Delivery, MessageHandler, Subscription,
};
pub use policy::{ReconnectPolicy, ReconnectSchedule};
