//! Demultiplexes one room's push traffic into typed events

use tokio::sync::mpsc;
use tracing::debug;

use super::types::{RoomEvent, Topics};
use crate::auth::Identity;
use crate::connection::{ConnectionHandle, Subscription};

/// Typed event stream for one room
///
/// Subscribes to the room topic and the status topic. Events arrive in
/// transport delivery order, duplicates included. Unrecognised payloads are
/// logged and skipped, as are typing events from the local identity.
/// Dropping the router unsubscribes both topics.
#[derive(Debug)]
pub struct RoomEventRouter {
    room_code: String,
    events: mpsc::UnboundedReceiver<RoomEvent>,
    _subscriptions: Vec<Subscription>,
}

impl RoomEventRouter {
    pub fn attach(handle: &ConnectionHandle, room_code: &str) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let local = handle.identity().clone();

        let subscriptions = [Topics::room(room_code), Topics::status(room_code)]
            .into_iter()
            .map(|topic| {
                let tx = tx.clone();
                let local = local.clone();
                let source = topic.clone();
                handle.subscribe(topic, move |raw: &str| {
                    if let Some(event) = route(&local, &source, raw) {
                        let _ = tx.send(event);
                    }
                })
            })
            .collect();

        debug!(room = %room_code, identity = %local, "Room event router attached");

        Self {
            room_code: room_code.to_string(),
            events,
            _subscriptions: subscriptions,
        }
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    /// Next event; `None` once the connection is torn down
    pub async fn next(&mut self) -> Option<RoomEvent> {
        self.events.recv().await
    }
}

/// Classify a raw payload and apply the own-typing filter
pub fn route(local: &Identity, topic: &str, raw: &str) -> Option<RoomEvent> {
    match RoomEvent::classify(raw) {
        Ok(RoomEvent::Typing { sender }) if sender == *local => None,
        Ok(event) => Some(event),
        Err(e) => {
            debug!(%topic, error = %e, "Ignoring unrecognised payload");
            None
        }
    }
}
