//! In-process STOMP broker
//!
//! Speaks the same frame protocol as the platform broker and routes the
//! platform's application destinations onto its room topics, so two clients
//! attached to one [`MemoryBroker`] see each other's chat, typing and start
//! messages. Tests use the control methods to inject lifecycle events, drop
//! connections and refuse handshakes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Command, Frame, Link, Transport};
use crate::error::ConnectionError;

/// Shared in-memory broker; clones refer to the same broker
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

#[derive(Debug, Default)]
struct BrokerState {
    refuse: bool,
    mute: bool,
    next_session: u64,
    next_message: u64,
    sessions: HashMap<u64, BrokerSession>,
    sent: Vec<Frame>,
    handshakes: usize,
    authorizations: Vec<String>,
}

#[derive(Debug)]
struct BrokerSession {
    tx: mpsc::UnboundedSender<Frame>,
    connected: bool,
    /// subscription id -> destination
    subscriptions: HashMap<String, String>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `body` to every subscriber of `destination`; returns the number of deliveries
    pub fn publish(&self, destination: &str, body: impl Into<String>) -> usize {
        let body = body.into();
        self.lock().deliver(destination, &body)
    }

    /// Close every open link from the broker side
    pub fn drop_connections(&self) {
        let mut state = self.lock();
        let dropped = state.sessions.len();
        state.sessions.clear();
        debug!(dropped, "Memory broker dropped all connections");
    }

    /// Make `open` fail until re-enabled
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse = refuse;
    }

    /// Swallow CONNECT frames without replying
    pub fn mute_handshakes(&self, mute: bool) {
        self.lock().mute = mute;
    }

    /// Bodies of every SEND frame addressed to `destination`, in arrival order
    pub fn sent_to(&self, destination: &str) -> Vec<String> {
        self.lock()
            .sent
            .iter()
            .filter(|f| f.get("destination") == Some(destination))
            .map(|f| f.body.clone())
            .collect()
    }

    /// Every SEND frame received
    pub fn sent_frames(&self) -> Vec<Frame> {
        self.lock().sent.clone()
    }

    /// Number of live subscriptions to `destination` across all connections
    pub fn subscriber_count(&self, destination: &str) -> usize {
        self.lock()
            .sessions
            .values()
            .filter(|s| s.connected)
            .flat_map(|s| s.subscriptions.values())
            .filter(|d| d.as_str() == destination)
            .count()
    }

    /// Number of connections that completed the handshake and are still open
    pub fn connection_count(&self) -> usize {
        self.lock().sessions.values().filter(|s| s.connected).count()
    }

    /// Number of CONNECT frames seen
    pub fn handshake_count(&self) -> usize {
        self.lock().handshakes
    }

    /// Authorization header of the most recent accepted handshake
    pub fn last_authorization(&self) -> Option<String> {
        self.lock().authorizations.last().cloned()
    }

    fn handle(&self, session_id: u64, frame: Frame) {
        let mut state = self.lock();
        match frame.command {
            Command::Connect | Command::Stomp => state.handshake(session_id, &frame),
            Command::Subscribe => {
                if let (Some(id), Some(destination)) = (frame.get("id"), frame.get("destination"))
                    && let Some(session) = state.sessions.get_mut(&session_id)
                {
                    session
                        .subscriptions
                        .insert(id.to_string(), destination.to_string());
                }
            }
            Command::Unsubscribe => {
                if let Some(id) = frame.get("id")
                    && let Some(session) = state.sessions.get_mut(&session_id)
                {
                    session.subscriptions.remove(id);
                }
            }
            Command::Send => {
                let routed = frame
                    .get("destination")
                    .map(|d| route(d, &frame.body))
                    .unwrap_or_default();
                state.sent.push(frame);
                for (destination, body) in routed {
                    state.deliver(&destination, &body);
                }
            }
            Command::Disconnect => {
                state.sessions.remove(&session_id);
            }
            other => debug!(command = %other, "Memory broker ignoring client frame"),
        }
    }

    async fn serve(self, session_id: u64, mut rx: mpsc::UnboundedReceiver<Frame>) {
        while let Some(frame) = rx.recv().await {
            self.handle(session_id, frame);
        }
        self.lock().sessions.remove(&session_id);
    }
}

impl BrokerState {
    fn handshake(&mut self, session_id: u64, frame: &Frame) {
        self.handshakes += 1;
        if self.mute {
            return;
        }
        match frame.get("Authorization") {
            Some(auth) if auth.starts_with("Bearer ") => {
                self.authorizations.push(auth.to_string());
                if let Some(session) = self.sessions.get_mut(&session_id) {
                    session.connected = true;
                    let _ = session
                        .tx
                        .send(Frame::new(Command::Connected).header("version", "1.2"));
                }
            }
            _ => {
                if let Some(session) = self.sessions.remove(&session_id) {
                    let _ = session.tx.send(
                        Frame::new(Command::Error)
                            .header("message", "Missing bearer credential")
                            .body("Unauthorized"),
                    );
                }
            }
        }
    }

    fn deliver(&mut self, destination: &str, body: &str) -> usize {
        let Self {
            sessions,
            next_message,
            ..
        } = self;
        let mut delivered = 0;
        for session in sessions.values().filter(|s| s.connected) {
            for (sub_id, dest) in &session.subscriptions {
                if dest != destination {
                    continue;
                }
                *next_message += 1;
                let frame = Frame::new(Command::Message)
                    .header("destination", destination)
                    .header("subscription", sub_id.as_str())
                    .header("message-id", format!("mem-{next_message}"))
                    .header("content-type", "application/json")
                    .body(body);
                if session.tx.send(frame).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }
}

/// Where the platform broadcasts what a client sends to an application destination
fn route(destination: &str, body: &str) -> Vec<(String, String)> {
    let room_code = || {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("roomCode").and_then(Value::as_str).map(str::to_string))
    };

    if destination == "/app/chat.sendMessage" {
        room_code()
            .map(|code| vec![(format!("/topic/room/{code}"), body.to_string())])
            .unwrap_or_default()
    } else if let Some(code) = destination.strip_prefix("/app/chat.typing/") {
        vec![(format!("/topic/room/{code}"), body.to_string())]
    } else if destination == "/app/room/start" {
        room_code()
            .map(|code| {
                vec![(
                    format!("/topic/room/{code}/status"),
                    r#"{"event":"START_MATCH"}"#.to_string(),
                )]
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn open(&self, _endpoint: &str) -> Result<Link, ConnectionError> {
        let (client_tx, broker_rx) = mpsc::unbounded_channel();
        let (broker_tx, client_rx) = mpsc::unbounded_channel();

        let session_id = {
            let mut state = self.lock();
            if state.refuse {
                return Err(ConnectionError::Transport("connection refused".to_string()));
            }
            state.next_session += 1;
            let id = state.next_session;
            state.sessions.insert(
                id,
                BrokerSession {
                    tx: broker_tx,
                    connected: false,
                    subscriptions: HashMap::new(),
                },
            );
            id
        };

        tokio::spawn(self.clone().serve(session_id, broker_rx));

        Ok(Link {
            outgoing: client_tx,
            incoming: client_rx,
        })
    }
}
