//! Push connection lifecycle
//!
//! [`ConnectionManager::connect`] performs the first handshake and spawns a
//! supervisor task that owns the link, the subscription table and the
//! reconnect loop. The returned [`ConnectionHandle`] talks to the supervisor
//! over a channel, so no state is shared behind locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::policy::{ReconnectPolicy, ReconnectSchedule};
use crate::auth::{BearerToken, Identity};
use crate::config::{ArenaConfig, TransportConfig};
use crate::error::{ArenaError, ConnectionError};
use crate::transport::{Command, Frame, Link, Transport, WsTransport};

/// Connection state as seen by the handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Result of a fire-and-forget publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the live link
    Sent,
    /// Not connected (or not serializable); nothing was queued
    Dropped,
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Callback receiving the raw body of each message on a topic
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

enum Request {
    Subscribe {
        topic: String,
        handler_id: u64,
        handler: MessageHandler,
    },
    Unsubscribe {
        topic: String,
        handler_id: u64,
    },
    Publish {
        destination: String,
        body: String,
    },
}

/// Opens push connections
pub struct ConnectionManager {
    config: TransportConfig,
    policy: ReconnectPolicy,
    transport: Arc<dyn Transport>,
}

impl ConnectionManager {
    pub fn new(config: TransportConfig, policy: ReconnectPolicy, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            policy,
            transport,
        }
    }

    /// Manager over the real WebSocket transport
    pub fn websocket(config: &ArenaConfig) -> Self {
        Self::with_transport(config, Arc::new(WsTransport::new()))
    }

    pub fn with_transport(config: &ArenaConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(config.transport.clone(), config.reconnect.policy(), transport)
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Handshake with the broker and start supervising the connection
    ///
    /// The credential is captured here and reused for every reconnect; it is
    /// never refreshed for the lifetime of the handle.
    pub async fn connect(&self, token: BearerToken) -> Result<ConnectionHandle, ArenaError> {
        token.ensure_fresh(Utc::now())?;

        info!(
            endpoint = %self.config.endpoint,
            identity = %token.identity(),
            "Connecting push channel"
        );
        let link = open_link(self.transport.as_ref(), &self.config, &token).await?;
        info!(endpoint = %self.config.endpoint, "Push channel connected");

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let identity = token.identity().clone();

        let supervisor = Supervisor {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            token,
            schedule: ReconnectSchedule::new(self.policy.clone()),
            link: Some(link),
            topics: HashMap::new(),
            next_subscription: 0,
            requests: requests_rx,
            state_tx,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(supervisor.run());

        Ok(ConnectionHandle {
            identity,
            requests: requests_tx,
            state: state_rx,
            next_handler: AtomicU64::new(0),
            shutdown,
            task: Some(task),
        })
    }
}

/// Open a link and complete the STOMP handshake within the configured timeout
async fn open_link(
    transport: &dyn Transport,
    config: &TransportConfig,
    token: &BearerToken,
) -> Result<Link, ConnectionError> {
    tokio::time::timeout(config.handshake_timeout(), handshake(transport, config, token))
        .await
        .map_err(|_| ConnectionError::HandshakeTimeout {
            endpoint: config.endpoint.clone(),
            timeout_ms: config.handshake_timeout_ms,
        })?
}

async fn handshake(
    transport: &dyn Transport,
    config: &TransportConfig,
    token: &BearerToken,
) -> Result<Link, ConnectionError> {
    let mut link = transport.open(&config.endpoint).await?;
    if !link.send(Frame::connect(&token.authorization())) {
        return Err(ConnectionError::Closed);
    }

    while let Some(frame) = link.incoming.recv().await {
        match frame.command {
            Command::Connected => return Ok(link),
            Command::Error => {
                let reason = frame
                    .get("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.body.clone());
                return Err(ConnectionError::Rejected(reason));
            }
            other => debug!(command = %other, "Ignoring frame before CONNECTED"),
        }
    }
    Err(ConnectionError::Closed)
}

struct TopicEntry {
    subscription_id: String,
    handlers: Vec<(u64, MessageHandler)>,
}

/// Task owning the live link
struct Supervisor {
    config: TransportConfig,
    transport: Arc<dyn Transport>,
    token: BearerToken,
    schedule: ReconnectSchedule,
    link: Option<Link>,
    topics: HashMap<String, TopicEntry>,
    next_subscription: u64,
    requests: mpsc::UnboundedReceiver<Request>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl Supervisor {
    async fn run(mut self) {
        while self.serve_link().await && self.reconnect().await {}
        self.close();
    }

    /// Pump the live link; true when it was lost, false on shutdown
    async fn serve_link(&mut self) -> bool {
        loop {
            let Some(link) = self.link.as_mut() else {
                return true;
            };
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                request = self.requests.recv() => match request {
                    Some(request) => self.apply(request),
                    None => return false,
                },
                frame = link.incoming.recv() => match frame {
                    Some(frame) => self.dispatch(frame),
                    None => {
                        warn!(endpoint = %self.config.endpoint, "Push channel lost");
                        self.link = None;
                        self.set_state(ConnectionState::Disconnected);
                        return true;
                    }
                },
            }
        }
    }

    /// Retry until a link is back; false on shutdown
    async fn reconnect(&mut self) -> bool {
        loop {
            let delay = self.schedule.next_delay();
            debug!(
                attempt = self.schedule.attempts(),
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            if !self.wait(delay).await {
                return false;
            }

            if let Err(e) = self.token.ensure_fresh(Utc::now()) {
                warn!(error = %e, "Credential expired; reconnect needs a fresh connect");
                continue;
            }

            self.set_state(ConnectionState::Connecting);
            let result = tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                result = open_link(self.transport.as_ref(), &self.config, &self.token) => result,
            };

            match result {
                Ok(link) => {
                    info!(
                        attempts = self.schedule.attempts(),
                        "Push channel reconnected"
                    );
                    self.link = Some(link);
                    self.schedule.reset();
                    self.resubscribe();
                    self.set_state(ConnectionState::Connected);
                    return true;
                }
                Err(e) => {
                    warn!(attempt = self.schedule.attempts(), error = %e, "Reconnect failed");
                    self.set_state(ConnectionState::Disconnected);
                }
            }
        }
    }

    /// Sleep while still applying requests; false on shutdown
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = &mut sleep => return true,
                request = self.requests.recv() => match request {
                    Some(request) => self.apply(request),
                    None => return false,
                },
            }
        }
    }

    fn apply(&mut self, request: Request) {
        match request {
            Request::Subscribe {
                topic,
                handler_id,
                handler,
            } => {
                if let Some(entry) = self.topics.get_mut(&topic) {
                    entry.handlers.push((handler_id, handler));
                    return;
                }
                let subscription_id = format!("sub-{}", self.next_subscription);
                self.next_subscription += 1;
                if let Some(link) = &self.link {
                    link.send(Frame::subscribe(
                        &subscription_id,
                        &self.config.topic_destination(&topic),
                    ));
                }
                debug!(%topic, %subscription_id, "Subscribed");
                self.topics.insert(
                    topic,
                    TopicEntry {
                        subscription_id,
                        handlers: vec![(handler_id, handler)],
                    },
                );
            }
            Request::Unsubscribe { topic, handler_id } => {
                let Some(entry) = self.topics.get_mut(&topic) else {
                    return;
                };
                entry.handlers.retain(|(id, _)| *id != handler_id);
                if entry.handlers.is_empty()
                    && let Some(entry) = self.topics.remove(&topic)
                {
                    if let Some(link) = &self.link {
                        link.send(Frame::unsubscribe(&entry.subscription_id));
                    }
                    debug!(%topic, "Unsubscribed");
                }
            }
            Request::Publish { destination, body } => match &self.link {
                Some(link) => {
                    link.send(Frame::send(&self.config.app_destination(&destination), body));
                }
                None => debug!(%destination, "Link lost before publish; dropped"),
            },
        }
    }

    fn dispatch(&self, frame: Frame) {
        match frame.command {
            Command::Message => {
                let by_id = frame
                    .get("subscription")
                    .and_then(|id| self.topics.values().find(|e| e.subscription_id == id));
                let entry = by_id.or_else(|| {
                    frame
                        .get("destination")
                        .and_then(|d| d.strip_prefix(self.config.topic_prefix.as_str()))
                        .and_then(|topic| self.topics.get(topic))
                });
                match entry {
                    Some(entry) => {
                        for (_, handler) in &entry.handlers {
                            handler(&frame.body);
                        }
                    }
                    None => debug!(
                        destination = frame.get("destination").unwrap_or_default(),
                        "Message for unknown subscription"
                    ),
                }
            }
            Command::Error => warn!(
                message = frame.get("message").unwrap_or_default(),
                "Broker reported an error"
            ),
            Command::Receipt | Command::Connected => {}
            other => debug!(command = %other, "Ignoring unexpected frame"),
        }
    }

    /// Re-issue SUBSCRIBE for every active topic on a fresh link
    fn resubscribe(&self) {
        let Some(link) = &self.link else {
            return;
        };
        for (topic, entry) in &self.topics {
            link.send(Frame::subscribe(
                &entry.subscription_id,
                &self.config.topic_destination(topic),
            ));
        }
        debug!(topics = self.topics.len(), "Resubscribed");
    }

    fn close(&mut self) {
        if let Some(link) = self.link.take() {
            link.send(Frame::disconnect());
        }
        self.topics.clear();
        self.set_state(ConnectionState::Disconnected);
        info!(endpoint = %self.config.endpoint, "Push channel closed");
    }

    fn set_state(&self, new_state: ConnectionState) {
        let old = self.state_tx.send_replace(new_state);
        if old != new_state {
            debug!("Connection state: {:?} -> {:?}", old, new_state);
        }
    }
}

/// Owned reference to one live push connection
///
/// Not `Clone`: exactly one owner at a time. Dropping the handle tears the
/// connection down.
pub struct ConnectionHandle {
    identity: Identity,
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ConnectionState>,
    next_handler: AtomicU64,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    /// Identity the credential was issued to
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        if self.shutdown.is_cancelled() {
            return ConnectionState::Disconnected;
        }
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watch connection state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Add a handler for `topic` (without the broker prefix)
    ///
    /// Handlers are additive: every handler on a topic receives every message.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let handler_id = self.next_handler.fetch_add(1, Ordering::Relaxed);
        let _ = self.requests.send(Request::Subscribe {
            topic: topic.clone(),
            handler_id,
            handler: Arc::new(handler),
        });
        Subscription {
            topic,
            handler_id,
            requests: self.requests.clone(),
            active: true,
        }
    }

    /// Fire-and-forget publish to an application destination (without prefix)
    ///
    /// Dropped when not connected; never queued or retried.
    pub fn publish<T: Serialize + ?Sized>(&self, destination: &str, payload: &T) -> Delivery {
        if !self.is_connected() {
            debug!(%destination, "Not connected; publish dropped");
            return Delivery::Dropped;
        }
        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(%destination, error = %e, "Failed to serialize payload");
                return Delivery::Dropped;
            }
        };
        let request = Request::Publish {
            destination: destination.to_string(),
            body,
        };
        match self.requests.send(request) {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::Dropped,
        }
    }

    /// Deactivate the connection and drop every subscription. Idempotent.
    pub fn teardown(&mut self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!(identity = %self.identity, "Tearing down push channel");
        self.shutdown.cancel();
    }

    /// Tear down and wait for the supervisor to finish
    pub async fn close(mut self) {
        self.teardown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Registration of one handler; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    topic: String,
    handler_id: u64,
    requests: mpsc::UnboundedSender<Request>,
    active: bool,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let _ = self.requests.send(Request::Unsubscribe {
            topic: std::mem::take(&mut self.topic),
            handler_id: self.handler_id,
        });
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("handler_id", &self.handler_id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
