//! Room view runtime
//!
//! [`RoomView::enter`] takes ownership of a [`ConnectionHandle`] and spawns
//! one task that owns everything the view needs: the event router, the chat
//! session, the lifecycle coordinator, the fallback poller and the countdown
//! ticker. All inputs are handled one at a time by that task, so the
//! coordinator never needs a lock.
//!
//! Request/response calls (status fetch, end session, chat history) run as
//! child tasks so the view stays responsive while they are in flight.
//!
//! Leaving the view stops every timer and child task. [`RoomView::leave`]
//! hands the connection back for the next view; dropping the view instead
//! tears the connection down.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::api::{RoomApi, RoomStatus};
use super::coordinator::{Action, LifecycleSnapshot, Moment, RoomLifecycleCoordinator};
use super::poller::FallbackPoller;
use super::session::{Outcome, RoomPhase};
use crate::auth::Identity;
use crate::chat::{ChatMessage, ChatSession};
use crate::config::RoomConfig;
use crate::connection::{ConnectionHandle, ConnectionState, Delivery};
use crate::error::{ActionError, ApiError, PollError};
use crate::events::{ChannelMessage, RoomEvent, RoomEventRouter, StartPayload, Topics};

const UPDATE_CAPACITY: usize = 256;

/// Change notifications for front-ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomUpdate {
    Phase(RoomPhase),
    Countdown { remaining_secs: u64 },
    Connection(ConnectionState),
    PlayerJoined { username: String },
    Chat(ChatMessage),
    HistoryLoaded { count: usize },
    Typing(Vec<Identity>),
    Unread { count: usize, badge: Option<String> },
    Completed(Outcome),
    /// Transient, non-blocking notice for the user
    Notice(String),
}

/// Everything a front-end needs to render the room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSnapshot {
    pub lifecycle: LifecycleSnapshot,
    pub connection: ConnectionState,
    pub messages: Vec<ChatMessage>,
    pub typing: Vec<Identity>,
    pub unread: usize,
    pub unread_badge: Option<String>,
    pub chat_open: bool,
}

type Reply = oneshot::Sender<Result<(), ActionError>>;

enum Command {
    Start(Reply),
    End(Reply),
    Submitted(Reply),
    SendChat(String, Reply),
    Typing,
    OpenChat,
    CloseChat,
}

/// Result of a child request
enum Completion {
    Status(Result<RoomStatus, PollError>),
    History(Result<Vec<ChatMessage>, ApiError>),
    EndSession(Result<(), ApiError>),
}

/// Live view of one room
#[derive(Debug)]
pub struct RoomView {
    room_code: String,
    identity: Identity,
    commands: mpsc::UnboundedSender<Command>,
    updates: broadcast::Sender<RoomUpdate>,
    snapshot: watch::Receiver<RoomSnapshot>,
    cancel: CancellationToken,
    task: JoinHandle<ConnectionHandle>,
    _guard: DropGuard,
}

impl RoomView {
    /// Enter `room_code` on an already established connection
    pub fn enter(
        handle: ConnectionHandle,
        api: Arc<dyn RoomApi>,
        room_code: impl Into<String>,
        config: &RoomConfig,
    ) -> Self {
        let room_code = room_code.into();
        let identity = handle.identity().clone();
        let cancel = CancellationToken::new();
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);

        let router = RoomEventRouter::attach(&handle, &room_code);
        let chat = ChatSession::new(room_code.clone(), identity.clone(), config.typing_ttl());
        let coordinator = RoomLifecycleCoordinator::new(room_code.clone(), identity.clone());

        let (poll_tx, poll_results) = mpsc::unbounded_channel();
        let poller =
            FallbackPoller::spawn(api.clone(), room_code.clone(), config.poll_interval(), poll_tx);

        let connection_states = handle.state_changes();
        let mut actor = RoomActor {
            room_code: room_code.clone(),
            handle,
            api,
            router,
            router_open: true,
            chat,
            coordinator,
            poller: Some(poller),
            poll_results,
            tasks: JoinSet::new(),
            connection_states,
            watching_connection: true,
            commands,
            updates: updates.clone(),
            snapshot: None,
            tick_interval: config.tick_interval(),
        };
        let initial = actor.build_snapshot();
        let (snapshot_tx, snapshot) = watch::channel(initial);
        actor.snapshot = Some(snapshot_tx);

        actor.spawn_status_fetch();
        actor.spawn_history_fetch();

        info!(room = %room_code, identity = %identity, "Entered room view");
        let task = tokio::spawn(actor.run(cancel.clone()));

        Self {
            room_code,
            identity,
            commands: commands_tx,
            updates,
            snapshot,
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Creator's start action
    pub async fn start_match(&self) -> Result<(), ActionError> {
        self.request(Command::Start).await
    }

    /// Explicit end by the user
    pub async fn end_session(&self) -> Result<(), ActionError> {
        self.request(Command::End).await
    }

    /// Signal that the local submission has been accepted
    pub async fn submission_completed(&self) -> Result<(), ActionError> {
        self.request(Command::Submitted).await
    }

    pub async fn send_chat(&self, content: impl Into<String>) -> Result<(), ActionError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(ActionError::EmptyMessage);
        }
        self.request(|reply| Command::SendChat(content, reply)).await
    }

    pub fn notify_typing(&self) -> Result<(), ActionError> {
        self.send(Command::Typing)
    }

    pub fn open_chat(&self) -> Result<(), ActionError> {
        self.send(Command::OpenChat)
    }

    pub fn close_chat(&self) -> Result<(), ActionError> {
        self.send(Command::CloseChat)
    }

    /// Stream of changes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RoomUpdate> {
        self.updates.subscribe()
    }

    /// Current state
    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch the state; useful to wait for a condition
    pub fn snapshots(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshot.clone()
    }

    /// Leave the view and take the connection back for the next one
    ///
    /// Timers, the poller and room subscriptions are gone once this returns.
    pub async fn leave(self) -> Result<ConnectionHandle, ActionError> {
        let Self {
            room_code,
            cancel,
            task,
            _guard,
            ..
        } = self;
        cancel.cancel();
        let handle = task.await.map_err(|e| {
            warn!(room = %room_code, error = %e, "Room view task failed");
            ActionError::ViewClosed
        })?;
        info!(room = %room_code, "Left room view; connection handed off");
        Ok(handle)
    }

    /// Leave the view and tear the connection down
    pub async fn close(self) {
        if let Ok(handle) = self.leave().await {
            handle.close().await;
        }
    }

    fn send(&self, command: Command) -> Result<(), ActionError> {
        self.commands
            .send(command)
            .map_err(|_| ActionError::ViewClosed)
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<(), ActionError> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response.await.map_err(|_| ActionError::ViewClosed)?
    }
}

struct RoomActor {
    room_code: String,
    handle: ConnectionHandle,
    api: Arc<dyn RoomApi>,
    router: RoomEventRouter,
    router_open: bool,
    chat: ChatSession,
    coordinator: RoomLifecycleCoordinator,
    poller: Option<FallbackPoller>,
    poll_results: mpsc::UnboundedReceiver<RoomStatus>,
    tasks: JoinSet<Completion>,
    connection_states: watch::Receiver<ConnectionState>,
    watching_connection: bool,
    commands: mpsc::UnboundedReceiver<Command>,
    updates: broadcast::Sender<RoomUpdate>,
    snapshot: Option<watch::Sender<RoomSnapshot>>,
    tick_interval: Duration,
}

impl RoomActor {
    async fn run(mut self, cancel: CancellationToken) -> ConnectionHandle {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },

                event = self.router.next(), if self.router_open => match event {
                    Some(event) => self.on_event(event),
                    None => {
                        debug!(room = %self.room_code, "Room event stream ended");
                        self.router_open = false;
                    }
                },

                Some(status) = self.poll_results.recv() => self.on_status(status),

                Some(done) = self.tasks.join_next() => match done {
                    Ok(completion) => self.on_completion(completion),
                    Err(e) => warn!(room = %self.room_code, error = %e, "Room request task failed"),
                },

                expired = self.chat.next_typing_expiry() => {
                    debug!(room = %self.room_code, user = %expired, "Typing indicator expired");
                    self.emit(RoomUpdate::Typing(self.chat.typing_users()));
                },

                changed = self.connection_states.changed(), if self.watching_connection => {
                    match changed {
                        Ok(()) => {
                            let state = *self.connection_states.borrow_and_update();
                            self.emit(RoomUpdate::Connection(state));
                        }
                        Err(_) => self.watching_connection = false,
                    }
                },

                _ = ticker.tick() => self.on_tick(),
            }

            self.publish_snapshot();
        }

        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        self.tasks.abort_all();
        debug!(room = %self.room_code, "Room view stopped");

        let Self {
            handle, router, ..
        } = self;
        drop(router);
        handle
    }

    fn on_command(&mut self, command: Command) {
        let at = Moment::now();
        match command {
            Command::Start(reply) => {
                let connected = self.handle.is_connected();
                let result = self
                    .coordinator
                    .start(connected, at)
                    .map(|actions| self.execute(actions));
                self.reply(reply, result);
            }
            Command::End(reply) => {
                let result = self.coordinator.end().map(|actions| self.execute(actions));
                self.reply(reply, result);
            }
            Command::Submitted(reply) => {
                let result = self
                    .coordinator
                    .submission_completed()
                    .map(|actions| self.execute(actions));
                self.reply(reply, result);
            }
            Command::SendChat(content, reply) => {
                let message = ChannelMessage::chat(&self.room_code, self.handle.identity(), content);
                let result = match self.handle.publish(Topics::SEND_CHAT, &message) {
                    Delivery::Sent => Ok(()),
                    Delivery::Dropped => Err(ActionError::NotConnected),
                };
                self.reply(reply, result);
            }
            Command::Typing => {
                let message = ChannelMessage::typing(&self.room_code, self.handle.identity());
                if !self
                    .handle
                    .publish(&Topics::typing(&self.room_code), &message)
                    .is_sent()
                {
                    debug!(room = %self.room_code, "Typing notification dropped");
                }
            }
            Command::OpenChat => {
                self.chat.open();
                self.emit_unread();
            }
            Command::CloseChat => self.chat.close(),
        }
    }

    /// Publishes the snapshot first so the caller observes the action's effect
    fn reply(&self, reply: Reply, result: Result<(), ActionError>) {
        if let Err(e) = &result {
            debug!(room = %self.room_code, error = %e, "Action rejected");
        }
        self.publish_snapshot();
        let _ = reply.send(result);
    }

    fn on_event(&mut self, event: RoomEvent) {
        debug!(room = %self.room_code, kind = event.kind(), "Room event");
        match &event {
            RoomEvent::Chat { sender, content } => {
                self.chat.on_chat(sender.clone(), content.clone());
                self.emit(RoomUpdate::Chat(ChatMessage {
                    sender: sender.clone(),
                    content: content.clone(),
                }));
                self.emit_unread();
            }
            RoomEvent::Typing { sender } => {
                if self.chat.on_typing(sender.clone()) {
                    self.emit(RoomUpdate::Typing(self.chat.typing_users()));
                }
            }
            RoomEvent::PlayerJoined { username, .. } => {
                self.emit(RoomUpdate::PlayerJoined {
                    username: username.clone(),
                });
            }
            RoomEvent::StartMatch | RoomEvent::MatchCompleted(_) => {}
        }

        let actions = self.coordinator.on_event(&event, Moment::now());
        self.execute(actions);
    }

    fn on_status(&mut self, status: RoomStatus) {
        let actions = self.coordinator.on_poll(&status, Moment::now());
        self.execute(actions);
    }

    fn on_tick(&mut self) {
        let actions = self.coordinator.on_tick(Moment::now());
        self.execute(actions);
        if self.coordinator.phase() == RoomPhase::Active
            && let Some(countdown) = self.coordinator.countdown()
        {
            self.emit(RoomUpdate::Countdown {
                remaining_secs: countdown.remaining_secs(Instant::now()),
            });
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Status(Ok(status)) => self.on_status(status),
            Completion::Status(Err(e)) => {
                warn!(room = %self.room_code, error = %e, "Status fetch failed");
            }
            Completion::History(Ok(history)) => {
                let count = history.len();
                if self.chat.seed_history(history) {
                    debug!(room = %self.room_code, count, "Chat history loaded");
                    self.emit(RoomUpdate::HistoryLoaded { count });
                }
            }
            Completion::History(Err(e)) => {
                warn!(room = %self.room_code, error = %e, "Chat history unavailable");
            }
            Completion::EndSession(Ok(())) => {
                info!(room = %self.room_code, "End-session request accepted");
            }
            Completion::EndSession(Err(e)) => {
                warn!(room = %self.room_code, error = %e, "End-session request failed");
                self.emit(RoomUpdate::Notice(format!("Could not end the session: {e}")));
            }
        }
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::PublishStart => {
                    let payload = StartPayload {
                        room_code: self.room_code.clone(),
                    };
                    if !self.handle.publish(Topics::START, &payload).is_sent() {
                        warn!(room = %self.room_code, "Start message dropped");
                        self.emit(RoomUpdate::Notice(
                            "Start message could not be delivered".to_string(),
                        ));
                    }
                }
                Action::EndSession(trigger) => {
                    debug!(room = %self.room_code, ?trigger, "Requesting end of session");
                    self.spawn_end_session();
                }
                Action::FetchStatus => self.spawn_status_fetch(),
                Action::StopPolling => {
                    if let Some(poller) = self.poller.take() {
                        poller.stop();
                    }
                }
                Action::PhaseChanged(phase) => self.emit(RoomUpdate::Phase(phase)),
                Action::CountdownStarted { .. } => {
                    if let Some(countdown) = self.coordinator.countdown() {
                        self.emit(RoomUpdate::Countdown {
                            remaining_secs: countdown.remaining_secs(Instant::now()),
                        });
                    }
                }
                Action::Completed(outcome) => self.emit(RoomUpdate::Completed(outcome)),
            }
        }
    }

    fn spawn_status_fetch(&mut self) {
        let api = self.api.clone();
        let room_code = self.room_code.clone();
        self.tasks.spawn(async move {
            Completion::Status(api.fetch_status(&room_code).await)
        });
    }

    fn spawn_history_fetch(&mut self) {
        let api = self.api.clone();
        let room_code = self.room_code.clone();
        self.tasks.spawn(async move {
            Completion::History(api.chat_history(&room_code).await)
        });
    }

    fn spawn_end_session(&mut self) {
        let api = self.api.clone();
        let room_code = self.room_code.clone();
        self.tasks.spawn(async move {
            Completion::EndSession(api.end_session(&room_code).await)
        });
    }

    fn emit(&self, update: RoomUpdate) {
        let _ = self.updates.send(update);
    }

    fn emit_unread(&self) {
        self.emit(RoomUpdate::Unread {
            count: self.chat.unread(),
            badge: self.chat.unread_badge(),
        });
    }

    fn build_snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            lifecycle: self.coordinator.snapshot(Instant::now()),
            connection: self.handle.state(),
            messages: self.chat.messages().to_vec(),
            typing: self.chat.typing_users(),
            unread: self.chat.unread(),
            unread_badge: self.chat.unread_badge(),
            chat_open: self.chat.is_open(),
        }
    }

    fn publish_snapshot(&self) {
        if let Some(tx) = &self.snapshot {
            tx.send_replace(self.build_snapshot());
        }
    }
}
