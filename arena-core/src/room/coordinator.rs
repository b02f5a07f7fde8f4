//! Room lifecycle state machine
//!
//! [`RoomLifecycleCoordinator`] merges every input that can move a room
//! forward: push events, fallback poll results, countdown ticks and local
//! user actions. It performs no I/O. Each input returns the [`Action`]s the
//! caller must carry out, so the same merge logic runs identically in the
//! async runtime and in tests.
//!
//! Arrival order between sources is not assumed. Two guards make the result
//! order-independent:
//!
//! - the end latch ([`OneShotLatch`]) lets exactly one trigger issue the
//!   end-session request, however many times the timer, the user or a
//!   submission signal fire;
//! - the outcome slot ([`super::session::WriteOnce`]) keeps the first
//!   completion, from push or poll, and drops every later one.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use super::api::{RoomStatus, RoomStatusKind};
use super::countdown::Countdown;
use super::session::{
    CompletionSource, MAX_PARTICIPANTS, MatchResult, OneShotLatch, Outcome, RoomPhase, Session,
};
use crate::auth::Identity;
use crate::error::ActionError;
use crate::events::{MatchCompleted, RoomEvent};

/// A point in time on both clocks
///
/// The monotonic instant drives the countdown; the wall clock is only used
/// to interpret the authoritative start timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    pub instant: Instant,
    pub wall: DateTime<Utc>,
}

impl Moment {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            wall: Utc::now(),
        }
    }

    /// The same moment `by` later on both clocks
    pub fn advanced(self, by: Duration) -> Self {
        Self {
            instant: self.instant + by,
            wall: self.wall + chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero()),
        }
    }
}

/// What triggered the move to `ENDING`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndTrigger {
    Timer,
    User,
    Submission,
}

/// Side effect requested by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Publish the start control message
    PublishStart,
    /// Issue the authoritative end-session request
    EndSession(EndTrigger),
    /// Fetch authoritative status now instead of waiting for the next poll
    FetchStatus,
    /// Stop the fallback poller for good
    StopPolling,
    PhaseChanged(RoomPhase),
    CountdownStarted { synchronized: bool },
    Completed(Outcome),
}

/// Point-in-time view of the lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleSnapshot {
    pub room_code: String,
    pub phase: RoomPhase,
    pub participants: Vec<Identity>,
    pub is_creator: bool,
    pub remaining_secs: Option<u64>,
    pub countdown_synchronized: bool,
    pub outcome: Option<Outcome>,
    pub end_requested: bool,
}

/// Merges push, poll, timer and user inputs into one session phase
#[derive(Debug)]
pub struct RoomLifecycleCoordinator {
    local: Identity,
    session: Session,
    countdown: Option<Countdown>,
    end_latch: OneShotLatch,
}

impl RoomLifecycleCoordinator {
    pub fn new(room_code: impl Into<String>, local: Identity) -> Self {
        Self {
            local,
            session: Session::new(room_code),
            countdown: None,
            end_latch: OneShotLatch::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> RoomPhase {
        self.session.phase()
    }

    pub fn countdown(&self) -> Option<&Countdown> {
        self.countdown.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.session.phase().is_terminal()
    }

    pub fn is_creator(&self) -> bool {
        self.session.is_creator(&self.local)
    }

    /// Apply a push event
    pub fn on_event(&mut self, event: &RoomEvent, at: Moment) -> Vec<Action> {
        match event {
            RoomEvent::PlayerJoined { username, count } => {
                self.on_player_joined(username, *count)
            }
            RoomEvent::StartMatch => self.on_start_match(at),
            RoomEvent::MatchCompleted(result) => self.on_match_completed(result),
            RoomEvent::Typing { .. } | RoomEvent::Chat { .. } => Vec::new(),
        }
    }

    /// Apply an authoritative status, from the fallback poll or a direct fetch
    pub fn on_poll(&mut self, status: &RoomStatus, at: Moment) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(creator) = &status.created_by {
            self.session
                .set_roster(Identity::new(creator), status.joined_by.as_deref().map(Identity::new));
        }
        if let Some(seconds) = status.expiry_duration_seconds {
            self.session.set_expiry_duration_seconds(seconds);
        }
        if let Some(started_at) = status.started_at {
            self.session.set_started_at(started_at);
        }

        match status.status {
            RoomStatusKind::Waiting => {
                if self.session.participants().len() >= MAX_PARTICIPANTS {
                    self.advance(RoomPhase::Ready, &mut actions);
                }
            }
            RoomStatusKind::Active => {
                if self.advance(RoomPhase::Active, &mut actions) {
                    info!(room = %self.session.room_code(), "Match started (observed by poll)");
                }
            }
            RoomStatusKind::Completed => {
                let result = status.result().unwrap_or(MatchResult::Tie);
                actions.extend(self.complete(result, CompletionSource::Poll, None));
                return actions;
            }
            RoomStatusKind::Unknown => {
                debug!(room = %self.session.room_code(), "Ignoring unrecognised room status");
            }
        }

        self.sync_countdown(at, &mut actions);
        actions.extend(self.check_deadline(at));
        actions
    }

    /// Countdown tick
    ///
    /// Remaining time is always `deadline - now`; a tick that lands on or
    /// past the deadline any number of times ends the session once.
    pub fn on_tick(&mut self, at: Moment) -> Vec<Action> {
        self.check_deadline(at)
    }

    /// Local "start" by the room creator
    pub fn start(&mut self, connected: bool, at: Moment) -> Result<Vec<Action>, ActionError> {
        if !self.is_creator() {
            return Err(ActionError::NotCreator);
        }
        let phase = self.session.phase();
        if phase != RoomPhase::Ready || self.session.participants().len() < MAX_PARTICIPANTS {
            return Err(ActionError::NotReady {
                phase: phase.to_string(),
            });
        }
        if !connected {
            return Err(ActionError::NotConnected);
        }

        let mut actions = vec![Action::PublishStart];
        self.enter_active(at, &mut actions);
        info!(room = %self.session.room_code(), "Match started locally");
        Ok(actions)
    }

    /// Explicit user "end"
    pub fn end(&mut self) -> Result<Vec<Action>, ActionError> {
        self.request_end(EndTrigger::User)
    }

    /// The local player's submission has been accepted
    pub fn submission_completed(&mut self) -> Result<Vec<Action>, ActionError> {
        self.request_end(EndTrigger::Submission)
    }

    pub fn snapshot(&self, now: Instant) -> LifecycleSnapshot {
        LifecycleSnapshot {
            room_code: self.session.room_code().to_string(),
            phase: self.session.phase(),
            participants: self.session.participants().to_vec(),
            is_creator: self.is_creator(),
            remaining_secs: self.countdown.map(|c| c.remaining_secs(now)),
            countdown_synchronized: self.countdown.is_some_and(|c| c.is_synchronized()),
            outcome: self.session.outcome().cloned(),
            end_requested: self.end_latch.has_fired(),
        }
    }

    fn on_player_joined(&mut self, username: &str, count: u32) -> Vec<Action> {
        let mut actions = Vec::new();
        self.session.add_participant(Identity::new(username));
        if count as usize >= MAX_PARTICIPANTS {
            self.advance(RoomPhase::Ready, &mut actions);
        }
        actions
    }

    fn on_start_match(&mut self, at: Moment) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.session.phase() >= RoomPhase::Active {
            debug!(room = %self.session.room_code(), "Duplicate start ignored");
            return actions;
        }
        self.enter_active(at, &mut actions);
        info!(room = %self.session.room_code(), "Match started by peer");
        actions
    }

    fn on_match_completed(&mut self, result: &MatchCompleted) -> Vec<Action> {
        let local_score = result.score_for(&self.local);
        self.complete(
            MatchResult::from_winner(result.winner.as_deref()),
            CompletionSource::Push,
            local_score,
        )
    }

    fn enter_active(&mut self, at: Moment, actions: &mut Vec<Action>) {
        if self.advance(RoomPhase::Active, actions) {
            self.sync_countdown(at, actions);
            actions.push(Action::FetchStatus);
        }
    }

    fn request_end(&mut self, trigger: EndTrigger) -> Result<Vec<Action>, ActionError> {
        match self.session.phase() {
            RoomPhase::Active => Ok(self.fire_end(trigger)),
            RoomPhase::Ending | RoomPhase::Completed => Ok(Vec::new()),
            phase => Err(ActionError::NotActive {
                phase: phase.to_string(),
            }),
        }
    }

    fn fire_end(&mut self, trigger: EndTrigger) -> Vec<Action> {
        let mut actions = Vec::new();
        if !self.end_latch.fire() {
            debug!(room = %self.session.room_code(), ?trigger, "End already requested");
            return actions;
        }
        info!(room = %self.session.room_code(), ?trigger, "Ending session");
        self.advance(RoomPhase::Ending, &mut actions);
        actions.push(Action::EndSession(trigger));
        actions
    }

    fn check_deadline(&mut self, at: Moment) -> Vec<Action> {
        match self.countdown {
            Some(countdown)
                if self.session.phase() == RoomPhase::Active
                    && countdown.is_expired(at.instant) =>
            {
                self.fire_end(EndTrigger::Timer)
            }
            _ => Vec::new(),
        }
    }

    /// Start or re-synchronise the countdown from what is known so far
    fn sync_countdown(&mut self, at: Moment, actions: &mut Vec<Action>) {
        if self.session.phase() != RoomPhase::Active {
            return;
        }
        let Some(seconds) = self.session.expiry_duration_seconds() else {
            return;
        };
        let duration = Duration::from_secs(seconds.max(0) as u64);

        match (self.session.started_at(), self.countdown) {
            (Some(_), Some(countdown)) if countdown.is_synchronized() => {}
            (Some(started_at), _) => {
                let countdown = Countdown::synchronized(started_at, duration, at.wall, at.instant);
                info!(
                    room = %self.session.room_code(),
                    remaining_secs = countdown.remaining_secs(at.instant),
                    "Countdown synchronized"
                );
                self.countdown = Some(countdown);
                actions.push(Action::CountdownStarted { synchronized: true });
            }
            (None, None) => {
                self.countdown = Some(Countdown::provisional(duration, at.instant));
                debug!(room = %self.session.room_code(), "Provisional countdown started");
                actions.push(Action::CountdownStarted {
                    synchronized: false,
                });
            }
            (None, Some(_)) => {}
        }
    }

    fn complete(
        &mut self,
        result: MatchResult,
        source: CompletionSource,
        local_score: Option<i64>,
    ) -> Vec<Action> {
        let outcome = Outcome {
            result,
            source,
            local_score,
        };
        let outcome = match self.session.record_outcome(outcome) {
            Ok(outcome) => outcome.clone(),
            Err(conflict) => {
                debug!(
                    room = %self.session.room_code(),
                    kept = %conflict.kept,
                    rejected = %conflict.rejected,
                    "Late completion discarded"
                );
                return Vec::new();
            }
        };

        self.end_latch.disarm();
        info!(room = %self.session.room_code(), outcome = %outcome, "Match completed");

        let mut actions = Vec::new();
        self.advance(RoomPhase::Completed, &mut actions);
        actions.push(Action::Completed(outcome));
        actions.push(Action::StopPolling);
        actions
    }

    fn advance(&mut self, phase: RoomPhase, actions: &mut Vec<Action>) -> bool {
        let from = self.session.phase();
        if !self.session.advance_to(phase) {
            return false;
        }
        info!(room = %self.session.room_code(), %from, to = %phase, "Room phase changed");
        actions.push(Action::PhaseChanged(phase));
        true
    }
}
