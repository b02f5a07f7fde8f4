//! Room session state
//!
//! [`Session`] only ever moves forward: phase changes go through
//! [`Session::advance_to`], which refuses regressions, and the outcome lives
//! in a [`WriteOnce`] slot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::error::TerminalConflict;

/// Maximum participants in a room
pub const MAX_PARTICIPANTS: usize = 2;

/// Room lifecycle phase, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomPhase {
    Waiting,
    Ready,
    Active,
    Ending,
    Completed,
}

impl RoomPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Ready => "READY",
            Self::Active => "ACTIVE",
            Self::Ending => "ENDING",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for RoomPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who won
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "winner", rename_all = "snake_case")]
pub enum MatchResult {
    Winner(String),
    Tie,
}

impl MatchResult {
    /// Interpret a winner field. Missing, empty, `TIE` and the pending
    /// placeholders all mean nobody won.
    pub fn from_winner(winner: Option<&str>) -> Self {
        match winner.map(str::trim) {
            None | Some("") | Some("TIE") | Some("PENDING") | Some("WAITING") => Self::Tie,
            Some(name) => Self::Winner(name.to_string()),
        }
    }

    pub fn winner(&self) -> Option<&str> {
        match self {
            Self::Winner(name) => Some(name),
            Self::Tie => None,
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Winner(name) => write!(f, "winner {name}"),
            Self::Tie => f.write_str("tie"),
        }
    }
}

/// Which path delivered the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSource {
    Push,
    Poll,
}

impl fmt::Display for CompletionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => f.write_str("push"),
            Self::Poll => f.write_str("poll"),
        }
    }
}

/// Terminal result of a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub result: MatchResult,
    pub source: CompletionSource,
    /// Local player's score, when the result named them
    pub local_score: Option<i64>,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (via {})", self.result, self.source)
    }
}

/// Slot that accepts exactly one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOnce<T> {
    value: Option<T>,
}

impl<T> Default for WriteOnce<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T: fmt::Display> WriteOnce<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` if the slot is empty; otherwise keep the first value
    pub fn set(&mut self, value: T) -> Result<&T, TerminalConflict> {
        if let Some(kept) = &self.value {
            return Err(TerminalConflict {
                kept: kept.to_string(),
                rejected: value.to_string(),
            });
        }
        Ok(&*self.value.insert(value))
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LatchState {
    Armed,
    Fired,
    Disarmed,
}

/// Guard that lets an action run at most once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotLatch {
    state: LatchState,
}

impl Default for OneShotLatch {
    fn default() -> Self {
        Self {
            state: LatchState::Armed,
        }
    }
}

impl OneShotLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once, for the first caller while armed
    pub fn fire(&mut self) -> bool {
        if self.state == LatchState::Armed {
            self.state = LatchState::Fired;
            return true;
        }
        false
    }

    /// Prevent the latch from ever firing
    pub fn disarm(&mut self) {
        if self.state == LatchState::Armed {
            self.state = LatchState::Disarmed;
        }
    }

    pub fn has_fired(&self) -> bool {
        self.state == LatchState::Fired
    }

    pub fn is_armed(&self) -> bool {
        self.state == LatchState::Armed
    }
}

/// One room as seen by this client
#[derive(Debug, Clone)]
pub struct Session {
    room_code: String,
    phase: RoomPhase,
    participants: Vec<Identity>,
    started_at: Option<DateTime<Utc>>,
    expiry_duration_seconds: Option<i64>,
    outcome: WriteOnce<Outcome>,
}

impl Session {
    pub fn new(room_code: impl Into<String>) -> Self {
        Self {
            room_code: room_code.into(),
            phase: RoomPhase::Waiting,
            participants: Vec::new(),
            started_at: None,
            expiry_duration_seconds: None,
            outcome: WriteOnce::new(),
        }
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    /// Move forward to `phase`; false (and unchanged) if that would not advance
    pub fn advance_to(&mut self, phase: RoomPhase) -> bool {
        if phase <= self.phase {
            return false;
        }
        self.phase = phase;
        true
    }

    /// Participants in join order; the first is the creator
    pub fn participants(&self) -> &[Identity] {
        &self.participants
    }

    /// Record a participant; duplicates and a third player are ignored
    pub fn add_participant(&mut self, identity: Identity) -> bool {
        if self.participants.len() >= MAX_PARTICIPANTS || self.participants.contains(&identity) {
            return false;
        }
        self.participants.push(identity);
        true
    }

    /// Reorder participants from the authoritative roster
    ///
    /// The creator goes first, the joiner second. Anyone already seen who is
    /// not on the roster keeps a remaining slot.
    pub fn set_roster(&mut self, creator: Identity, joiner: Option<Identity>) {
        let previous = std::mem::take(&mut self.participants);
        self.add_participant(creator);
        if let Some(joiner) = joiner {
            self.add_participant(joiner);
        }
        for identity in previous {
            self.add_participant(identity);
        }
    }

    pub fn creator(&self) -> Option<&Identity> {
        self.participants.first()
    }

    pub fn is_creator(&self, identity: &Identity) -> bool {
        self.creator() == Some(identity)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn set_started_at(&mut self, started_at: DateTime<Utc>) {
        self.started_at = Some(started_at);
    }

    pub fn expiry_duration_seconds(&self) -> Option<i64> {
        self.expiry_duration_seconds
    }

    pub fn set_expiry_duration_seconds(&mut self, seconds: i64) {
        self.expiry_duration_seconds = Some(seconds.max(0));
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.get()
    }

    pub fn winner(&self) -> Option<&MatchResult> {
        self.outcome.get().map(|o| &o.result)
    }

    /// First writer wins
    pub fn record_outcome(&mut self, outcome: Outcome) -> Result<&Outcome, TerminalConflict> {
        self.outcome.set(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered() {
        assert!(RoomPhase::Waiting < RoomPhase::Ready);
        assert!(RoomPhase::Ready < RoomPhase::Active);
        assert!(RoomPhase::Active < RoomPhase::Ending);
        assert!(RoomPhase::Ending < RoomPhase::Completed);
        assert!(RoomPhase::Completed.is_terminal());
    }

    #[test]
    fn advance_refuses_regression() {
        let mut session = Session::new("AB12");
        assert!(session.advance_to(RoomPhase::Active));
        assert!(!session.advance_to(RoomPhase::Ready));
        assert!(!session.advance_to(RoomPhase::Active));
        assert_eq!(session.phase(), RoomPhase::Active);
        assert!(session.advance_to(RoomPhase::Completed));
    }

    #[test]
    fn participants_keep_join_order_and_cap_at_two() {
        let mut session = Session::new("AB12");
        assert!(session.add_participant(Identity::new("alice")));
        assert!(!session.add_participant(Identity::new("alice")));
        assert!(session.add_participant(Identity::new("bob")));
        assert!(!session.add_participant(Identity::new("carol")));

        assert_eq!(
            session.participants(),
            &[Identity::new("alice"), Identity::new("bob")]
        );
        assert!(session.is_creator(&Identity::new("alice")));
        assert!(!session.is_creator(&Identity::new("bob")));
    }

    #[test]
    fn roster_puts_creator_first() {
        let mut session = Session::new("AB12");
        session.add_participant(Identity::new("bob"));
        session.set_roster(Identity::new("alice"), Some(Identity::new("bob")));

        assert_eq!(
            session.participants(),
            &[Identity::new("alice"), Identity::new("bob")]
        );
        assert!(session.is_creator(&Identity::new("alice")));
    }

    #[test]
    fn outcome_is_write_once() {
        let mut session = Session::new("AB12");
        let first = Outcome {
            result: MatchResult::Winner("alice".into()),
            source: CompletionSource::Poll,
            local_score: None,
        };
        let second = Outcome {
            result: MatchResult::Winner("bob".into()),
            source: CompletionSource::Push,
            local_score: Some(4),
        };

        assert!(session.record_outcome(first).is_ok());
        let conflict = session.record_outcome(second).unwrap_err();

        assert!(conflict.kept.contains("alice"));
        assert!(conflict.rejected.contains("bob"));
        assert_eq!(
            session.winner(),
            Some(&MatchResult::Winner("alice".into()))
        );
    }

    #[test]
    fn latch_fires_once() {
        let mut latch = OneShotLatch::new();
        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(latch.has_fired());
    }

    #[test]
    fn disarmed_latch_never_fires() {
        let mut latch = OneShotLatch::new();
        latch.disarm();
        assert!(!latch.fire());
        assert!(!latch.has_fired());
        assert!(!latch.is_armed());
    }

    #[test]
    fn winner_placeholders_mean_tie() {
        assert_eq!(MatchResult::from_winner(None), MatchResult::Tie);
        assert_eq!(MatchResult::from_winner(Some("TIE")), MatchResult::Tie);
        assert_eq!(MatchResult::from_winner(Some("PENDING")), MatchResult::Tie);
        assert_eq!(
            MatchResult::from_winner(Some("alice")),
            MatchResult::Winner("alice".into())
        );
    }
}
