//! Scriptable room backend for tests
//!
//! `set_status` installs the status every fetch returns; `queue_status`
//! pushes one-off results (including failures) that are served first.
//! End-session calls are recorded so tests can assert how many were made.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{RoomApi, RoomStatus, RoomStatusKind};
use crate::chat::ChatMessage;
use crate::error::{ApiError, PollError};

/// In-memory [`RoomApi`]; clones share state
#[derive(Debug, Clone, Default)]
pub struct MockRoomApi {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    queued: VecDeque<Result<RoomStatus, PollError>>,
    current: Option<RoomStatus>,
    fetches: usize,
    history: Vec<ChatMessage>,
    history_error: Option<ApiError>,
    end_calls: Vec<String>,
    end_error: Option<ApiError>,
}

impl MockRoomApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that reports a waiting room
    pub fn waiting() -> Self {
        let api = Self::new();
        api.set_status(RoomStatus::new(RoomStatusKind::Waiting));
        api
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Status returned by every fetch once the queue is drained
    pub fn set_status(&self, status: RoomStatus) {
        self.lock().current = Some(status);
    }

    /// One-off fetch result, served before the sticky status
    pub fn queue_status(&self, result: Result<RoomStatus, PollError>) {
        self.lock().queued.push_back(result);
    }

    pub fn set_history(&self, history: Vec<ChatMessage>) {
        self.lock().history = history;
    }

    pub fn fail_history(&self, error: ApiError) {
        self.lock().history_error = Some(error);
    }

    pub fn fail_end_session(&self, error: ApiError) {
        self.lock().end_error = Some(error);
    }

    /// Room codes passed to `end_session`, in call order
    pub fn end_session_calls(&self) -> Vec<String> {
        self.lock().end_calls.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }
}

#[async_trait]
impl RoomApi for MockRoomApi {
    async fn fetch_status(&self, _room_code: &str) -> Result<RoomStatus, PollError> {
        let mut state = self.lock();
        state.fetches += 1;
        if let Some(result) = state.queued.pop_front() {
            return result;
        }
        state
            .current
            .clone()
            .ok_or_else(|| PollError::Request("no status scripted".to_string()))
    }

    async fn end_session(&self, room_code: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.end_calls.push(room_code.to_string());
        match &state.end_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn chat_history(&self, _room_code: &str) -> Result<Vec<ChatMessage>, ApiError> {
        let state = self.lock();
        match &state.history_error {
            Some(error) => Err(error.clone()),
            None => Ok(state.history.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_results_come_before_sticky_status() {
        let api = MockRoomApi::waiting();
        api.queue_status(Err(PollError::Status { status: 502 }));

        assert!(api.fetch_status("AB12").await.is_err());
        assert_eq!(
            api.fetch_status("AB12").await.unwrap().status,
            RoomStatusKind::Waiting
        );
        assert_eq!(api.fetch_count(), 2);
    }

    #[tokio::test]
    async fn records_end_session_calls() {
        let api = MockRoomApi::new();
        api.end_session("AB12").await.unwrap();
        api.fail_end_session(ApiError::Network("down".into()));
        assert!(api.end_session("AB12").await.is_err());

        assert_eq!(api.end_session_calls(), vec!["AB12", "AB12"]);
    }

    #[tokio::test]
    async fn unscripted_fetch_fails() {
        let api = MockRoomApi::new();
        assert!(matches!(
            api.fetch_status("AB12").await,
            Err(PollError::Request(_))
        ));
    }
}
