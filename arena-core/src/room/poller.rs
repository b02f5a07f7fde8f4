//! Periodic authoritative status re-fetch

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::api::{RoomApi, RoomStatus, RoomStatusKind};

/// Background poller for one room
///
/// Fetches status every `interval` and forwards each successful result to the
/// sink. Failed fetches are logged and retried on the next tick, with no
/// backoff. The task ends for good after forwarding a `COMPLETED` status,
/// when [`FallbackPoller::stop`] is called, when the sink closes, or when
/// the poller is dropped.
#[derive(Debug)]
pub struct FallbackPoller {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl FallbackPoller {
    pub fn spawn(
        api: Arc<dyn RoomApi>,
        room_code: impl Into<String>,
        interval: Duration,
        sink: mpsc::UnboundedSender<RoomStatus>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let room_code = room_code.into();
        let task = tokio::spawn(poll_loop(api, room_code, interval, sink, cancel.clone()));
        Self {
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }

    /// Stop polling permanently. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn poll_loop(
    api: Arc<dyn RoomApi>,
    room_code: String,
    period: Duration,
    sink: mpsc::UnboundedSender<RoomStatus>,
    cancel: CancellationToken,
) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(room = %room_code, interval_ms = period.as_millis() as u64, "Fallback poller started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.fetch_status(&room_code) => result,
        };

        match result {
            Ok(status) => {
                let completed = status.status == RoomStatusKind::Completed;
                if sink.send(status).is_err() {
                    debug!(room = %room_code, "Status sink closed");
                    break;
                }
                if completed {
                    info!(room = %room_code, "Room completed; fallback poller finished");
                    break;
                }
            }
            Err(e) => warn!(room = %room_code, error = %e, "Status poll failed; retrying next interval"),
        }
    }

    debug!(room = %room_code, "Fallback poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PollError;
    use crate::room::api::MockRoomApi;

    const INTERVAL: Duration = Duration::from_secs(5);

    fn spawn(api: &MockRoomApi) -> (FallbackPoller, mpsc::UnboundedReceiver<RoomStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let poller = FallbackPoller::spawn(Arc::new(api.clone()), "AB12", INTERVAL, tx);
        (poller, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_waits_one_interval() {
        let api = MockRoomApi::waiting();
        let started = Instant::now();
        let (_poller, mut rx) = spawn(&api);

        let status = rx.recv().await.unwrap();

        assert_eq!(status.status, RoomStatusKind::Waiting);
        assert!(started.elapsed() >= INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_retried_next_interval() {
        let api = MockRoomApi::waiting();
        api.queue_status(Err(PollError::Request("connection reset".into())));
        let started = Instant::now();
        let (_poller, mut rx) = spawn(&api);

        rx.recv().await.unwrap();

        assert_eq!(api.fetch_count(), 2);
        assert!(started.elapsed() >= INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_for_good_after_completed() {
        let api = MockRoomApi::new();
        api.set_status(RoomStatus::new(RoomStatusKind::Completed).with_winner("bob"));
        let (poller, mut rx) = spawn(&api);

        assert_eq!(rx.recv().await.unwrap().status, RoomStatusKind::Completed);
        assert!(rx.recv().await.is_none());

        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(api.fetch_count(), 1);
        assert!(poller.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_polling() {
        let api = MockRoomApi::waiting();
        let (poller, mut rx) = spawn(&api);

        poller.stop();
        poller.stop();

        assert!(rx.recv().await.is_none());
        assert_eq!(api.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_still_polls() {
        let api = MockRoomApi::waiting();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _poller = FallbackPoller::spawn(Arc::new(api.clone()), "AB12", Duration::ZERO, tx);

        assert_eq!(rx.recv().await.unwrap().status, RoomStatusKind::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_poller_stops_task() {
        let api = MockRoomApi::waiting();
        let (poller, mut rx) = spawn(&api);

        drop(poller);

        assert!(rx.recv().await.is_none());
    }
}
