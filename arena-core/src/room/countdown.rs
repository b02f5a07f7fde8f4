//! Match countdown
//!
//! The deadline is fixed once; every read recomputes `deadline - now`, so
//! ticks that arrive late or twice never skew it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Deadlines past the representable range are clamped to this far future
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Time left at wall-clock `now` for a match that started at `started_at`
/// and runs for `duration`: `max(0, started_at + duration - now)`
///
/// A duration too large to place on the calendar counts in full.
pub fn remaining_at(started_at: DateTime<Utc>, duration: Duration, now: DateTime<Utc>) -> Duration {
    let Some(ends_at) = chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| started_at.checked_add_signed(delta))
    else {
        return duration;
    };
    (ends_at - now).to_std().unwrap_or(Duration::ZERO)
}

fn deadline_after(now: Instant, remaining: Duration) -> Instant {
    now.checked_add(remaining)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Deadline on the monotonic clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    deadline: Instant,
    synchronized: bool,
}

impl Countdown {
    /// Full-duration countdown used until the authoritative start is known
    pub fn provisional(duration: Duration, now: Instant) -> Self {
        Self {
            deadline: deadline_after(now, duration),
            synchronized: false,
        }
    }

    /// Countdown anchored on the authoritative start time
    ///
    /// Peers that learn the same `started_at` at different moments converge
    /// on the same deadline.
    pub fn synchronized(
        started_at: DateTime<Utc>,
        duration: Duration,
        wall_now: DateTime<Utc>,
        now: Instant,
    ) -> Self {
        Self {
            deadline: deadline_after(now, remaining_at(started_at, duration, wall_now)),
            synchronized: true,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    /// Whole seconds left, rounded down
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        self.remaining(now).as_secs()
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn remaining_is_start_plus_duration_minus_now() {
        let started = at(10, 0, 0);
        let thirty_min = Duration::from_secs(30 * 60);

        assert_eq!(remaining_at(started, thirty_min, started), thirty_min);
        assert_eq!(
            remaining_at(started, thirty_min, at(10, 10, 0)),
            Duration::from_secs(20 * 60)
        );
    }

    #[test]
    fn remaining_clamps_at_zero() {
        let started = at(10, 0, 0);
        assert_eq!(
            remaining_at(started, Duration::from_secs(60), at(11, 0, 0)),
            Duration::ZERO
        );
    }

    #[test]
    fn late_joiner_converges_on_same_deadline() {
        let started = at(10, 0, 0);
        let duration = Duration::from_secs(600);
        let base = Instant::now();

        // Peer A learns the start at 10:00:00, peer B at 10:00:07
        let a = Countdown::synchronized(started, duration, at(10, 0, 0), base);
        let b = Countdown::synchronized(
            started,
            duration,
            at(10, 0, 7),
            base + Duration::from_secs(7),
        );

        assert_eq!(a.deadline(), b.deadline());
    }

    #[test]
    fn remaining_secs_rounds_down() {
        let base = Instant::now();
        let countdown = Countdown::provisional(Duration::from_secs(10), base);

        assert_eq!(countdown.remaining_secs(base), 10);
        assert_eq!(countdown.remaining_secs(base + Duration::from_millis(1)), 9);
        assert!(!countdown.is_synchronized());
    }

    #[test]
    fn expired_once_deadline_passes() {
        let base = Instant::now();
        let countdown = Countdown::provisional(Duration::from_secs(1), base);

        assert!(!countdown.is_expired(base));
        assert!(countdown.is_expired(base + Duration::from_secs(1)));
        assert_eq!(
            countdown.remaining(base + Duration::from_secs(5)),
            Duration::ZERO
        );
    }

    #[test]
    fn oversized_duration_counts_in_full() {
        let started = at(10, 0, 0);
        let huge = Duration::from_secs(i64::MAX as u64);

        assert_eq!(remaining_at(started, huge, at(10, 5, 0)), huge);

        let base = Instant::now();
        let countdown = Countdown::synchronized(started, huge, at(10, 5, 0), base);
        assert!(countdown.remaining(base) >= FAR_FUTURE);
        assert!(!countdown.is_expired(base));
    }
}
