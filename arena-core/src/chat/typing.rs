//! Self-expiring typing indicators

use std::collections::HashMap;
use std::future;
use std::time::Duration;

use futures_util::future::poll_fn;
use tokio_util::time::{DelayQueue, delay_queue};

use crate::auth::Identity;

/// Who is typing right now
///
/// Each refresh restarts the identity's timer from the full TTL; it does not
/// extend the remaining time. Entries are removed by [`TypingTracker::next_expired`].
#[derive(Debug)]
pub struct TypingTracker {
    ttl: Duration,
    queue: DelayQueue<Identity>,
    keys: HashMap<Identity, delay_queue::Key>,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            queue: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start or restart the timer for `identity`
    pub fn touch(&mut self, identity: Identity) {
        match self.keys.get(&identity) {
            Some(key) => self.queue.reset(key, self.ttl),
            None => {
                let key = self.queue.insert(identity.clone(), self.ttl);
                self.keys.insert(identity, key);
            }
        }
    }

    /// Wait for the next indicator to expire and remove it
    ///
    /// Pending forever while nobody is typing, so it can sit in a `select!`.
    pub async fn next_expired(&mut self) -> Identity {
        loop {
            if self.queue.is_empty() {
                future::pending::<()>().await;
            }
            if let Some(expired) = poll_fn(|cx| self.queue.poll_expired(cx)).await {
                let identity = expired.into_inner();
                self.keys.remove(&identity);
                return identity;
            }
        }
    }

    pub fn is_typing(&self, identity: &Identity) -> bool {
        self.keys.contains_key(identity)
    }

    /// Currently typing identities, sorted
    pub fn typing_users(&self) -> Vec<Identity> {
        let mut users: Vec<Identity> = self.keys.keys().cloned().collect();
        users.sort();
        users
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, advance, timeout};

    fn bob() -> Identity {
        Identity::new("bob")
    }

    #[tokio::test(start_paused = true)]
    async fn indicator_expires_after_ttl() {
        let mut tracker = TypingTracker::new(Duration::from_secs(2));
        let start = Instant::now();
        tracker.touch(bob());

        let expired = tracker.next_expired().await;

        assert_eq!(expired, bob());
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_millis(2100));
        assert!(!tracker.is_typing(&bob()));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_restarts_timer() {
        let mut tracker = TypingTracker::new(Duration::from_secs(2));
        tracker.touch(bob());

        advance(Duration::from_millis(1500)).await;
        tracker.touch(bob());
        let refreshed_at = Instant::now();

        // 1.9s after the refresh (3.4s after the first event) still typing
        let early = timeout(Duration::from_millis(1900), tracker.next_expired()).await;
        assert!(early.is_err());
        assert!(tracker.is_typing(&bob()));

        let expired = tracker.next_expired().await;
        assert_eq!(expired, bob());
        assert!(refreshed_at.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn independent_timers_per_identity() {
        let mut tracker = TypingTracker::new(Duration::from_secs(2));
        tracker.touch(bob());
        advance(Duration::from_secs(1)).await;
        tracker.touch(Identity::new("carol"));

        assert_eq!(tracker.typing_users(), vec![bob(), Identity::new("carol")]);
        assert_eq!(tracker.next_expired().await, bob());
        assert_eq!(tracker.typing_users(), vec![Identity::new("carol")]);
        assert_eq!(tracker.next_expired().await, Identity::new("carol"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_tracker_never_expires() {
        let mut tracker = TypingTracker::new(Duration::from_secs(2));
        let result = timeout(Duration::from_secs(60), tracker.next_expired()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_all_indicators() {
        let mut tracker = TypingTracker::new(Duration::from_secs(2));
        tracker.touch(bob());
        tracker.clear();
        assert!(tracker.typing_users().is_empty());
        let result = timeout(Duration::from_secs(5), tracker.next_expired()).await;
        assert!(result.is_err());
    }
}
