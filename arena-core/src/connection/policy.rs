//! Reconnect delay policy for the push connection

use std::time::Duration;

/// How long to wait before each reconnect attempt
///
/// Retries are unlimited in both modes: a match is time-boxed, so giving up on
/// the push channel is never better than trying again. The fallback poller
/// covers correctness while the channel is down.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    /// Same delay before every attempt
    Fixed(Duration),
    /// Exponential growth from `initial`, capped at `max`
    Backoff {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed(delay)
    }

    pub fn backoff(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self::Backoff {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1.0),
        }
    }

    /// Delay before reconnect attempt number `attempt` (zero-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Backoff {
                initial,
                max,
                multiplier,
            } => {
                let exponent = attempt.min(32) as i32;
                let scaled = initial.as_secs_f64() * multiplier.powi(exponent);
                if !scaled.is_finite() || scaled >= max.as_secs_f64() {
                    *max
                } else {
                    Duration::from_secs_f64(scaled)
                }
            }
        }
    }
}

impl Default for ReconnectPolicy {
    /// 500ms doubling up to 5s
    fn default() -> Self {
        Self::backoff(Duration::from_millis(500), Duration::from_secs(5), 2.0)
    }
}

/// Attempt counter that walks a [`ReconnectPolicy`]
#[derive(Debug)]
pub struct ReconnectSchedule {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl ReconnectSchedule {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt; advances the counter
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
