use std::time::Duration;

use log::*;
use rand::Rng;

/// Reconnection schedule for a dropped subscriber: exponential backoff with ±`jitter` randomization, so a venue
/// full of devices that lost the same access point does not dial back in as one thundering herd.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    /// Fractional spread around the backoff value. `0.2` means the actual delay lands uniformly in ±20% of it.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// The deterministic part of the schedule: `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(20);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// The backoff with jitter applied.
    pub fn jittered_backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        base.mul_f64(1.0 + spread)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    RetryAfter(Duration),
    /// The schedule is exhausted. The device should tell its human instead of retrying forever.
    GiveUp,
}

/// Tracks one device's connection attempts. A successful connection resets the schedule.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Default for ClientConnection {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

impl ClientConnection {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Call when the connection drops (or a reconnection attempt fails). Returns how long to wait before the next
    /// attempt, or `GiveUp` once the policy is exhausted.
    pub fn connection_lost(&mut self) -> ReconnectDecision {
        if self.attempts >= self.policy.max_attempts {
            warn!("📡 Giving up after {} reconnection attempts", self.attempts);
            return ReconnectDecision::GiveUp;
        }
        let delay = self.policy.jittered_backoff(self.attempts);
        self.attempts += 1;
        debug!("📡 Reconnect attempt {} in {}ms", self.attempts, delay.as_millis());
        ReconnectDecision::RetryAfter(delay)
    }

    /// Call once a connection is established.
    pub fn connected(&mut self) {
        self.attempts = 0;
    }
}
