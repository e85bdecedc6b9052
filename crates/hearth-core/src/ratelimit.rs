//! Slow-mode cooldown gate for ordinary chat messages.
//!
//! Privileged commands never reach this gate; the admission pipeline routes
//! them away before the check, so an admin cannot be throttled out of
//! turning slow mode off.

use std::time::{Duration, Instant};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Throttled { retry_after: Duration },
}

/// Global slow-mode settings. The per-connection state is the timestamp of
/// the last accepted message, owned by the session.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    enabled: bool,
    interval: Duration,
}

impl RateLimiter {
    pub fn new(enabled: bool, interval: Duration) -> Self {
        Self { enabled, interval }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Check a message arriving at `now`.
    ///
    /// A throttled message leaves `last_accepted` untouched; an allowed one
    /// records `now`. A message exactly `interval` after the last accepted
    /// one is allowed.
    pub fn check(&self, last_accepted: &mut Option<Instant>, now: Instant) -> RateDecision {
        if self.enabled {
            if let Some(last) = *last_accepted {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < self.interval {
                    return RateDecision::Throttled {
                        retry_after: self.interval - elapsed,
                    };
                }
            }
        }
        *last_accepted = Some(now);
        RateDecision::Allowed
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(true, DEFAULT_INTERVAL)
    }
}
