//! Per-connection privilege ledger.
//!
//! Temporary admin access is a two-step challenge: the elevation phrase sent
//! once opens a challenge window, sent again within [`CHALLENGE_WINDOW`] of
//! the first it grants access. A second phrase after the window expires
//! starts a fresh challenge instead.
//!
//! The ledger also carries the moderation flags that gate a connection:
//! soft-kick, full ban and the permanent admin block. All of them are scoped
//! to the connection and disappear with it.

use std::time::{Duration, Instant};

use crate::error::Rejection;

/// How long after the first challenge a second one still grants access.
pub const CHALLENGE_WINDOW: Duration = Duration::from_secs(10);

/// Progress toward temporary admin access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grant {
    #[default]
    Unchallenged,
    Challenged {
        since: Instant,
    },
    Granted,
}

/// Outcome of sending the elevation phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Challenge {
    /// A new challenge window is open.
    Pending,
    /// Second challenge inside the window: access granted.
    Granted,
    /// Access was already granted; nothing changed.
    AlreadyGranted,
    /// The connection is permanently blocked from elevating.
    Blocked,
}

#[derive(Debug, Clone, Default)]
pub struct PrivilegeLedger {
    grant: Grant,
    admin_blocked: bool,
    kicked: bool,
    banned: bool,
}

impl PrivilegeLedger {
    pub fn challenge(&mut self, now: Instant) -> Challenge {
        if self.admin_blocked {
            return Challenge::Blocked;
        }
        match self.grant {
            Grant::Granted => Challenge::AlreadyGranted,
            Grant::Challenged { since } if now.saturating_duration_since(since) <= CHALLENGE_WINDOW => {
                self.grant = Grant::Granted;
                Challenge::Granted
            }
            _ => {
                self.grant = Grant::Challenged { since: now };
                Challenge::Pending
            }
        }
    }

    pub fn is_granted(&self) -> bool {
        self.grant == Grant::Granted
    }

    /// Drop any challenge or grant.
    pub fn revoke(&mut self) {
        self.grant = Grant::Unchallenged;
    }

    /// Revoke and permanently refuse future challenges on this connection.
    pub fn block_admin(&mut self) {
        self.admin_blocked = true;
        self.revoke();
    }

    pub fn is_admin_blocked(&self) -> bool {
        self.admin_blocked
    }

    /// Silence the connection. Any challenge or grant is dropped with it.
    pub fn kick(&mut self) {
        self.kicked = true;
        self.revoke();
    }

    /// A full ban implies a soft-kick.
    pub fn ban(&mut self) {
        self.kick();
        self.banned = true;
    }

    /// Clear kick and ban markers together with any privilege record.
    pub fn unban(&mut self) {
        self.kicked = false;
        self.banned = false;
        self.revoke();
    }

    pub fn is_kicked(&self) -> bool {
        self.kicked
    }

    pub fn is_banned(&self) -> bool {
        self.banned
    }

    /// The rejection to send if this connection may not post messages.
    pub fn silenced(&self) -> Option<Rejection> {
        if self.banned {
            Some(Rejection::Banned)
        } else if self.kicked {
            Some(Rejection::Kicked)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_challenge_never_grants() {
        let mut ledger = PrivilegeLedger::default();
        let t0 = Instant::now();
        assert_eq!(ledger.challenge(t0), Challenge::Pending);
        assert!(!ledger.is_granted());
        assert_eq!(ledger.grant, Grant::Challenged { since: t0 });
    }

    #[test]
    fn second_challenge_inside_window_grants() {
        let mut ledger = PrivilegeLedger::default();
        let t0 = Instant::now();
        ledger.challenge(t0);
        assert_eq!(ledger.challenge(t0 + Duration::from_secs(5)), Challenge::Granted);
        assert!(ledger.is_granted());
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let mut ledger = PrivilegeLedger::default();
        let t0 = Instant::now();
        ledger.challenge(t0);
        assert_eq!(ledger.challenge(t0 + CHALLENGE_WINDOW), Challenge::Granted);
    }

    #[test]
    fn expired_window_restarts_challenge() {
        let mut ledger = PrivilegeLedger::default();
        let t0 = Instant::now();
        ledger.challenge(t0);
        let t1 = t0 + Duration::from_secs(11);
        assert_eq!(ledger.challenge(t1), Challenge::Pending);
        assert_eq!(ledger.grant, Grant::Challenged { since: t1 });
        // The fresh window is measured from t1, not t0.
        assert_eq!(ledger.challenge(t1 + Duration::from_secs(3)), Challenge::Granted);
    }

    #[test]
    fn repeated_phrase_after_grant_is_noop() {
        let mut ledger = PrivilegeLedger::default();
        let t0 = Instant::now();
        ledger.challenge(t0);
        ledger.challenge(t0 + Duration::from_secs(1));
        assert_eq!(ledger.challenge(t0 + Duration::from_secs(60)), Challenge::AlreadyGranted);
        assert!(ledger.is_granted());
    }

    #[test]
    fn blocked_connection_cannot_challenge() {
        let mut ledger = PrivilegeLedger::default();
        let t0 = Instant::now();
        ledger.challenge(t0);
        ledger.challenge(t0);
        ledger.block_admin();
        assert!(!ledger.is_granted());
        assert_eq!(ledger.challenge(t0), Challenge::Blocked);
        assert_eq!(ledger.grant, Grant::Unchallenged);
    }

    #[test]
    fn unban_clears_markers_and_grant_but_not_block() {
        let mut ledger = PrivilegeLedger::default();
        let t0 = Instant::now();
        ledger.challenge(t0);
        ledger.challenge(t0);
        ledger.ban();
        assert_eq!(ledger.silenced(), Some(Rejection::Banned));

        ledger.unban();
        assert_eq!(ledger.silenced(), None);
        assert!(!ledger.is_granted());

        ledger.block_admin();
        ledger.unban();
        assert!(ledger.is_admin_blocked());
    }

    #[test]
    fn kick_and_ban_drop_the_grant() {
        let mut ledger = PrivilegeLedger::default();
        let t0 = Instant::now();
        ledger.challenge(t0);
        ledger.challenge(t0);
        ledger.kick();
        assert!(!ledger.is_granted());

        ledger.unban();
        ledger.challenge(t0);
        ledger.challenge(t0);
        ledger.ban();
        assert!(!ledger.is_granted());
        assert_eq!(ledger.grant, Grant::Unchallenged);
    }

    #[test]
    fn kick_silences_without_ban() {
        let mut ledger = PrivilegeLedger::default();
        ledger.kick();
        assert!(ledger.is_kicked());
        assert!(!ledger.is_banned());
        assert_eq!(ledger.silenced(), Some(Rejection::Kicked));
    }
}
