//! Connection registry: live sessions keyed by connection identity.
//!
//! The registry owns identity uniqueness. Names are compared
//! case-insensitively; a colliding request is suffixed with `2`, `3`, ...
//! until it is free. The reserved identity is never suffixed, only one
//! connection may hold it at a time.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Rejection, Result};
use crate::event::SERVER_AUTHOR;
use crate::privilege::PrivilegeLedger;

/// Maximum identity length in characters.
pub const MAX_NAME_LEN: usize = 32;

const IDLE_SUFFIX: &str = " (idle)";

/// Opaque identity of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// What a client asks to be known as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub color: String,
    pub avatar: String,
}

/// The live state of one connected participant.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: ConnectionId,
    original_name: String,
    display_name: String,
    pub color: String,
    pub avatar: String,
    last_activity: Instant,
    idle: bool,
    reserved: bool,
    /// Privilege and moderation flags for this connection.
    pub ledger: PrivilegeLedger,
    /// When the last ordinary message was accepted (slow-mode cooldown).
    pub last_accepted: Option<Instant>,
}

impl Session {
    fn new(id: ConnectionId, name: String, identity: Identity, reserved: bool, now: Instant) -> Self {
        Self {
            id,
            display_name: name.clone(),
            original_name: name,
            color: identity.color,
            avatar: identity.avatar,
            last_activity: now,
            idle: false,
            reserved,
            ledger: PrivilegeLedger::default(),
            last_accepted: None,
        }
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// The original name, plus an idle marker while idle.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Whether this session holds the reserved privileged identity.
    pub fn is_reserved(&self) -> bool {
        self.reserved
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Record activity. The idle flag itself is only flipped by the sweep.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    fn set_idle(&mut self, idle: bool) {
        self.idle = idle;
        self.display_name = if idle {
            format!("{}{IDLE_SUFFIX}", self.original_name)
        } else {
            self.original_name.clone()
        };
    }

    fn set_name(&mut self, name: String) {
        self.original_name = name;
        let idle = self.idle;
        self.set_idle(idle);
    }
}

/// One entry of the presence list broadcast to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub display_name: String,
    pub color: String,
    pub avatar: String,
}

/// Case-insensitive identity comparison.
pub fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Trim a requested name and check it is usable as an identity.
///
/// Names that could pass for the server or for someone else's idle display
/// name are refused.
pub fn validate_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_LEN || name.chars().any(char::is_control) {
        return Err(Rejection::InvalidInput(format!(
            "Names must be 1-{MAX_NAME_LEN} characters with no control characters."
        )));
    }
    if same_name(name, SERVER_AUTHOR) {
        return Err(Rejection::InvalidInput(format!("The name {SERVER_AUTHOR} is reserved.")));
    }
    if name.to_lowercase().ends_with(IDLE_SUFFIX) {
        return Err(Rejection::InvalidInput(format!(
            "Names may not end with \"{}\".",
            IDLE_SUFFIX.trim()
        )));
    }
    Ok(name.to_string())
}

/// Active sessions in join order.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Vec<Session>,
    /// Never handed out by suffixing, even while nobody holds it.
    reserved_name: String,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reserved(reserved_name: impl Into<String>) -> Self {
        Self {
            sessions: Vec::new(),
            reserved_name: reserved_name.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    /// Create a session for `id`.
    ///
    /// Ordinary names are made unique by suffixing. A reserved registration
    /// keeps its name verbatim and is rejected if the reserved identity is
    /// already connected.
    pub fn register(
        &mut self,
        id: ConnectionId,
        identity: Identity,
        reserved: bool,
        now: Instant,
    ) -> Result<&Session> {
        if self.find(id).is_some() {
            return Err(Rejection::AlreadyRegistered);
        }
        let name = if reserved {
            if self.reserved().is_some() {
                return Err(Rejection::DuplicateIdentity(identity.name));
            }
            identity.name.clone()
        } else {
            self.unique_name(&identity.name, None)
        };
        self.sessions.push(Session::new(id, name, identity, reserved, now));
        Ok(&self.sessions[self.sessions.len() - 1])
    }

    /// First free variant of `requested`: the name itself, then `name2`,
    /// `name3`, ... The base is shortened so a suffixed name still fits in
    /// [`MAX_NAME_LEN`]. Sessions equal to `except` are ignored.
    pub fn unique_name(&self, requested: &str, except: Option<ConnectionId>) -> String {
        if !self.name_taken(requested, except) {
            return requested.to_string();
        }
        let mut n: u32 = 2;
        loop {
            let suffix = n.to_string();
            let base: String = requested
                .chars()
                .take(MAX_NAME_LEN.saturating_sub(suffix.len()))
                .collect();
            let candidate = format!("{base}{suffix}");
            if !self.name_taken(&candidate, except) {
                return candidate;
            }
            n += 1;
        }
    }

    fn name_taken(&self, name: &str, except: Option<ConnectionId>) -> bool {
        same_name(&self.reserved_name, name)
            || self
                .sessions
                .iter()
                .filter(|s| Some(s.id) != except)
                .any(|s| same_name(&s.original_name, name))
    }

    pub fn find(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn find_mut(&mut self, id: ConnectionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    /// Look up by original or display name, ignoring case. An original-name
    /// match wins over a display-name match.
    pub fn find_by_name(&self, name: &str) -> Option<&Session> {
        let name = name.trim();
        self.sessions
            .iter()
            .find(|s| same_name(&s.original_name, name))
            .or_else(|| self.sessions.iter().find(|s| same_name(&s.display_name, name)))
    }

    /// The session holding the reserved identity, if connected.
    pub fn reserved(&self) -> Option<&Session> {
        self.sessions.iter().find(|s| s.reserved)
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Session> {
        let idx = self.sessions.iter().position(|s| s.id == id)?;
        Some(self.sessions.remove(idx))
    }

    /// Rename a session, applying the uniqueness rule against everyone else.
    /// Returns the name actually assigned.
    pub fn rename(&mut self, id: ConnectionId, requested: &str) -> Option<String> {
        let name = self.unique_name(requested, Some(id));
        let session = self.find_mut(id)?;
        session.set_name(name.clone());
        Some(name)
    }

    pub fn presence(&self) -> Vec<Presence> {
        self.sessions
            .iter()
            .map(|s| Presence {
                display_name: s.display_name.clone(),
                color: s.color.clone(),
                avatar: s.avatar.clone(),
            })
            .collect()
    }

    /// Flip sessions between idle and active. A session is idle once it has
    /// been inactive for longer than `threshold`.
    ///
    /// Returns true if at least one session changed.
    pub fn sweep_idle(&mut self, now: Instant, threshold: Duration) -> bool {
        let mut changed = false;
        for session in &mut self.sessions {
            let now_idle = now.saturating_duration_since(session.last_activity) > threshold;
            if now_idle != session.idle {
                session.set_idle(now_idle);
                if now_idle {
                    tracing::info!(name = %session.original_name, "now idle");
                } else {
                    tracing::info!(name = %session.original_name, "active again");
                }
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity {
            name: name.to_string(),
            color: "#ff0000".to_string(),
            avatar: "B".to_string(),
        }
    }

    fn join(registry: &mut Registry, name: &str, now: Instant) -> (ConnectionId, String) {
        let id = ConnectionId::random();
        let session = registry.register(id, identity(name), false, now).unwrap();
        (id, session.original_name().to_string())
    }

    #[test]
    fn colliding_names_get_numeric_suffixes() {
        let mut registry = Registry::new();
        let now = Instant::now();
        assert_eq!(join(&mut registry, "Bob", now).1, "Bob");
        assert_eq!(join(&mut registry, "Bob", now).1, "Bob2");
        assert_eq!(join(&mut registry, "Bob", now).1, "Bob3");
    }

    #[test]
    fn collision_check_ignores_case() {
        let mut registry = Registry::new();
        let now = Instant::now();
        join(&mut registry, "Bob", now);
        assert_eq!(join(&mut registry, "bob", now).1, "bob2");
    }

    #[test]
    fn names_stay_unique_after_departures() {
        let mut registry = Registry::new();
        let now = Instant::now();
        let (first, _) = join(&mut registry, "Bob", now);
        join(&mut registry, "Bob", now);
        registry.remove(first);
        // "Bob" is free again, "Bob2" is still held.
        assert_eq!(join(&mut registry, "Bob", now).1, "Bob");
        assert_eq!(join(&mut registry, "BOB", now).1, "BOB3");
    }

    #[test]
    fn reserved_identity_is_single_instance() {
        let mut registry = Registry::new();
        let now = Instant::now();
        registry
            .register(ConnectionId::random(), identity("Admin"), true, now)
            .unwrap();
        let err = registry
            .register(ConnectionId::random(), identity("Admin"), true, now)
            .unwrap_err();
        assert_eq!(err, Rejection::DuplicateIdentity("Admin".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_connection_cannot_register_twice() {
        let mut registry = Registry::new();
        let now = Instant::now();
        let id = ConnectionId::random();
        registry.register(id, identity("Bob"), false, now).unwrap();
        let err = registry.register(id, identity("Alice"), false, now).unwrap_err();
        assert_eq!(err, Rejection::AlreadyRegistered);
    }

    #[test]
    fn find_by_name_matches_display_and_original() {
        let mut registry = Registry::new();
        let start = Instant::now();
        let (id, _) = join(&mut registry, "Carol", start);
        registry.sweep_idle(start + Duration::from_secs(301), Duration::from_secs(300));

        assert_eq!(registry.find_by_name("carol").map(|s| s.id), Some(id));
        assert_eq!(registry.find_by_name("CAROL (IDLE)").map(|s| s.id), Some(id));
        assert!(registry.find_by_name("dave").is_none());
    }

    #[test]
    fn sweep_marks_idle_and_back() {
        let mut registry = Registry::new();
        let start = Instant::now();
        let threshold = Duration::from_secs(300);
        let (id, _) = join(&mut registry, "Dave", start);

        assert!(!registry.sweep_idle(start + threshold, threshold));
        assert!(registry.sweep_idle(start + threshold + Duration::from_millis(1), threshold));
        assert_eq!(registry.find(id).unwrap().display_name(), "Dave (idle)");
        // Nothing changes on the next tick.
        assert!(!registry.sweep_idle(start + threshold * 2, threshold));

        let later = start + threshold * 2;
        registry.find_mut(id).unwrap().touch(later);
        assert!(registry.sweep_idle(later + Duration::from_secs(5), threshold));
        assert_eq!(registry.find(id).unwrap().display_name(), "Dave");
    }

    #[test]
    fn sweep_reports_one_change_for_many_sessions() {
        let mut registry = Registry::new();
        let start = Instant::now();
        let threshold = Duration::from_secs(300);
        join(&mut registry, "A", start);
        join(&mut registry, "B", start);
        assert!(registry.sweep_idle(start + Duration::from_secs(400), threshold));
        assert!(registry.iter().all(Session::is_idle));
    }

    #[test]
    fn rename_excludes_self_from_collision() {
        let mut registry = Registry::new();
        let now = Instant::now();
        let (bob, _) = join(&mut registry, "Bob", now);
        join(&mut registry, "Alice", now);

        assert_eq!(registry.rename(bob, "bob").as_deref(), Some("bob"));
        assert_eq!(registry.rename(bob, "alice").as_deref(), Some("alice2"));
        assert_eq!(registry.find(bob).unwrap().display_name(), "alice2");
    }

    #[test]
    fn presence_keeps_join_order() {
        let mut registry = Registry::new();
        let now = Instant::now();
        join(&mut registry, "Zed", now);
        join(&mut registry, "Amy", now);
        let names: Vec<_> = registry.presence().into_iter().map(|p| p.display_name).collect();
        assert_eq!(names, vec!["Zed", "Amy"]);
    }

    #[test]
    fn validate_name_rules() {
        assert_eq!(validate_name("  Bob  ").unwrap(), "Bob");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(validate_name("bad\nname").is_err());
        assert!(validate_name(&"é".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[test]
    fn names_that_impersonate_are_refused() {
        assert!(validate_name("Server").is_err());
        assert!(validate_name(" server ").is_err());
        assert!(validate_name("Bob (idle)").is_err());
        assert!(validate_name("Bob (IDLE)").is_err());
        assert!(validate_name("Bob (idle) again").is_ok());
        assert!(validate_name("Servers").is_ok());
    }

    #[test]
    fn original_name_beats_idle_display_name() {
        let mut registry = Registry::new();
        let start = Instant::now();
        let threshold = Duration::from_secs(300);
        let (bob, _) = join(&mut registry, "Bob", start);
        let later = start + Duration::from_secs(400);
        // Stays active through the sweep that idles Bob.
        let (other, _) = join(&mut registry, "Bob", later);
        registry.sweep_idle(later, threshold);
        assert_eq!(registry.find(bob).unwrap().display_name(), "Bob (idle)");

        registry.rename(other, "Bob (idle)");
        assert_eq!(registry.find_by_name("bob (idle)").map(|s| s.id), Some(other));
        assert_eq!(registry.find_by_name("Bob").map(|s| s.id), Some(bob));
    }

    #[test]
    fn suffixed_names_fit_the_length_limit() {
        let mut registry = Registry::new();
        let now = Instant::now();
        let long = "x".repeat(MAX_NAME_LEN);
        join(&mut registry, &long, now);
        let (_, second) = join(&mut registry, &long, now);
        assert_eq!(second.chars().count(), MAX_NAME_LEN);
        assert_eq!(second, format!("{}2", "x".repeat(MAX_NAME_LEN - 1)));
        assert!(validate_name(&second).is_ok());
    }

    #[test]
    fn suffixing_skips_the_reserved_name() {
        let mut registry = Registry::with_reserved("Bob2");
        let now = Instant::now();
        join(&mut registry, "Bob", now);
        assert_eq!(join(&mut registry, "Bob", now).1, "Bob3");
    }
}
