//! The message admission pipeline.
//!
//! [`Hub`] owns every piece of mutable chat state: the registry, the
//! per-connection ledgers, the moderation switches and the in-flight task
//! set. Each operation takes `&mut self` and returns the effects the caller
//! must carry out, in order. Nothing here touches the network or the disk.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::command;
use crate::credential::Credential;
use crate::error::Rejection;
use crate::event::ChatEvent;
use crate::filter::ContentFilter;
use crate::moderation::{Moderation, Task, TaskKey};
use crate::ratelimit::{self, RateDecision, RateLimiter};
use crate::registry::{ConnectionId, Identity, Presence, Registry, same_name, validate_name};

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Name of the single privileged identity.
    pub reserved_name: String,
    pub idle_timeout: Duration,
    /// Maximum characters in one chat or private message.
    pub max_message_len: usize,
    pub slow_mode: bool,
    pub slow_mode_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            reserved_name: "Admin".to_string(),
            idle_timeout: Duration::from_secs(300),
            max_message_len: 2000,
            slow_mode: true,
            slow_mode_interval: ratelimit::DEFAULT_INTERVAL,
        }
    }
}

/// Something the relay must do on behalf of the hub.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Private system reply to one connection. Never persisted.
    Notice { to: ConnectionId, text: String },
    /// Append to history, persist, broadcast to everyone.
    Publish(ChatEvent),
    /// Private message delivered to one connection.
    Whisper {
        to: ConnectionId,
        from: String,
        text: String,
    },
    /// Typing indicator for everyone except `from`.
    Typing {
        from: ConnectionId,
        user: String,
        is_typing: bool,
    },
    Presence(Vec<Presence>),
    Signal(Signal),
    /// Truncate and persist the history log.
    ClearHistory,
    StoreCredential(Credential),
    Schedule { task: Task, after: Duration },
    /// Stop the process gracefully.
    Shutdown,
}

impl Effect {
    pub fn notice(to: ConnectionId, text: impl ToString) -> Self {
        Effect::Notice {
            to,
            text: text.to_string(),
        }
    }
}

/// Control signals broadcast to all clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    DisableOn,
    DisableOff,
    HistoryCleared,
    ShutdownInitiated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Second,
}

/// A connection that asked for the reserved identity and owes a password.
#[derive(Debug, Clone)]
pub struct PasswordPrompt {
    identity: Identity,
    attempt: Attempt,
}

#[derive(Debug)]
pub struct Hub {
    pub(crate) config: HubConfig,
    pub(crate) registry: Registry,
    pub(crate) moderation: Moderation,
    pub(crate) filter: ContentFilter,
    pub(crate) credential: Credential,
    prompts: HashMap<ConnectionId, PasswordPrompt>,
    refused: HashSet<ConnectionId>,
    pub(crate) in_flight: HashSet<TaskKey>,
}

impl Hub {
    pub fn new(config: HubConfig, credential: Credential) -> Self {
        let moderation = Moderation {
            temp_disabled: false,
            limiter: RateLimiter::new(config.slow_mode, config.slow_mode_interval),
        };
        let registry = Registry::with_reserved(config.reserved_name.clone());
        Self {
            config,
            registry,
            moderation,
            filter: ContentFilter::default(),
            credential,
            prompts: HashMap::new(),
            refused: HashSet::new(),
            in_flight: HashSet::new(),
        }
    }

    pub fn set_filter(&mut self, filter: ContentFilter) {
        info!(words = filter.len(), "content filter updated");
        self.filter = filter;
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_disabled(&self) -> bool {
        self.moderation.temp_disabled
    }

    pub fn slow_mode(&self) -> &RateLimiter {
        &self.moderation.limiter
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn is_in_flight(&self, key: TaskKey) -> bool {
        self.in_flight.contains(&key)
    }

    /// The reserved identity always holds privilege; anyone else needs a
    /// granted ledger.
    pub fn is_authorized(&self, id: ConnectionId) -> bool {
        self.registry
            .find(id)
            .is_some_and(|s| s.is_reserved() || s.ledger.is_granted())
    }

    pub fn register(&mut self, id: ConnectionId, identity: Identity, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.refused.contains(&id) {
            effects.push(Effect::notice(id, Rejection::RegistrationRefused));
            return effects;
        }
        if self.registry.find(id).is_some() || self.prompts.contains_key(&id) {
            effects.push(Effect::notice(id, Rejection::AlreadyRegistered));
            return effects;
        }
        let name = match validate_name(&identity.name) {
            Ok(name) => name,
            Err(rejection) => {
                effects.push(Effect::notice(id, rejection));
                return effects;
            }
        };

        if same_name(&name, &self.config.reserved_name) {
            if self.registry.reserved().is_some() {
                effects.push(Effect::notice(
                    id,
                    Rejection::DuplicateIdentity(self.config.reserved_name.clone()),
                ));
                return effects;
            }
            let identity = Identity {
                name: self.config.reserved_name.clone(),
                ..identity
            };
            self.prompts.insert(
                id,
                PasswordPrompt {
                    identity,
                    attempt: Attempt::First,
                },
            );
            effects.push(Effect::notice(
                id,
                format!("🔑 Enter the password for {}.", self.config.reserved_name),
            ));
            return effects;
        }

        if self.moderation.temp_disabled {
            effects.push(Effect::notice(id, Rejection::ChatDisabled));
            return effects;
        }
        self.admit(id, Identity { name, ..identity }, false, now, &mut effects);
        effects
    }

    fn admit(
        &mut self,
        id: ConnectionId,
        identity: Identity,
        reserved: bool,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        let requested = identity.name.clone();
        let name = match self.registry.register(id, identity, reserved, now) {
            Ok(session) => session.original_name().to_string(),
            Err(rejection) => {
                effects.push(Effect::notice(id, rejection));
                return;
            }
        };
        info!(%name, reserved, "joined");
        if name != requested {
            effects.push(Effect::notice(
                id,
                format!("The name {requested} is taken. You are now known as {name}."),
            ));
        }
        effects.push(Effect::Presence(self.registry.presence()));
        effects.push(Effect::Publish(ChatEvent::system(format!("{name} has joined the chat."))));
    }

    fn answer_prompt(
        &mut self,
        id: ConnectionId,
        prompt: PasswordPrompt,
        answer: &str,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        if self.credential.matches(answer.trim()) {
            self.admit(id, prompt.identity, true, now, effects);
            return;
        }
        match prompt.attempt {
            Attempt::First => {
                warn!(connection = %id, "wrong password for reserved identity");
                self.prompts.insert(
                    id,
                    PasswordPrompt {
                        attempt: Attempt::Second,
                        ..prompt
                    },
                );
                effects.push(Effect::notice(id, "❌ Incorrect password. One attempt remaining."));
            }
            Attempt::Second => {
                warn!(connection = %id, "reserved identity refused after two wrong passwords");
                self.refused.insert(id);
                effects.push(Effect::notice(id, Rejection::RegistrationRefused));
            }
        }
    }

    /// Admit or reject one chat message.
    ///
    /// Order: password prompt, session lookup, commands, temp-disable,
    /// kick/ban, slow mode, activity, length, content filter, publish.
    pub fn handle_chat(&mut self, id: ConnectionId, text: &str, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(prompt) = self.prompts.remove(&id) {
            self.answer_prompt(id, prompt, text, now, &mut effects);
            return effects;
        }
        if self.registry.find(id).is_none() {
            return effects;
        }
        let text = text.trim();
        if text.is_empty() {
            return effects;
        }
        if let Some(parsed) = command::parse(text) {
            self.command(id, parsed, now, &mut effects);
            return effects;
        }

        if let Err(rejection) = self.admit_message(id, text, now) {
            effects.push(Effect::notice(id, rejection));
            return effects;
        }
        if let Some(session) = self.registry.find(id) {
            effects.push(Effect::Publish(ChatEvent::from_session(session, text)));
        }
        effects
    }

    fn admit_message(&mut self, id: ConnectionId, text: &str, now: Instant) -> Result<(), Rejection> {
        if self.moderation.temp_disabled {
            return Err(Rejection::ChatDisabled);
        }
        let Some(session) = self.registry.find_mut(id) else {
            return Ok(());
        };
        if let Some(rejection) = session.ledger.silenced() {
            return Err(rejection);
        }
        if let RateDecision::Throttled { retry_after } =
            self.moderation.limiter.check(&mut session.last_accepted, now)
        {
            debug!(name = %session.original_name(), ?retry_after, "throttled");
            return Err(Rejection::Throttled);
        }
        session.touch(now);
        check_length(text, self.config.max_message_len)?;
        if self.filter.is_blocked(text) {
            info!(name = %session.original_name(), "message blocked by content filter");
            return Err(Rejection::Filtered);
        }
        Ok(())
    }

    pub fn private_message(
        &mut self,
        id: ConnectionId,
        recipient: &str,
        text: &str,
        now: Instant,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let text = text.trim();
        let Some(sender) = self.registry.find(id) else {
            return effects;
        };
        if text.is_empty() {
            return effects;
        }
        let checked = if self.moderation.temp_disabled {
            Err(Rejection::ChatDisabled)
        } else if let Some(rejection) = sender.ledger.silenced() {
            Err(rejection)
        } else if let Err(rejection) = check_length(text, self.config.max_message_len) {
            Err(rejection)
        } else if self.filter.is_blocked(text) {
            Err(Rejection::FilteredPrivate)
        } else {
            self.registry
                .find_by_name(recipient)
                .map(|r| r.id)
                .ok_or_else(|| Rejection::UserNotFound(recipient.trim().to_string()))
        };
        match checked {
            Ok(to) => {
                let from = sender.display_name().to_string();
                debug!(%from, "private message");
                effects.push(Effect::Whisper {
                    to,
                    from,
                    text: text.to_string(),
                });
                if let Some(session) = self.registry.find_mut(id) {
                    session.touch(now);
                }
            }
            Err(rejection) => effects.push(Effect::notice(id, rejection)),
        }
        effects
    }

    pub fn typing(&mut self, id: ConnectionId, is_typing: bool) -> Vec<Effect> {
        let Some(session) = self.registry.find(id) else {
            return Vec::new();
        };
        if self.moderation.temp_disabled || session.ledger.silenced().is_some() {
            return Vec::new();
        }
        vec![Effect::Typing {
            from: id,
            user: session.display_name().to_string(),
            is_typing,
        }]
    }

    pub fn rename(&mut self, id: ConnectionId, requested: &str, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(session) = self.registry.find(id) else {
            return effects;
        };
        if session.is_reserved() {
            effects.push(Effect::notice(
                id,
                Rejection::InvalidInput(format!("{} cannot change name.", self.config.reserved_name)),
            ));
            return effects;
        }
        let old = session.original_name().to_string();
        let name = match validate_name(requested) {
            Ok(name) => name,
            Err(rejection) => {
                effects.push(Effect::notice(id, rejection));
                return effects;
            }
        };
        if same_name(&name, &self.config.reserved_name) {
            effects.push(Effect::notice(
                id,
                Rejection::Conflict(format!("The name {} is reserved.", self.config.reserved_name)),
            ));
            return effects;
        }
        if name == old {
            return effects;
        }
        let Some(assigned) = self.registry.rename(id, &name) else {
            return effects;
        };
        if let Some(session) = self.registry.find_mut(id) {
            session.touch(now);
        }
        info!(%old, new = %assigned, "renamed");
        effects.push(Effect::Presence(self.registry.presence()));
        effects.push(Effect::Publish(ChatEvent::system(format!(
            "{old} is now known as {assigned}."
        ))));
        effects
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> Vec<Effect> {
        self.prompts.remove(&id);
        self.refused.remove(&id);
        self.in_flight.remove(&TaskKey::Kick(id));
        let Some(session) = self.registry.remove(id) else {
            return Vec::new();
        };
        let name = session.original_name();
        info!(%name, "left");
        vec![
            Effect::Presence(self.registry.presence()),
            Effect::Publish(ChatEvent::system(format!("{name} has left the chat."))),
        ]
    }

    /// One idle-sweep tick: a single presence update if anything changed.
    pub fn sweep_idle(&mut self, now: Instant) -> Vec<Effect> {
        if self.registry.sweep_idle(now, self.config.idle_timeout) {
            vec![Effect::Presence(self.registry.presence())]
        } else {
            Vec::new()
        }
    }
}

fn check_length(text: &str, max: usize) -> Result<(), Rejection> {
    if text.chars().count() > max {
        return Err(Rejection::InvalidInput(format!(
            "Message is too long (max {max} characters)."
        )));
    }
    Ok(())
}
