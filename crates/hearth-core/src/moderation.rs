//! Command execution and scheduled moderation tasks.
//!
//! Countdowns never hold a timer themselves. Each step returns an
//! [`Effect::Schedule`] for the next one and the relay feeds the task back
//! through [`Hub::run_task`]. At most one task per [`TaskKey`] is in flight;
//! removing the key cancels the rest of the countdown.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::command::{self, Command, CommandError};
use crate::credential::Credential;
use crate::error::{Rejection, Result};
use crate::event::ChatEvent;
use crate::hub::{Effect, Hub, Signal};
use crate::privilege::Challenge;
use crate::ratelimit::RateLimiter;
use crate::registry::ConnectionId;

pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
pub const DISABLE_DELAY: Duration = Duration::from_secs(5);
pub const KICK_STEPS: u32 = 3;
pub const CLEAR_STEPS: u32 = 3;
pub const SHUTDOWN_STEPS: u32 = 5;

/// Process-wide moderation switches. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct Moderation {
    pub temp_disabled: bool,
    pub limiter: RateLimiter,
}

/// A delayed step of a moderation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    KickCountdown { target: ConnectionId, remaining: u32 },
    ClearCountdown { remaining: u32 },
    ShutdownCountdown { remaining: u32 },
    ApplyDisable,
}

/// Identifies the operation a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKey {
    Kick(ConnectionId),
    ClearHistory,
    Shutdown,
    Disable,
}

impl Task {
    pub fn key(&self) -> TaskKey {
        match *self {
            Task::KickCountdown { target, .. } => TaskKey::Kick(target),
            Task::ClearCountdown { .. } => TaskKey::ClearHistory,
            Task::ShutdownCountdown { .. } => TaskKey::Shutdown,
            Task::ApplyDisable => TaskKey::Disable,
        }
    }
}

fn announce(text: impl Into<String>) -> Effect {
    Effect::Publish(ChatEvent::system(text))
}

impl Hub {
    /// Route text under the command prefix: elevation, authorization, then
    /// execution.
    pub(crate) fn command(
        &mut self,
        actor: ConnectionId,
        parsed: std::result::Result<Command, CommandError>,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) {
        // A silenced connection can neither elevate nor act on a grant.
        if let Some(rejection) = self.registry.find(actor).and_then(|s| s.ledger.silenced()) {
            effects.push(Effect::notice(actor, rejection));
            return;
        }
        if let Ok(Command::Elevate) = parsed {
            self.elevate(actor, now, effects);
            return;
        }
        if !self.is_authorized(actor) {
            effects.push(Effect::notice(actor, Rejection::Unauthorized));
            return;
        }
        match parsed {
            Ok(cmd) => self.execute(actor, cmd, effects),
            Err(err) => effects.push(Effect::notice(actor, Rejection::from(err))),
        }
    }

    fn elevate(&mut self, actor: ConnectionId, now: Instant, effects: &mut Vec<Effect>) {
        let Some(session) = self.registry.find_mut(actor) else {
            return;
        };
        // The reserved identity already holds every privilege.
        if session.is_reserved() {
            return;
        }
        match session.ledger.challenge(now) {
            Challenge::Pending => effects.push(Effect::notice(actor, "Ok")),
            Challenge::Granted => {
                let name = session.display_name().to_string();
                info!(%name, "temporary admin granted");
                effects.push(Effect::notice(actor, "Temp Admin Granted"));
                self.notify_reserved(format!("🔐 {name} was granted temporary admin access."), effects);
            }
            Challenge::AlreadyGranted => {}
            Challenge::Blocked => effects.push(Effect::notice(actor, Rejection::AdminBlocked)),
        }
    }

    fn execute(&mut self, actor: ConnectionId, cmd: Command, effects: &mut Vec<Effect>) {
        let Some(session) = self.registry.find(actor) else {
            return;
        };
        let actor_name = session.display_name().to_string();
        let actor_reserved = session.is_reserved();
        let audit = cmd.to_string();
        let audited = !matches!(cmd, Command::Help);

        let result = match cmd {
            Command::Elevate | Command::Help => {
                let help = command::help_text(actor_reserved, &self.config.reserved_name);
                effects.push(Effect::notice(actor, help));
                Ok(())
            }
            Command::SlowMode(on) => {
                self.moderation.limiter.set_enabled(on);
                effects.push(announce(if on {
                    "⏳ Slow mode has been enabled."
                } else {
                    "🚀 Slow mode has been disabled."
                }));
                Ok(())
            }
            Command::SlowModeInterval(interval) => {
                self.moderation.limiter.set_interval(interval);
                effects.push(Effect::notice(
                    actor,
                    format!("⏳ Slow mode interval set to {} seconds.", interval.as_secs_f64()),
                ));
                Ok(())
            }
            Command::Disable => self.schedule_disable(effects),
            Command::Enable => self.enable_chat(effects),
            Command::ClearHistory => self.start_clear(effects),
            Command::Kick(name) => self.start_kick(&name, effects),
            Command::Ban(name) => self.ban(&name, effects),
            Command::Unban(name) => self.unban(actor, &name, effects),
            Command::Block(name) => self.block(actor, actor_reserved, &name, effects),
            Command::SetPassword(secret) => self.set_password(actor, actor_reserved, &secret, effects),
            Command::Broadcast(text) => {
                effects.push(announce(format!("📢 {text}")));
                Ok(())
            }
            Command::Shutdown => self.start_shutdown(effects),
            Command::Unknown(keyword) => Err(Rejection::UnknownCommand(keyword)),
        };

        match result {
            Ok(()) => {
                if audited {
                    info!(actor = %actor_name, command = %audit, "admin command");
                    if !actor_reserved {
                        self.notify_reserved(format!("🔎 {actor_name} used: {audit}"), effects);
                    }
                }
            }
            Err(rejection) => effects.push(Effect::notice(actor, rejection)),
        }
    }

    /// Private notice to the reserved identity, if connected.
    fn notify_reserved(&self, text: String, effects: &mut Vec<Effect>) {
        if let Some(reserved) = self.registry.reserved() {
            effects.push(Effect::notice(reserved.id, text));
        }
    }

    fn schedule_disable(&mut self, effects: &mut Vec<Effect>) -> Result<()> {
        if self.moderation.temp_disabled {
            return Err(Rejection::Conflict("Chat is already disabled.".to_string()));
        }
        if !self.in_flight.insert(TaskKey::Disable) {
            return Err(Rejection::Conflict("Chat is already being disabled.".to_string()));
        }
        effects.push(announce(format!(
            "⚠️ Chat will be temporarily disabled in {} seconds.",
            DISABLE_DELAY.as_secs()
        )));
        effects.push(Effect::Schedule {
            task: Task::ApplyDisable,
            after: DISABLE_DELAY,
        });
        Ok(())
    }

    fn enable_chat(&mut self, effects: &mut Vec<Effect>) -> Result<()> {
        let pending = self.in_flight.remove(&TaskKey::Disable);
        if !self.moderation.temp_disabled && !pending {
            return Err(Rejection::Conflict("Chat is not disabled.".to_string()));
        }
        if self.moderation.temp_disabled {
            self.moderation.temp_disabled = false;
            effects.push(Effect::Signal(Signal::DisableOff));
        }
        info!("chat re-enabled");
        effects.push(announce("✅ Chat has been re-enabled."));
        Ok(())
    }

    fn start_clear(&mut self, effects: &mut Vec<Effect>) -> Result<()> {
        if !self.in_flight.insert(TaskKey::ClearHistory) {
            return Err(Rejection::Conflict("History clear already in progress.".to_string()));
        }
        self.clear_step(CLEAR_STEPS, effects);
        Ok(())
    }

    fn clear_step(&mut self, remaining: u32, effects: &mut Vec<Effect>) {
        if remaining == 0 {
            self.in_flight.remove(&TaskKey::ClearHistory);
            info!("chat history cleared");
            effects.push(Effect::ClearHistory);
            effects.push(Effect::Signal(Signal::HistoryCleared));
            return;
        }
        effects.push(announce(format!("🧹 Clearing chat history in {remaining}...")));
        effects.push(Effect::Schedule {
            task: Task::ClearCountdown {
                remaining: remaining - 1,
            },
            after: COUNTDOWN_TICK,
        });
    }

    fn start_kick(&mut self, name: &str, effects: &mut Vec<Effect>) -> Result<()> {
        let target = self
            .registry
            .find_by_name(name)
            .ok_or_else(|| Rejection::UserNotFound(name.to_string()))?;
        let (target_id, target_name) = (target.id, target.original_name().to_string());
        if target.is_reserved() {
            return Err(Rejection::Conflict(format!("{target_name} cannot be kicked.")));
        }
        if target.ledger.is_kicked() {
            return Err(Rejection::Conflict(format!("{target_name} is already kicked.")));
        }
        if !self.in_flight.insert(TaskKey::Kick(target_id)) {
            return Err(Rejection::Conflict(format!(
                "A kick for {target_name} is already in progress."
            )));
        }
        self.kick_step(target_id, KICK_STEPS, effects);
        Ok(())
    }

    fn kick_step(&mut self, target: ConnectionId, remaining: u32, effects: &mut Vec<Effect>) {
        let Some(session) = self.registry.find_mut(target) else {
            self.in_flight.remove(&TaskKey::Kick(target));
            return;
        };
        if remaining > 0 {
            effects.push(Effect::notice(
                target,
                format!("⚠️ You will be kicked in {remaining}..."),
            ));
            effects.push(Effect::Schedule {
                task: Task::KickCountdown {
                    target,
                    remaining: remaining - 1,
                },
                after: COUNTDOWN_TICK,
            });
            return;
        }
        session.ledger.kick();
        let name = session.original_name().to_string();
        self.in_flight.remove(&TaskKey::Kick(target));
        warn!(%name, "kicked");
        effects.push(Effect::notice(target, "❌ You have been kicked by an admin."));
        effects.push(announce(format!("👢 {name} has been kicked.")));
    }

    fn ban(&mut self, name: &str, effects: &mut Vec<Effect>) -> Result<()> {
        let target = self
            .registry
            .find_by_name(name)
            .ok_or_else(|| Rejection::UserNotFound(name.to_string()))?;
        let (target_id, target_name) = (target.id, target.original_name().to_string());
        if target.is_reserved() {
            return Err(Rejection::Conflict(format!("{target_name} cannot be banned.")));
        }
        if target.ledger.is_banned() {
            return Err(Rejection::Conflict(format!("{target_name} is already banned.")));
        }
        self.in_flight.remove(&TaskKey::Kick(target_id));
        if let Some(session) = self.registry.find_mut(target_id) {
            session.ledger.ban();
        }
        warn!(name = %target_name, "banned");
        effects.push(Effect::notice(target_id, "⛔ You have been banned by an admin."));
        effects.push(announce(format!("⛔ {target_name} has been banned.")));
        Ok(())
    }

    fn unban(&mut self, actor: ConnectionId, name: &str, effects: &mut Vec<Effect>) -> Result<()> {
        let target = self
            .registry
            .find_by_name(name)
            .ok_or_else(|| Rejection::UserNotFound(name.to_string()))?;
        let target_id = target.id;
        let target_name = target.original_name().to_string();
        self.in_flight.remove(&TaskKey::Kick(target_id));
        if let Some(session) = self.registry.find_mut(target_id) {
            session.ledger.unban();
        }
        info!(name = %target_name, "unbanned");
        effects.push(Effect::notice(target_id, "✅ You can send messages again."));
        if actor != target_id {
            effects.push(Effect::notice(actor, format!("✅ {target_name} has been unbanned.")));
        }
        Ok(())
    }

    fn block(
        &mut self,
        actor: ConnectionId,
        actor_reserved: bool,
        name: &str,
        effects: &mut Vec<Effect>,
    ) -> Result<()> {
        if !actor_reserved {
            return Err(Rejection::ReservedOnly(self.config.reserved_name.clone()));
        }
        let session = self
            .registry
            .find_by_name(name)
            .map(|s| s.id)
            .and_then(|id| self.registry.find_mut(id))
            .ok_or_else(|| Rejection::UserNotFound(name.to_string()))?;
        if session.is_reserved() {
            return Err(Rejection::Conflict(format!(
                "{} cannot be blocked.",
                session.original_name()
            )));
        }
        session.ledger.block_admin();
        let target_name = session.original_name().to_string();
        warn!(name = %target_name, "blocked from admin access");
        effects.push(Effect::notice(
            actor,
            format!("🚫 {target_name} can no longer request admin access."),
        ));
        Ok(())
    }

    fn set_password(
        &mut self,
        actor: ConnectionId,
        actor_reserved: bool,
        secret: &str,
        effects: &mut Vec<Effect>,
    ) -> Result<()> {
        if !actor_reserved {
            return Err(Rejection::ReservedOnly(self.config.reserved_name.clone()));
        }
        if secret.is_empty() {
            return Err(CommandError::EmptyPassword.into());
        }
        self.credential = Credential::from_secret(secret);
        info!("admin password changed");
        effects.push(Effect::StoreCredential(self.credential.clone()));
        effects.push(Effect::notice(actor, "🔑 Password updated."));
        Ok(())
    }

    fn start_shutdown(&mut self, effects: &mut Vec<Effect>) -> Result<()> {
        if !self.in_flight.insert(TaskKey::Shutdown) {
            return Err(Rejection::Conflict("Shutdown already in progress.".to_string()));
        }
        warn!("shutdown requested");
        self.shutdown_step(SHUTDOWN_STEPS, effects);
        Ok(())
    }

    fn shutdown_step(&mut self, remaining: u32, effects: &mut Vec<Effect>) {
        if remaining == 0 {
            // The key stays in flight: nothing may start another shutdown.
            effects.push(Effect::Signal(Signal::ShutdownInitiated));
            effects.push(Effect::Shutdown);
            return;
        }
        effects.push(announce(format!("🛑 Server shutting down in {remaining}...")));
        effects.push(Effect::Schedule {
            task: Task::ShutdownCountdown {
                remaining: remaining - 1,
            },
            after: COUNTDOWN_TICK,
        });
    }

    /// Run a scheduled task. A task whose operation was cancelled is a no-op.
    pub fn run_task(&mut self, task: Task) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.in_flight.contains(&task.key()) {
            return effects;
        }
        match task {
            Task::KickCountdown { target, remaining } => self.kick_step(target, remaining, &mut effects),
            Task::ClearCountdown { remaining } => self.clear_step(remaining, &mut effects),
            Task::ShutdownCountdown { remaining } => self.shutdown_step(remaining, &mut effects),
            Task::ApplyDisable => {
                self.in_flight.remove(&TaskKey::Disable);
                self.moderation.temp_disabled = true;
                warn!("chat temporarily disabled");
                effects.push(Effect::Signal(Signal::DisableOn));
                effects.push(announce("🔒 Chat has been temporarily disabled."));
            }
        }
        effects
    }
}
