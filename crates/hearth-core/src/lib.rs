//! # hearth-core
//!
//! Core types for the Hearth chat relay:
//! - Connection registry with unique identities and idle tracking
//! - Slow-mode rate limiter
//! - Per-connection privilege ledger (temporary admin, kick, ban, block)
//! - Exact-word content filter
//! - Privileged command parser and executor
//! - The message admission pipeline ([`Hub`])
//!
//! This crate has no network code and no storage code.
//! The relay feeds it inbound events and carries out the [`Effect`]s it returns.

pub mod command;
pub mod credential;
pub mod error;
pub mod event;
pub mod filter;
pub mod hub;
pub mod moderation;
pub mod privilege;
pub mod ratelimit;
pub mod registry;

pub use command::{Command, CommandError};
pub use credential::Credential;
pub use error::{Rejection, Result};
pub use event::ChatEvent;
pub use filter::ContentFilter;
pub use hub::{Effect, Hub, HubConfig, Signal};
pub use moderation::Task;
pub use registry::{ConnectionId, Identity, Presence};
