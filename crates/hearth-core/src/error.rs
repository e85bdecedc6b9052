//! Error types for hearth-core.
//!
//! Every rejection is surfaced to the user as a private system reply; none of
//! them is fatal. The `Display` text of each variant is that reply.

use thiserror::Error;

/// Why an inbound action was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    // -- user rejected --
    #[error("⏳ Slow mode is enabled. Please wait before sending another message.")]
    Throttled,

    #[error("❌ Your message was blocked due to profanity.")]
    Filtered,

    #[error("❌ Your private message was blocked due to profanity.")]
    FilteredPrivate,

    #[error("❌ You are not authorized to use server commands.")]
    Unauthorized,

    #[error("❌ Only {0} can use this command.")]
    ReservedOnly(String),

    #[error("❌ You are not permitted to request admin access.")]
    AdminBlocked,

    #[error("❌ You have been kicked and cannot send messages.")]
    Kicked,

    #[error("⛔ You have been banned and cannot send messages.")]
    Banned,

    #[error("❌ Chat is temporarily disabled.")]
    ChatDisabled,

    #[error("You are already registered.")]
    AlreadyRegistered,

    #[error("{0} is already connected.")]
    DuplicateIdentity(String),

    #[error("❌ Incorrect password. Registration refused.")]
    RegistrationRefused,

    // -- input invalid --
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Unknown command '{0}'. Send 'server init help' for a list of commands.")]
    UnknownCommand(String),

    // -- lookup failed --
    #[error("User '{0}' not found.")]
    UserNotFound(String),
}

/// Result type alias for hearth-core operations.
pub type Result<T> = std::result::Result<T, Rejection>;
