//! Privileged command parser.
//!
//! Every command starts with [`PREFIX`]. The bare prefix is the elevation
//! phrase; anything after it is a keyword and an optional argument. Keywords
//! are case-insensitive, arguments keep their case.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::error::Rejection;

pub const PREFIX: &str = "server init";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// The bare prefix: a privilege challenge.
    Elevate,
    SlowMode(bool),
    SlowModeInterval(Duration),
    Disable,
    Enable,
    ClearHistory,
    Kick(String),
    Ban(String),
    Unban(String),
    Block(String),
    SetPassword(String),
    Broadcast(String),
    Shutdown,
    Help,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Usage: server init {usage}")]
    Usage { usage: &'static str },

    #[error("Invalid interval '{0}'. Use a positive number of seconds.")]
    InvalidInterval(String),

    #[error("Broadcast text cannot be empty.")]
    EmptyBroadcast,

    #[error("Password cannot be empty.")]
    EmptyPassword,
}

impl From<CommandError> for Rejection {
    fn from(err: CommandError) -> Self {
        Rejection::InvalidInput(err.to_string())
    }
}

/// Parse chat text as a command.
///
/// Returns `None` when the text is not under the command prefix at all, so
/// the caller treats it as an ordinary message. The prefix must be followed
/// by whitespace or the end of the text: `server initial` is plain chat.
pub fn parse(text: &str) -> Option<Result<Command, CommandError>> {
    let text = text.trim();
    let head = text.get(..PREFIX.len())?;
    if !head.eq_ignore_ascii_case(PREFIX) {
        return None;
    }
    let rest = &text[PREFIX.len()..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim();
    if rest.is_empty() {
        return Some(Ok(Command::Elevate));
    }

    let (keyword, arg) = match rest.split_once(char::is_whitespace) {
        Some((keyword, arg)) => (keyword, arg.trim()),
        None => (rest, ""),
    };
    Some(parse_body(&keyword.to_lowercase(), arg))
}

fn parse_body(keyword: &str, arg: &str) -> Result<Command, CommandError> {
    let cmd = match keyword {
        "slowmode" => match arg.to_lowercase().as_str() {
            "on" => Command::SlowMode(true),
            "off" => Command::SlowMode(false),
            "" => {
                return Err(CommandError::Usage {
                    usage: "slowmode on|off|<seconds>",
                });
            }
            _ => Command::SlowModeInterval(parse_interval(arg)?),
        },
        "disable" => Command::Disable,
        "enable" => Command::Enable,
        "clear" => Command::ClearHistory,
        "kick" => Command::Kick(name_arg(arg, "kick <name>")?),
        "ban" => Command::Ban(name_arg(arg, "ban <name>")?),
        "unban" => Command::Unban(name_arg(arg, "unban <name>")?),
        "block" => Command::Block(name_arg(arg, "block <name>")?),
        "password" => {
            if arg.is_empty() {
                return Err(CommandError::EmptyPassword);
            }
            Command::SetPassword(arg.to_string())
        }
        "broadcast" => {
            if arg.is_empty() {
                return Err(CommandError::EmptyBroadcast);
            }
            Command::Broadcast(arg.to_string())
        }
        "shutdown" => Command::Shutdown,
        "help" => Command::Help,
        _ => Command::Unknown(keyword.to_string()),
    };
    Ok(cmd)
}

fn name_arg(arg: &str, usage: &'static str) -> Result<String, CommandError> {
    if arg.is_empty() {
        Err(CommandError::Usage { usage })
    } else {
        Ok(arg.to_string())
    }
}

fn parse_interval(arg: &str) -> Result<Duration, CommandError> {
    let invalid = || CommandError::InvalidInterval(arg.to_string());
    let secs: f64 = arg.parse().map_err(|_| invalid())?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid());
    }
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(invalid()),
    }
}

/// Audit form of a command. Secrets are never shown.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Elevate => write!(f, "{PREFIX}"),
            Command::SlowMode(true) => write!(f, "{PREFIX} slowmode on"),
            Command::SlowMode(false) => write!(f, "{PREFIX} slowmode off"),
            Command::SlowModeInterval(d) => write!(f, "{PREFIX} slowmode {}", d.as_secs_f64()),
            Command::Disable => write!(f, "{PREFIX} disable"),
            Command::Enable => write!(f, "{PREFIX} enable"),
            Command::ClearHistory => write!(f, "{PREFIX} clear"),
            Command::Kick(name) => write!(f, "{PREFIX} kick {name}"),
            Command::Ban(name) => write!(f, "{PREFIX} ban {name}"),
            Command::Unban(name) => write!(f, "{PREFIX} unban {name}"),
            Command::Block(name) => write!(f, "{PREFIX} block {name}"),
            Command::SetPassword(_) => write!(f, "{PREFIX} password ****"),
            Command::Broadcast(text) => write!(f, "{PREFIX} broadcast {text}"),
            Command::Shutdown => write!(f, "{PREFIX} shutdown"),
            Command::Help => write!(f, "{PREFIX} help"),
            Command::Unknown(keyword) => write!(f, "{PREFIX} {keyword}"),
        }
    }
}

/// Help reply. The reserved identity also sees its own commands.
pub fn help_text(reserved: bool, reserved_name: &str) -> String {
    let mut lines = vec![
        format!("Commands (prefix '{PREFIX}'):"),
        "  slowmode on|off - toggle slow mode".to_string(),
        "  slowmode <seconds> - set the slow mode interval".to_string(),
        "  disable / enable - temporarily disable or re-enable chat".to_string(),
        "  clear - clear chat history".to_string(),
        "  kick <name> - stop a user from sending messages".to_string(),
        "  ban <name> - ban a user".to_string(),
        "  unban <name> - lift a kick or ban".to_string(),
        "  broadcast <text> - send a server announcement".to_string(),
        "  shutdown - shut the server down".to_string(),
        "  help - show this list".to_string(),
    ];
    if reserved {
        lines.push(format!("{reserved_name} only:"));
        lines.push("  block <name> - permanently deny admin access to a user".to_string());
        lines.push("  password <secret> - change the admin password".to_string());
    }
    lines.join("\n")
}
