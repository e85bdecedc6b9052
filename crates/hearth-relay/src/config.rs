use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use hearth_core::HubConfig;

pub const DEFAULT_BLOCKLISTS: &[&str] = &[
    "https://www.cs.cmu.edu/~biglou/resources/bad-words.txt",
    "https://raw.githubusercontent.com/zacanger/profane-words/master/words.json",
];

/// CLI arguments for the relay server.
#[derive(Parser, Debug, Clone)]
#[command(name = "hearth-relay")]
#[command(about = "Hearth chat relay server")]
#[command(version)]
pub struct Args {
    /// Socket address to listen on.
    #[arg(long, default_value = "0.0.0.0:3000", env = "HEARTH_LISTEN")]
    pub listen: SocketAddr,
    /// Directory of the static web client.
    #[arg(long, default_value = "public", env = "HEARTH_STATIC_DIR")]
    pub static_dir: PathBuf,
    /// Chat history file (JSON array of events).
    #[arg(long, default_value = "chat-history.json", env = "HEARTH_HISTORY_PATH")]
    pub history_path: PathBuf,
    /// File holding the obfuscated admin password.
    #[arg(long, default_value = "admin.credential", env = "HEARTH_CREDENTIAL_PATH")]
    pub credential_path: PathBuf,
    /// The reserved, password-protected identity.
    #[arg(long, default_value = "Admin", env = "HEARTH_RESERVED_NAME")]
    pub reserved_name: String,
    /// Initial admin password, used when no credential is stored yet.
    #[arg(long, env = "HEARTH_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,
    /// Start with slow mode enabled.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "HEARTH_SLOW_MODE")]
    pub slow_mode: bool,
    /// Minimum milliseconds between a user's messages in slow mode.
    #[arg(long, default_value = "2000", env = "HEARTH_SLOW_MODE_INTERVAL_MS")]
    pub slow_mode_interval_ms: u64,
    /// Seconds of inactivity before a user is shown as idle.
    #[arg(long, default_value = "300", env = "HEARTH_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: u64,
    /// Seconds between idle sweeps.
    #[arg(long, default_value = "5", env = "HEARTH_IDLE_SWEEP_SECS")]
    pub idle_sweep_secs: u64,
    /// Maximum characters per message.
    #[arg(long, default_value = "2000", env = "HEARTH_MAX_MESSAGE_LEN")]
    pub max_message_len: usize,
    /// Word list sources for the content filter.
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = DEFAULT_BLOCKLISTS.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        env = "HEARTH_BLOCKLIST_URL"
    )]
    pub blocklist_url: Vec<String>,
}

/// Runtime configuration derived from [`Args`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    pub static_dir: PathBuf,
    pub history_path: PathBuf,
    pub credential_path: PathBuf,
    pub admin_password: Option<String>,
    /// Interval between idle sweeps.
    pub idle_sweep: Duration,
    pub blocklist_urls: Vec<String>,
    /// Settings handed to the hub.
    pub hub: HubConfig,
}

impl RelayConfig {
    /// Validates the configuration values are within acceptable bounds.
    /// Returns Ok(()) if valid, Err with description otherwise.
    pub fn validate(&self) -> Result<(), String> {
        let name = self.hub.reserved_name.trim();
        if name.is_empty() {
            return Err("reserved_name must not be empty".to_string());
        }
        if name != self.hub.reserved_name {
            return Err("reserved_name must not have surrounding whitespace".to_string());
        }
        if name.chars().count() > hearth_core::registry::MAX_NAME_LEN {
            return Err(format!(
                "reserved_name exceeds {} characters",
                hearth_core::registry::MAX_NAME_LEN
            ));
        }
        if let Err(e) = hearth_core::registry::validate_name(name) {
            return Err(format!("reserved_name is not usable: {e}"));
        }

        if let Some(password) = &self.admin_password {
            if password.trim().is_empty() {
                return Err("admin_password must not be blank".to_string());
            }
        }

        let interval = self.hub.slow_mode_interval;
        if interval.is_zero() {
            return Err("slow_mode_interval_ms must be greater than 0".to_string());
        }
        if interval > Duration::from_secs(3600) {
            return Err("slow_mode_interval_ms exceeds reasonable limit (1 hour)".to_string());
        }

        if self.hub.idle_timeout.is_zero() {
            return Err("idle_timeout_secs must be greater than 0".to_string());
        }
        if self.hub.idle_timeout > Duration::from_secs(86_400) {
            return Err("idle_timeout_secs exceeds reasonable limit (86400 seconds / 1 day)".to_string());
        }

        if self.idle_sweep.is_zero() {
            return Err("idle_sweep_secs must be greater than 0".to_string());
        }
        if self.idle_sweep > self.hub.idle_timeout {
            return Err("idle_sweep_secs cannot exceed idle_timeout_secs".to_string());
        }

        if self.hub.max_message_len == 0 {
            return Err("max_message_len must be greater than 0".to_string());
        }
        if self.hub.max_message_len > 100_000 {
            return Err("max_message_len exceeds reasonable limit (100000 characters)".to_string());
        }
        Ok(())
    }
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            listen: args.listen,
            static_dir: args.static_dir,
            history_path: args.history_path,
            credential_path: args.credential_path,
            admin_password: args.admin_password,
            idle_sweep: Duration::from_secs(args.idle_sweep_secs),
            blocklist_urls: args
                .blocklist_url
                .into_iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            hub: HubConfig {
                reserved_name: args.reserved_name,
                idle_timeout: Duration::from_secs(args.idle_timeout_secs),
                max_message_len: args.max_message_len,
                slow_mode: args.slow_mode,
                slow_mode_interval: Duration::from_millis(args.slow_mode_interval_ms),
            },
        }
    }
}
