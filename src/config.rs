//! Runtime configuration from environment variables

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::signaling::{DEFAULT_SIGNALING_PORT, RoomPolicy};

pub const ENV_BIND_ADDR: &str = "HUDDLE_BIND_ADDR";
pub const ENV_KEEP_EMPTY_ROOMS: &str = "HUDDLE_KEEP_EMPTY_ROOMS";
pub const ENV_PING_INTERVAL_SECS: &str = "HUDDLE_PING_INTERVAL_SECS";
pub const ENV_PONG_TIMEOUT_SECS: &str = "HUDDLE_PONG_TIMEOUT_SECS";
pub const ENV_MAILBOX_CAPACITY: &str = "HUDDLE_MAILBOX_CAPACITY";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: String,
    pub room_policy: RoomPolicy,
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    /// Bound of the router actor's command queue
    pub mailbox_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_SIGNALING_PORT),
            room_policy: RoomPolicy::DeleteWhenEmpty,
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
            mailbox_capacity: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            config.bind_addr = addr;
        }

        if let Some(value) = lookup(ENV_KEEP_EMPTY_ROOMS) {
            config.room_policy = if parse_flag(ENV_KEEP_EMPTY_ROOMS, &value)? {
                RoomPolicy::KeepEmpty
            } else {
                RoomPolicy::DeleteWhenEmpty
            };
        }

        if let Some(value) = lookup(ENV_PING_INTERVAL_SECS) {
            let secs: u64 = parse_positive(ENV_PING_INTERVAL_SECS, &value)?;
            config.ping_interval = Duration::from_secs(secs);
        }

        if let Some(value) = lookup(ENV_PONG_TIMEOUT_SECS) {
            let secs: u64 = parse_positive(ENV_PONG_TIMEOUT_SECS, &value)?;
            config.pong_timeout = Duration::from_secs(secs);
        }

        if let Some(value) = lookup(ENV_MAILBOX_CAPACITY) {
            config.mailbox_capacity = parse_positive(ENV_MAILBOX_CAPACITY, &value)?;
        }

        Ok(config)
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_positive<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    let parsed: T = value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })?;
    if parsed == T::default() {
        return Err(ConfigError::Zero(key));
    }
    Ok(parsed)
}
