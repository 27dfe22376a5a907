//! Relay configuration
//!
//! All options are read once at startup from `RELAY_*` environment
//! variables, falling back to the defaults below. Durations are given in
//! whole seconds.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::rate_limiter::{ActionClass, RateLimitPolicy};

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Smallest per-room retention the store accepts
pub const MIN_PER_ROOM: usize = 10;

/// Static relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to
    pub bind_addr: String,
    /// Messages kept per room
    pub max_per_room: usize,
    /// Idle time after which a room's history is dropped
    pub room_ttl: Duration,
    /// Messages replayed to a connection entering a room
    pub history_replay: usize,
    /// Interval between idle-room sweeps
    pub reaper_period: Duration,
    /// Limits on buzz alerts
    pub buzz: RateLimitPolicy,
    /// Limits on creating rooms that have no traffic yet
    pub room_creation: RateLimitPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            max_per_room: 200,
            room_ttl: Duration::from_secs(12 * 60 * 60),
            history_replay: 50,
            reaper_period: Duration::from_secs(10 * 60),
            buzz: RateLimitPolicy::new(Duration::from_secs(20), 3, Duration::from_secs(30)),
            room_creation: RateLimitPolicy::new(
                Duration::from_secs(2 * 60),
                4,
                Duration::from_secs(2 * 60),
            ),
        }
    }
}

impl RelayConfig {
    /// Build the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let buzz = RateLimitPolicy::new(
            secs_or(&lookup, "RELAY_BUZZ_WINDOW_SECS", defaults.buzz.window)?,
            parse_or(&lookup, "RELAY_BUZZ_MAX", defaults.buzz.max_in_window)?,
            secs_or(&lookup, "RELAY_BUZZ_BLOCK_SECS", defaults.buzz.block_duration)?,
        );
        let room_creation = RateLimitPolicy::new(
            secs_or(
                &lookup,
                "RELAY_ROOM_CREATION_WINDOW_SECS",
                defaults.room_creation.window,
            )?,
            parse_or(
                &lookup,
                "RELAY_ROOM_CREATION_MAX",
                defaults.room_creation.max_in_window,
            )?,
            secs_or(
                &lookup,
                "RELAY_ROOM_CREATION_BLOCK_SECS",
                defaults.room_creation.block_duration,
            )?,
        );

        Ok(Self {
            bind_addr: lookup("RELAY_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_per_room: parse_or(&lookup, "RELAY_MAX_PER_ROOM", defaults.max_per_room)?
                .max(MIN_PER_ROOM),
            room_ttl: secs_or(&lookup, "RELAY_ROOM_TTL_SECS", defaults.room_ttl)?,
            history_replay: parse_or(&lookup, "RELAY_HISTORY_REPLAY", defaults.history_replay)?,
            reaper_period: secs_or(&lookup, "RELAY_REAPER_PERIOD_SECS", defaults.reaper_period)?,
            buzz,
            room_creation,
        })
    }

    /// Limits that apply to the given action class
    pub fn policy(&self, class: ActionClass) -> &RateLimitPolicy {
        match class {
            ActionClass::Buzz => &self.buzz,
            ActionClass::RoomCreation => &self.room_creation,
        }
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, var, default.as_secs()).map(Duration::from_secs)
}
