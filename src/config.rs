//! Session configuration.
//!
//! Timing and retry knobs for the connection manager. Defaults come from
//! [`crate::constants`]; each field can be overridden with a `TAGENGINE_*`
//! environment variable. The upstream URL is never configured here, the host
//! supplies it on every call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Configuration shared by every session a [`crate::TagEngine`] spawns.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Interval between heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Time allowed for a pong after each ping.
    pub pong_timeout: Duration,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Reconnect attempts allowed before the session gives up.
    pub max_retries: u32,
    /// Upper bound on a connection probe.
    pub probe_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: constants::HEARTBEAT_INTERVAL,
            pong_timeout: constants::PONG_TIMEOUT,
            reconnect_delay: constants::RECONNECT_DELAY,
            max_retries: constants::MAX_RETRIES,
            probe_timeout: constants::PROBE_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Defaults with environment variable overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `TAGENGINE_*` environment variable overrides.
    ///
    /// Values that fail to parse are ignored with a warning so a typo never
    /// prevents the connector from starting.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = parse_override::<u64>(&lookup, "TAGENGINE_HEARTBEAT_INTERVAL_MS") {
            self.heartbeat_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_override::<u64>(&lookup, "TAGENGINE_PONG_TIMEOUT_MS") {
            self.pong_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_override::<u64>(&lookup, "TAGENGINE_RECONNECT_DELAY_MS") {
            self.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(retries) = parse_override::<u32>(&lookup, "TAGENGINE_MAX_RETRIES") {
            self.max_retries = retries;
        }
        if let Some(ms) = parse_override::<u64>(&lookup, "TAGENGINE_PROBE_TIMEOUT_MS") {
            self.probe_timeout = Duration::from_millis(ms);
        }
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("[Config] Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}
