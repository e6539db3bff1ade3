/*!
 * Timer Configuration
 *
 * Defaults for deadline and minimum-duration enforcers, loadable from
 * JSON or the environment.
 *
 * ## Environment
 *
 * - `TIMERUTIL_TIMEOUT_SECS`: deadline bound in whole seconds
 * - `TIMERUTIL_TIMEOUT_MESSAGE`: message carried by the timeout error
 * - `TIMERUTIL_SUPPRESS_TIMEOUTS`: `1`/`true` to swallow timeouts
 * - `TIMERUTIL_MINIMUM_TIME`: waiter floor in seconds
 * - `TIMERUTIL_OBSERVE`: `1`/`true` to record waiter statistics
 */

use crate::errors::{TimerError, TimerResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default deadline bound: 10s
pub const DEFAULT_TIMEOUT_SECS: u32 = 10;

/// Deadline enforcer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub seconds: u32,
    /// `None` keeps the platform default message
    pub timeout_message: Option<String>,
    pub suppress_timeout_errors: bool,
}

impl TimeoutConfig {
    pub fn new() -> Self {
        Self {
            seconds: DEFAULT_TIMEOUT_SECS,
            timeout_message: None,
            suppress_timeout_errors: false,
        }
    }

    pub fn with_seconds(mut self, seconds: u32) -> Self {
        self.seconds = seconds;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.timeout_message = Some(message.into());
        self
    }

    pub fn with_suppressed_errors(mut self, suppress: bool) -> Self {
        self.suppress_timeout_errors = suppress;
        self
    }

    pub fn from_json(json: &str) -> TimerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Overlay `TIMERUTIL_*` variables on the defaults
    pub fn from_env() -> TimerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TimerResult<Self> {
        let mut config = Self::new();
        if let Some(seconds) = parse_var(&lookup, "TIMERUTIL_TIMEOUT_SECS")? {
            config.seconds = seconds;
        }
        if let Some(message) = lookup("TIMERUTIL_TIMEOUT_MESSAGE") {
            config.timeout_message = Some(message);
        }
        if let Some(suppress) = flag_var(&lookup, "TIMERUTIL_SUPPRESS_TIMEOUTS") {
            config.suppress_timeout_errors = suppress;
        }
        Ok(config)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimum-duration enforcer configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaiterConfig {
    pub minimum_time: f64,
    /// Record runtime and elapsed statistics
    pub observe: bool,
}

impl WaiterConfig {
    pub fn new(minimum_time: f64) -> Self {
        Self {
            minimum_time,
            observe: false,
        }
    }

    pub fn observed(mut self) -> Self {
        self.observe = true;
        self
    }

    pub fn from_json(json: &str) -> TimerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_env() -> TimerResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TimerResult<Self> {
        let mut config = Self::default();
        if let Some(minimum_time) = parse_var(&lookup, "TIMERUTIL_MINIMUM_TIME")? {
            config.minimum_time = minimum_time;
        }
        if let Some(observe) = flag_var(&lookup, "TIMERUTIL_OBSERVE") {
            config.observe = observe;
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> TimerResult<Option<T>> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| TimerError::Config {
            reason: format!("{name}={raw:?} is not a valid value"),
        }),
    }
}

fn flag_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    lookup(name).map(|v| parse_flag(&v))
}

/// Boolean environment value: `1` or `true` in any case
pub(crate) fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value == "1" || value.eq_ignore_ascii_case("true")
}
