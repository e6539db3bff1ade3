/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for timer operations
pub type TimerResult<T> = Result<T, TimerError>;

/// Timer errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum TimerError {
    /// Raised into a deadline scope when its countdown expires
    #[error("{message}")]
    #[diagnostic(
        code(timer::timeout_expired),
        help("The protected block ran past its deadline. Raise the bound or split the work.")
    )]
    TimeoutExpired { message: String },

    #[error("Cannot change `{field}` after construction")]
    #[diagnostic(
        code(timer::configuration_immutable),
        help("Stopwatches never pad; build a Waiter if a minimum duration is needed.")
    )]
    ConfigurationImmutable { field: String },

    /// Rejected by the sleep primitive; a waiter treats this as "no wait needed"
    #[error("Invalid sleep duration: {seconds}s")]
    #[diagnostic(code(timer::invalid_sleep))]
    InvalidSleep { seconds: f64 },

    #[error("Countdown {operation} failed: {reason}")]
    #[diagnostic(
        code(timer::countdown_failed),
        help("SIGALRM handling is only available on the thread that owns the process timer.")
    )]
    Countdown {
        operation: String,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    #[diagnostic(code(timer::invalid_config))]
    Config { reason: String },
}

impl TimerError {
    /// Create a timeout error carrying `message`
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::TimeoutExpired {
            message: message.into(),
        }
    }

    /// Create an immutability error for `field`
    pub fn immutable(field: &str) -> Self {
        Self::ConfigurationImmutable {
            field: field.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimeoutExpired { .. })
    }

    pub(crate) fn countdown(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Countdown {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TimerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config {
            reason: err.to_string(),
        }
    }
}
