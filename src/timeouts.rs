/*!
 * Deadline Enforcement
 *
 * Puts a whole-second time limit on a block using the process SIGALRM
 * countdown.
 *
 * ## Usage
 *
 * ```ignore
 * // Block form
 * let mut manager = TimeoutManager::new(10);
 * let rows = manager.run(|m| {
 *     for batch in batches {
 *         m.check()?;
 *         load(batch)?;
 *     }
 *     Ok::<_, TimerError>(count)
 * })?;
 *
 * // Wrapper form
 * let mut fetch = scoped::decorate(TimeoutManager::new(5), |url| download(url));
 * ```
 *
 * ## Delivery
 *
 * A signal handler cannot unwind Rust code, so expiry is recorded by the
 * handler and surfaces as [`TimerError::TimeoutExpired`] at the next
 * [`TimeoutManager::check`], inside [`TimeoutManager::sleep`], or when the
 * scope exits, whichever comes first. The block's own result is discarded
 * once its countdown has fired.
 *
 * ## Limitations
 *
 * The countdown is process-wide. Use one manager at a time per process,
 * or nest them strictly; concurrent scopes on different threads corrupt
 * each other's countdown.
 */

use crate::clock;
use crate::config::TimeoutConfig;
use crate::countdown::{self, ExpiryHandler, OwnerToken};
use crate::errors::{TimerError, TimerResult};
use crate::scoped::{self, Release, Scope, ScopedResource};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Used when the platform has no `ETIME` description
pub const FALLBACK_TIMEOUT_MESSAGE: &str = "Timer Expired";

/// Slice length for [`TimeoutManager::sleep`]
const SLEEP_POLL_SECS: f64 = 0.01;

/// Platform text for `ETIME`
pub fn default_timeout_message() -> &'static str {
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios"
    ))]
    {
        nix::errno::Errno::ETIME.desc()
    }
    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios"
    )))]
    {
        FALLBACK_TIMEOUT_MESSAGE
    }
}

/// Countdown state replaced by an active scope
#[derive(Debug)]
struct SavedCountdown {
    handler: ExpiryHandler,
    /// Absolute expiry of the countdown that was pending at enter
    outer_deadline: Option<f64>,
}

/// Deadline enforcer for a block or function
#[derive(Debug)]
pub struct TimeoutManager {
    seconds: u32,
    timeout_message: String,
    suppress_errors: bool,
    saved: Option<SavedCountdown>,
    token: Option<OwnerToken>,
    expired: bool,
}

impl TimeoutManager {
    /// Create a manager with a bound of `seconds`
    pub fn new(seconds: u32) -> Self {
        Self {
            seconds,
            timeout_message: default_timeout_message().to_string(),
            suppress_errors: false,
            saved: None,
            token: None,
            expired: false,
        }
    }

    /// Fractional bounds truncate toward zero; negative and NaN become 0
    pub fn from_secs_f64(seconds: f64) -> Self {
        Self::new(seconds as u32)
    }

    /// Whole seconds of `bound`; the sub-second part is dropped
    pub fn from_duration(bound: Duration) -> Self {
        Self::new(u32::try_from(bound.as_secs()).unwrap_or(u32::MAX))
    }

    /// Build from a loaded [`TimeoutConfig`]
    pub fn from_config(config: &TimeoutConfig) -> Self {
        let manager = Self::new(config.seconds).suppress_timeout_errors(config.suppress_timeout_errors);
        match &config.timeout_message {
            Some(message) => manager.with_message(message.clone()),
            None => manager,
        }
    }

    /// Message carried by the timeout error
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.timeout_message = message.into();
        self
    }

    /// Swallow this manager's own timeouts at scope exit
    pub fn suppress_timeout_errors(mut self, suppress: bool) -> Self {
        self.suppress_errors = suppress;
        self
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    pub fn timeout_message(&self) -> &str {
        &self.timeout_message
    }

    pub fn suppress_errors(&self) -> bool {
        self.suppress_errors
    }

    /// Whether a countdown is currently armed by this manager
    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }

    /// Handler that was in place before this manager entered
    pub fn saved_handler(&self) -> Option<&ExpiryHandler> {
        self.saved.as_ref().map(|saved| &saved.handler)
    }

    /// Whether the most recent activation's countdown has fired
    ///
    /// Stays readable after exit until the next enter.
    pub fn is_expired(&self) -> bool {
        self.expired || self.token.is_some_and(countdown::fired)
    }

    /// The error raised on expiry
    pub fn timeout_error(&self) -> TimerError {
        TimerError::timeout(self.timeout_message.clone())
    }

    /// Checkpoint for long-running blocks
    pub fn check(&self) -> TimerResult<()> {
        if self.is_active() && self.is_expired() {
            return Err(self.timeout_error());
        }
        Ok(())
    }

    /// Sleep that returns early with a timeout once the countdown fires
    pub fn sleep(&self, duration: Duration) -> TimerResult<()> {
        let until = clock::get_time() + duration.as_secs_f64();
        loop {
            self.check()?;
            let remaining = until - clock::get_time();
            if remaining <= 0.0 {
                return Ok(());
            }
            clock::sleep(remaining.min(SLEEP_POLL_SECS))?;
        }
    }

    /// Enter and return a guard that exits on drop
    pub fn scope(&mut self) -> TimerResult<Scope<'_, Self>> {
        Scope::enter(self)
    }

    /// Run `body` under this manager's deadline
    ///
    /// `Ok(None)` means the deadline passed and the timeout was suppressed.
    pub fn run<T, E, F>(&mut self, body: F) -> Result<Option<T>, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<TimerError>,
    {
        scoped::run(self, body)
    }

    /// Put back a countdown that was pending when this scope armed
    fn resume_outer(deadline: f64) -> TimerResult<()> {
        if countdown::arm_until(deadline) {
            return Ok(());
        }
        debug!(deadline, "outer countdown overdue, delivering now");
        countdown::raise()
    }
}

impl ScopedResource for TimeoutManager {
    fn resource_type(&self) -> &'static str {
        "timeout_manager"
    }

    fn enter(&mut self) -> TimerResult<()> {
        if self.is_active() {
            return Err(TimerError::countdown("enter", "manager is already armed"));
        }

        let token = countdown::next_token();
        let handler = countdown::install_handler(&ExpiryHandler::for_owner(token))?;
        let exact = countdown::deadline();
        let entered_at = clock::get_time();
        let outer_remaining = countdown::arm(self.seconds);

        // alarm(2) rounds the remainder; prefer the recorded deadline when
        // it belongs to the countdown just replaced
        let outer_deadline = outer_remaining.map(|remaining| {
            let coarse = entered_at + f64::from(remaining);
            match exact {
                Some(exact) if (exact - coarse).abs() <= 1.0 => exact,
                _ => coarse,
            }
        });

        debug!(
            seconds = self.seconds,
            token = token.get(),
            ?outer_remaining,
            "deadline armed"
        );

        self.saved = Some(SavedCountdown {
            handler,
            outer_deadline,
        });
        self.token = Some(token);
        self.expired = false;
        Ok(())
    }

    fn exit(&mut self) -> TimerResult<Release> {
        let Some(saved) = self.saved.take() else {
            return Ok(Release::Clean);
        };

        countdown::disarm();
        // Read before the outer countdown resumes: an overdue outer is
        // raised immediately and takes over the fired slot
        self.expired = self.is_expired();

        countdown::install_handler(&saved.handler)?;
        if let Some(deadline) = saved.outer_deadline {
            Self::resume_outer(deadline)?;
        }

        if !self.expired {
            return Ok(Release::Clean);
        }
        if self.suppress_errors {
            debug!(seconds = self.seconds, "deadline expired, timeout suppressed");
            return Ok(Release::Suppressed);
        }
        debug!(seconds = self.seconds, "deadline expired");
        Err(self.timeout_error())
    }
}

impl Drop for TimeoutManager {
    fn drop(&mut self) {
        if !self.is_active() {
            return;
        }
        if let Err(e) = self.exit() {
            if !e.is_timeout() {
                warn!(error = %e, "failed to restore countdown on drop");
            }
        }
    }
}

impl fmt::Display for TimeoutManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<TimeoutManager: {} seconds>", self.seconds)
    }
}
