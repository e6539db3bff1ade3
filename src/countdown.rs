/*!
 * Process Countdown
 *
 * The process-wide, single-slot SIGALRM countdown.
 *
 * ## Model
 *
 * - **Slot**: one `alarm(2)` timer per process, whole-second resolution
 * - **Handler**: the SIGALRM disposition plus the owner token it reports to
 * - **Expiry**: the signal handler copies the current owner into `FIRED`;
 *   owners poll [`fired`] from ordinary code
 * - **Deadline**: [`arm`] records the absolute expiry time, so a nested
 *   scope can re-arm an outer countdown without losing its sub-second part
 *
 * The signal handler only performs atomic loads and stores, so it is
 * async-signal-safe. Callers must nest install/restore pairs in stack
 * order; see [`crate::timeouts::TimeoutManager`].
 *
 * ## Interrupted syscalls
 *
 * The handler is installed without `SA_RESTART`. A blocking call such as
 * `read` or `accept` in the protected block fails with `EINTR` at expiry,
 * which hands control back to code that can observe the deadline. Std
 * helpers that retry on `EINTR` (`thread::sleep`, `read_exact`) keep
 * blocking until they finish.
 */

use crate::clock;
use crate::errors::{TimerError, TimerResult};
use nix::libc::c_int;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::alarm;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Owner the next expiry will be reported to (0 = nobody)
static OWNER: AtomicU64 = AtomicU64::new(0);

/// Owner whose countdown fired most recently
static FIRED: AtomicU64 = AtomicU64::new(0);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Absolute expiry of the armed countdown as `f64` bits (0 = unknown)
static DEADLINE: AtomicU64 = AtomicU64::new(0);

/// Identity of one countdown activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken(u64);

impl OwnerToken {
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Allocate a token that has never been handed out before
#[inline]
pub fn next_token() -> OwnerToken {
    OwnerToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
}

extern "C" fn on_expiry(_signum: c_int) {
    FIRED.store(OWNER.load(Ordering::Acquire), Ordering::Release);
    DEADLINE.store(0, Ordering::Release);
}

fn expiry_action() -> SigAction {
    SigAction::new(
        SigHandler::Handler(on_expiry),
        SaFlags::empty(),
        SigSet::empty(),
    )
}

/// A SIGALRM disposition together with the owner it reports to
///
/// Returned by [`install_handler`] so the previous state can be put back
/// exactly as it was.
#[derive(Debug, Clone)]
pub struct ExpiryHandler {
    action: SigAction,
    owner: u64,
}

impl ExpiryHandler {
    /// Handler that records expiry on behalf of `token`
    pub fn for_owner(token: OwnerToken) -> Self {
        Self {
            action: expiry_action(),
            owner: token.0,
        }
    }

    /// Token this handler reports to, if any
    pub fn owner(&self) -> Option<OwnerToken> {
        (self.owner != 0).then_some(OwnerToken(self.owner))
    }

    /// Raw signal disposition
    pub fn disposition(&self) -> SigHandler {
        self.action.handler()
    }

    /// Whether this is the crate's own expiry trampoline
    pub fn is_expiry_trampoline(&self) -> bool {
        matches!(self.disposition(), SigHandler::Handler(h) if h as usize == on_expiry as usize)
    }
}

impl PartialEq for ExpiryHandler {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
            && match (self.disposition(), other.disposition()) {
                (SigHandler::SigDfl, SigHandler::SigDfl) => true,
                (SigHandler::SigIgn, SigHandler::SigIgn) => true,
                (SigHandler::Handler(a), SigHandler::Handler(b)) => a as usize == b as usize,
                (SigHandler::SigAction(a), SigHandler::SigAction(b)) => a as usize == b as usize,
                _ => false,
            }
    }
}

/// Install `handler` as the process SIGALRM handler
///
/// Returns the handler it replaced.
pub fn install_handler(handler: &ExpiryHandler) -> TimerResult<ExpiryHandler> {
    // Owner first: an expiry right after sigaction must already see it
    let previous_owner = OWNER.swap(handler.owner, Ordering::AcqRel);

    // SAFETY: `on_expiry` only touches atomics; other dispositions were
    // produced by an earlier sigaction call and are re-installed verbatim.
    match unsafe { signal::sigaction(Signal::SIGALRM, &handler.action) } {
        Ok(action) => {
            trace!(owner = handler.owner, previous_owner, "SIGALRM handler installed");
            Ok(ExpiryHandler {
                action,
                owner: previous_owner,
            })
        }
        Err(errno) => {
            OWNER.store(previous_owner, Ordering::Release);
            Err(TimerError::countdown("sigaction", errno))
        }
    }
}

/// Snapshot of the currently installed handler
///
/// sigaction cannot query without replacing, so the trampoline is swapped
/// in for the probe window. An expiry landing inside the window is recorded
/// rather than killing the process.
pub fn current_handler() -> TimerResult<ExpiryHandler> {
    // SAFETY: see `install_handler`
    let action = unsafe { signal::sigaction(Signal::SIGALRM, &expiry_action()) }
        .map_err(|errno| TimerError::countdown("sigaction", errno))?;
    unsafe { signal::sigaction(Signal::SIGALRM, &action) }
        .map_err(|errno| TimerError::countdown("sigaction", errno))?;

    Ok(ExpiryHandler {
        action,
        owner: OWNER.load(Ordering::Acquire),
    })
}

/// Arm the one-shot countdown for `seconds`
///
/// Replaces any outstanding countdown and returns its remaining seconds.
/// Zero cancels the countdown, like `alarm(0)`.
pub fn arm(seconds: u32) -> Option<u32> {
    if seconds == 0 {
        return disarm();
    }
    let deadline = clock::get_time() + f64::from(seconds);
    let previous = arm_slot(seconds, deadline);
    trace!(seconds, ?previous, "countdown armed");
    previous
}

/// Arm the countdown to expire at `deadline`, a [`clock::get_time`] value
///
/// The slot has whole-second resolution, so the signal lands at most one
/// second after `deadline` and never before it. Returns `false` without
/// arming when `deadline` has already passed.
pub fn arm_until(deadline: f64) -> bool {
    let left = deadline - clock::get_time();
    if left.is_nan() || left <= 0.0 {
        return false;
    }
    let seconds = left.ceil().min(f64::from(u32::MAX)) as u32;
    let previous = arm_slot(seconds, deadline);
    trace!(seconds, deadline, ?previous, "countdown armed until deadline");
    true
}

fn arm_slot(seconds: u32, deadline: f64) -> Option<u32> {
    DEADLINE.store(deadline.to_bits(), Ordering::Release);
    alarm::set(seconds)
}

/// Cancel the outstanding countdown, returning its remaining seconds
pub fn disarm() -> Option<u32> {
    let previous = alarm::cancel();
    DEADLINE.store(0, Ordering::Release);
    trace!(?previous, "countdown disarmed");
    previous
}

/// Absolute expiry of the armed countdown
///
/// `None` when nothing is armed, or when the countdown was armed outside
/// this module and only its whole-second remainder is known.
pub fn deadline() -> Option<f64> {
    match DEADLINE.load(Ordering::Acquire) {
        0 => None,
        bits => Some(f64::from_bits(bits)),
    }
}

/// Whether the countdown owned by `token` has expired
#[inline]
pub fn fired(token: OwnerToken) -> bool {
    FIRED.load(Ordering::Acquire) == token.0
}

/// Deliver SIGALRM to the calling thread now
///
/// Used to hand an already-overdue countdown back to its owner.
pub fn raise() -> TimerResult<()> {
    signal::raise(Signal::SIGALRM).map_err(|errno| TimerError::countdown("raise", errno))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_tokens_are_unique() {
        let a = next_token();
        let b = next_token();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    #[serial]
    fn test_install_returns_previous() {
        let original = current_handler().unwrap();
        let token = next_token();

        let replaced = install_handler(&ExpiryHandler::for_owner(token)).unwrap();
        assert_eq!(replaced, original);

        let now = current_handler().unwrap();
        assert_eq!(now.owner(), Some(token));
        assert!(now.is_expiry_trampoline());

        install_handler(&replaced).unwrap();
        assert_eq!(current_handler().unwrap(), original);
    }

    #[test]
    #[serial]
    fn test_arm_reports_remaining() {
        let token = next_token();
        let saved = install_handler(&ExpiryHandler::for_owner(token)).unwrap();

        assert_eq!(arm(30), None);
        let remaining = disarm();
        assert!(matches!(remaining, Some(s) if s > 0 && s <= 30));
        assert_eq!(disarm(), None);

        install_handler(&saved).unwrap();
    }

    #[test]
    #[serial]
    fn test_expiry_is_recorded_for_owner() {
        let token = next_token();
        let saved = install_handler(&ExpiryHandler::for_owner(token)).unwrap();

        arm(1);
        thread::sleep(Duration::from_millis(1100));
        disarm();
        install_handler(&saved).unwrap();

        assert!(fired(token));
        assert!(!fired(next_token()));
    }

    #[test]
    #[serial]
    fn test_deadline_tracks_arm_and_disarm() {
        let before = clock::get_time();
        arm(30);
        let armed = deadline().unwrap();
        assert!(armed >= before + 30.0);
        assert!(armed <= clock::get_time() + 30.0);

        disarm();
        assert_eq!(deadline(), None);
    }

    #[test]
    #[serial]
    fn test_arm_until_keeps_fractional_deadline() {
        let target = clock::get_time() + 20.4;
        assert!(arm_until(target));
        assert_eq!(deadline(), Some(target));

        // Rounded up to the next whole second, never down
        let remaining = disarm().unwrap();
        assert!(remaining == 21 || remaining == 20, "remaining {remaining}");

        assert!(!arm_until(clock::get_time() - 1.0));
        assert_eq!(disarm(), None);
    }

    #[test]
    #[serial]
    fn test_handler_does_not_restart_syscalls() {
        let token = next_token();
        let saved = install_handler(&ExpiryHandler::for_owner(token)).unwrap();

        let now = current_handler().unwrap();
        assert!(!now.action.flags().contains(SaFlags::SA_RESTART));

        install_handler(&saved).unwrap();
    }

    #[test]
    #[serial]
    fn test_raise_reaches_installed_owner() {
        let token = next_token();
        let saved = install_handler(&ExpiryHandler::for_owner(token)).unwrap();

        raise().unwrap();
        install_handler(&saved).unwrap();

        assert!(fired(token));
    }
}
