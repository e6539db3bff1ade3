/*!
 * Minimum-Duration Enforcement
 *
 * Keeps an operation from finishing before a given number of seconds has
 * elapsed. Useful for making response times constant, e.g. a password
 * reset that should take the same time whether or not the address exists.
 * Less useful when the operation's own runtime jitters a lot.
 *
 * ## Variants
 *
 * One [`Waiter`] type covers all three:
 *
 * - [`Waiter::new`]: pad to a floor
 * - [`Waiter::observable`]: pad and record `last_runtime` / `last_elapsed`
 * - [`Waiter::stopwatch`]: floor locked at 0, records only
 *
 * ## Example
 *
 * ```ignore
 * let mut waiter = Waiter::new(2.0);
 * let outcome = waiter.time(|| reset_password(email));
 *
 * let mut stopwatch = Waiter::stopwatch();
 * stopwatch.time(|| rebuild_index());
 * info!(elapsed = ?stopwatch.last_elapsed(), "index rebuilt");
 * ```
 */

use crate::clock;
use crate::config::WaiterConfig;
use crate::errors::{TimerError, TimerResult};
use crate::scoped::{Release, ScopedResource};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::time::Duration;
use tracing::{trace, warn};

/// Timing recorded by an observing waiter, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitStats {
    /// The wrapped operation's own duration
    pub last_runtime: Option<f64>,
    /// Total time inside the scope, padding included
    pub last_elapsed: Option<f64>,
}

impl WaitStats {
    /// Time spent padding on the last exit
    pub fn last_padding(&self) -> Option<f64> {
        Some(self.last_elapsed? - self.last_runtime?)
    }
}

/// Minimum-duration enforcer
#[derive(Debug, Clone)]
pub struct Waiter {
    minimum_time: f64,
    start_time: Option<f64>,
    stats: Option<WaitStats>,
    floor_locked: bool,
}

impl Waiter {
    /// Pad scopes to at least `minimum_time` seconds
    ///
    /// Zero or negative floors never wait.
    pub fn new(minimum_time: f64) -> Self {
        Self {
            minimum_time,
            start_time: None,
            stats: None,
            floor_locked: false,
        }
    }

    pub fn from_duration(minimum_time: Duration) -> Self {
        Self::new(minimum_time.as_secs_f64())
    }

    /// Like [`new`](Self::new), also recording runtime statistics
    pub fn observable(minimum_time: f64) -> Self {
        Self {
            stats: Some(WaitStats::default()),
            ..Self::new(minimum_time)
        }
    }

    /// Observer that never pads; the floor cannot be changed
    pub fn stopwatch() -> Self {
        Self {
            floor_locked: true,
            ..Self::observable(0.0)
        }
    }

    pub fn from_config(config: &WaiterConfig) -> Self {
        if config.observe {
            Self::observable(config.minimum_time)
        } else {
            Self::new(config.minimum_time)
        }
    }

    pub fn minimum_time(&self) -> f64 {
        self.minimum_time
    }

    /// Change the floor
    ///
    /// Stopwatches reject any nonzero value.
    pub fn set_minimum_time(&mut self, minimum_time: f64) -> TimerResult<()> {
        if self.floor_locked && minimum_time != 0.0 {
            return Err(TimerError::immutable("minimum_time"));
        }
        self.minimum_time = minimum_time;
        Ok(())
    }

    /// Timestamp of the last enter, from [`clock::get_time`]
    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn is_observing(&self) -> bool {
        self.stats.is_some()
    }

    pub fn is_stopwatch(&self) -> bool {
        self.floor_locked
    }

    /// Recorded statistics, `None` unless observing
    pub fn stats(&self) -> Option<WaitStats> {
        self.stats
    }

    pub fn last_runtime(&self) -> Option<f64> {
        self.stats.and_then(|s| s.last_runtime)
    }

    pub fn last_elapsed(&self) -> Option<f64> {
        self.stats.and_then(|s| s.last_elapsed)
    }

    /// Begin a scope
    pub fn start(&mut self) {
        self.start_time = Some(clock::get_time());
    }

    /// End a scope, sleeping out whatever is left of the floor
    pub fn finish(&mut self) {
        let Some(start) = self.start_time else {
            warn!("waiter finished without being started");
            return;
        };

        if let Some(stats) = self.stats.as_mut() {
            stats.last_runtime = Some(clock::since(start));
        }

        self.pad(start);

        if let Some(stats) = self.stats.as_mut() {
            stats.last_elapsed = Some(clock::since(start));
        }
    }

    fn pad(&self, start: f64) {
        let remaining = self.minimum_time - clock::since(start);
        match clock::sleep(remaining) {
            Ok(()) => trace!(remaining, "padded to minimum time"),
            // Already at or past the floor
            Err(_) => trace!(remaining, "no padding needed"),
        }
    }

    /// Start a scope that finishes when the guard drops
    pub fn guard(&mut self) -> WaitGuard<'_> {
        self.start();
        WaitGuard { waiter: self }
    }

    /// Run `f` with its duration padded to the floor
    pub fn time<T>(&mut self, f: impl FnOnce() -> T) -> T {
        let _guard = self.guard();
        f()
    }

    /// Wrap `f` so every call is padded
    pub fn wrap<F>(self, f: F) -> Timed<F> {
        Timed { waiter: self, f }
    }
}

impl ScopedResource for Waiter {
    fn resource_type(&self) -> &'static str {
        "waiter"
    }

    fn enter(&mut self) -> TimerResult<()> {
        self.start();
        Ok(())
    }

    fn exit(&mut self) -> TimerResult<Release> {
        self.finish();
        Ok(Release::Clean)
    }
}

/// Active waiter scope; pads on drop, including during unwinding
pub struct WaitGuard<'a> {
    waiter: &'a mut Waiter,
}

impl Deref for WaitGuard<'_> {
    type Target = Waiter;

    fn deref(&self) -> &Waiter {
        &*self.waiter
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.waiter.finish();
    }
}

/// A callable wrapped by [`Waiter::wrap`]
pub struct Timed<F> {
    waiter: Waiter,
    f: F,
}

impl<F> Timed<F> {
    pub fn call<A, T>(&mut self, args: A) -> T
    where
        F: FnMut(A) -> T,
    {
        let Self { waiter, f } = self;
        waiter.time(|| f(args))
    }

    pub fn waiter(&self) -> &Waiter {
        &self.waiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_records_start_time() {
        let mut waiter = Waiter::new(0.0);
        let guard = waiter.guard();
        assert!(guard.start_time().is_some());
    }

    #[test]
    fn test_initial_state() {
        let waiter = Waiter::observable(5.0);
        assert_eq!(waiter.minimum_time(), 5.0);
        assert_eq!(waiter.start_time(), None);
        assert_eq!(waiter.last_runtime(), None);
        assert_eq!(waiter.last_elapsed(), None);
    }

    #[test]
    fn test_pads_short_operation() {
        let mut waiter = Waiter::new(0.1);
        let start = clock::get_time();
        waiter.time(|| ());
        assert!(clock::since(start) >= 0.1);
    }

    #[test]
    fn test_no_padding_when_floor_already_met() {
        let mut waiter = Waiter::new(5.0);
        waiter.start_time = Some(clock::get_time() - 5.0);
        let start = clock::get_time();
        waiter.finish();
        assert!(clock::since(start) < 1.0);
    }

    #[test]
    fn test_negative_floor_never_waits() {
        let mut waiter = Waiter::observable(-2.0);
        waiter.time(|| ());
        assert!(waiter.last_elapsed().unwrap() < 1.0);
    }

    #[test]
    fn test_finish_without_start_is_noop() {
        let mut waiter = Waiter::observable(1.0);
        waiter.finish();
        assert_eq!(waiter.stats(), Some(WaitStats::default()));
    }

    #[test]
    fn test_records_last_runtime() {
        let mut waiter = Waiter::observable(0.5);
        let sleep_time = 0.2;

        waiter.time(|| clock::sleep(sleep_time).unwrap());

        let runtime = waiter.last_runtime().unwrap();
        assert!(runtime >= sleep_time);
        assert!(runtime < 0.5);
    }

    #[test]
    fn test_records_last_elapsed() {
        let mut waiter = Waiter::observable(0.2);
        waiter.time(|| ());

        let elapsed = waiter.last_elapsed().unwrap();
        assert!(elapsed >= 0.2);
        assert!(elapsed >= waiter.last_runtime().unwrap());
    }

    #[test]
    fn test_stopwatch_rejects_nonzero_floor() {
        let mut stopwatch = Waiter::stopwatch();
        assert!(stopwatch.is_stopwatch());
        assert_eq!(
            stopwatch.set_minimum_time(1.0),
            Err(TimerError::immutable("minimum_time"))
        );
        assert_eq!(stopwatch.set_minimum_time(0.0), Ok(()));
        assert_eq!(stopwatch.minimum_time(), 0.0);
    }

    #[test]
    fn test_plain_waiter_floor_is_mutable() {
        let mut waiter = Waiter::new(1.0);
        waiter.set_minimum_time(0.5).unwrap();
        assert_eq!(waiter.minimum_time(), 0.5);
        assert!(!waiter.is_observing());
    }

    #[test]
    fn test_padding_stat() {
        let stats = WaitStats {
            last_runtime: Some(0.25),
            last_elapsed: Some(1.0),
        };
        assert_eq!(stats.last_padding(), Some(0.75));
        assert_eq!(WaitStats::default().last_padding(), None);
    }

    #[test]
    fn test_wrap_preserves_return_value() {
        let mut double = Waiter::observable(0.0).wrap(|x: i32| x * 2);
        assert_eq!(double.call(21), 42);
        assert!(double.waiter().last_elapsed().is_some());
    }
}
