/*!
 * timerutil
 * Scoped time-control primitives: deadlines and minimum durations
 *
 * - [`TimeoutManager`]: aborts a block that runs past a whole-second bound
 * - [`Waiter`]: pads a block up to a minimum duration, optionally
 *   recording how long it actually took
 *
 * Both work as a scope guard, around a closure, or as a function wrapper
 * (see [`scoped`]).
 */

pub mod clock;
pub mod config;
#[cfg(unix)]
pub mod countdown;
pub mod errors;
pub mod scoped;
#[cfg(unix)]
pub mod timeouts;
pub mod tracer;
pub mod waits;

// Re-exports
pub use config::{TimeoutConfig, WaiterConfig};
pub use errors::{TimerError, TimerResult};
pub use scoped::{decorate, run, Release, Scope, ScopedResource};
#[cfg(unix)]
pub use timeouts::{default_timeout_message, TimeoutManager};
pub use tracer::init_tracing;
pub use waits::{Timed, WaitGuard, WaitStats, Waiter};
