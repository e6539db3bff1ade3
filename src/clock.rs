/*!
 * Clock
 *
 * Monotonic time source and the blocking sleep primitive shared by
 * the deadline and minimum-duration enforcers.
 */

use crate::errors::{TimerError, TimerResult};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic timestamp in seconds
///
/// Measured from the first call in this process. Only differences between
/// two readings are meaningful.
#[inline]
pub fn get_time() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// Seconds elapsed since `start`, a value previously returned by [`get_time`]
#[inline]
pub fn since(start: f64) -> f64 {
    get_time() - start
}

/// Block the calling thread for `seconds`
///
/// Rejects zero, negative and non-finite durations with
/// [`TimerError::InvalidSleep`] instead of blocking.
pub fn sleep(seconds: f64) -> TimerResult<()> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(TimerError::InvalidSleep { seconds });
    }
    let duration =
        Duration::try_from_secs_f64(seconds).map_err(|_| TimerError::InvalidSleep { seconds })?;
    std::thread::sleep(duration);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_time_is_monotonic() {
        let a = get_time();
        let b = get_time();
        assert!(b >= a);
    }

    #[test]
    fn test_since_measures_sleep() {
        let start = get_time();
        sleep(0.02).unwrap();
        assert!(since(start) >= 0.02);
    }

    #[test]
    fn test_sleep_rejects_non_positive() {
        assert_eq!(sleep(0.0), Err(TimerError::InvalidSleep { seconds: 0.0 }));
        assert_eq!(sleep(-1.5), Err(TimerError::InvalidSleep { seconds: -1.5 }));
        assert!(sleep(f64::NAN).is_err());
        assert!(sleep(f64::INFINITY).is_err());
    }
}
