//! Monotonic time based on the kernel's system tick

use core::ops::Add;
use core::time::Duration;

use sys::config::SYSTEM_TICK_FREQUENCY;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Timeout value passed to the kernel to wait forever
pub(crate) const WAIT_INFINITE: i64 = -1;

/// A point in time measured in system ticks since boot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(u64);

impl Tick {
    /// A tick which is never reached, used as the wakeup time of things that never wake up on their own
    pub const MAX: Tick = Tick(u64::MAX);

    pub fn now() -> Self {
        Tick(sys::get_system_tick())
    }

    pub const fn from_raw(ticks: u64) -> Self {
        Tick(ticks)
    }

    pub const fn as_raw(&self) -> u64 {
        self.0
    }

    /// Converts a duration to a number of ticks, rounding down and saturating at [`Tick::MAX`]
    pub fn from_duration(duration: Duration) -> Self {
        let ticks = duration.as_nanos() * SYSTEM_TICK_FREQUENCY as u128 / NANOS_PER_SEC;
        Tick(u64::try_from(ticks).unwrap_or(u64::MAX))
    }

    /// Converts this tick count to the duration it represents
    pub fn to_duration(self) -> Duration {
        let nanos = self.0 as u128 * NANOS_PER_SEC / SYSTEM_TICK_FREQUENCY as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Returns the time from `earlier` until `self`, or zero if `earlier` is later than `self`
    pub fn saturating_duration_since(self, earlier: Tick) -> Duration {
        Tick(self.0.saturating_sub(earlier.0)).to_duration()
    }
}

impl Add<Duration> for Tick {
    type Output = Tick;

    /// Saturates at [`Tick::MAX`]
    fn add(self, rhs: Duration) -> Tick {
        Tick(self.0.saturating_add(Tick::from_duration(rhs).0))
    }
}

/// Converts `duration` to a kernel timeout in nanoseconds, saturating at the largest finite timeout
pub(crate) fn timeout_nsec(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

/// Tracks the deadline of a timed operation which may wait several times
#[derive(Debug, Clone, Copy)]
pub struct TimeoutHelper {
    /// Zero means the timeout was zero, so the operation only polls
    end_tick: Tick,
}

impl TimeoutHelper {
    pub fn new(timeout: Duration) -> Self {
        let end_tick = if timeout.is_zero() {
            Tick(0)
        } else {
            // round up by a tick so a wait never ends before the full timeout elapsed
            Tick(Tick::now().0.saturating_add(Tick::from_duration(timeout).0).saturating_add(1))
        };

        TimeoutHelper { end_tick }
    }

    pub fn is_timed_out(&self) -> bool {
        self.end_tick.0 == 0 || Tick::now() >= self.end_tick
    }

    /// Returns how long is left until the deadline, zero once it has passed
    pub fn time_left(&self) -> Duration {
        if self.end_tick.0 == 0 {
            Duration::ZERO
        } else {
            self.end_tick.saturating_duration_since(Tick::now())
        }
    }

    /// Returns the time left as a kernel timeout
    pub(crate) fn time_left_nsec(&self) -> i64 {
        timeout_nsec(self.time_left())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_conversion() {
        let second = Tick::from_duration(Duration::from_secs(1));
        assert_eq!(second.as_raw(), SYSTEM_TICK_FREQUENCY as u64);
        assert_eq!(second.to_duration(), Duration::from_secs(1));

        assert_eq!(Tick::MAX + Duration::from_secs(1), Tick::MAX);
        assert_eq!(Tick::from_raw(5).saturating_duration_since(Tick::from_raw(10)), Duration::ZERO);
    }

    #[test]
    fn zero_timeout_is_already_timed_out() {
        let helper = TimeoutHelper::new(Duration::ZERO);
        assert!(helper.is_timed_out());
        assert_eq!(helper.time_left_nsec(), 0);
    }

    #[test]
    fn timeout_counts_down() {
        let helper = TimeoutHelper::new(Duration::from_secs(60));
        assert!(!helper.is_timed_out());
        assert!(helper.time_left() <= Duration::from_secs(60));
        assert!(helper.time_left() > Duration::from_secs(50));
    }
}
