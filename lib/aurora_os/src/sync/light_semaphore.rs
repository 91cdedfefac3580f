use core::sync::atomic::{AtomicI32, Ordering};
use core::time::Duration;

use sys::{ArbitrationType, SignalType, SysErr};

use crate::time::{TimeoutHelper, WAIT_INFINITE};

/// A counting semaphore which only uses the kernel when a thread actually has to block
///
/// Blocked threads wait on the count word itself until it is no longer zero.
#[derive(Debug)]
pub struct LightSemaphore {
    count: AtomicI32,
    max_count: i32,
    /// Number of threads which are about to wait or are waiting, lets release skip the kernel
    waiter_count: AtomicI32,
}

impl LightSemaphore {
    /// # Panics
    ///
    /// panics if `max_count` is not positive or `initial_count` is not in `0..=max_count`
    pub const fn new(initial_count: i32, max_count: i32) -> Self {
        assert!(max_count >= 1, "semaphore max count must be at least 1");
        assert!(initial_count >= 0 && initial_count <= max_count, "semaphore initial count is out of range");

        LightSemaphore {
            count: AtomicI32::new(initial_count),
            max_count,
            waiter_count: AtomicI32::new(0),
        }
    }

    /// Waits for the count to be non zero, returns false on timeout
    fn wait_not_zero(&self, timeout_nsec: i64) -> bool {
        self.waiter_count.fetch_add(1, Ordering::SeqCst);
        let result = sys::wait_for_address(&self.count, ArbitrationType::WaitIfLessThan, 1, timeout_nsec);
        self.waiter_count.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(()) | Err(SysErr::InvalidState) => true,
            Err(SysErr::TimedOut) => false,
            Err(error) => panic!("failed to wait on light semaphore: {error}"),
        }
    }

    pub fn acquire(&self) {
        while !self.try_acquire() {
            self.wait_not_zero(WAIT_INFINITE);
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.count
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |count| {
                if count > 0 {
                    Some(count - 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Returns false if the count stayed zero until `timeout` passed
    pub fn timed_acquire(&self, timeout: Duration) -> bool {
        let timeout = TimeoutHelper::new(timeout);

        loop {
            if self.try_acquire() {
                return true;
            }
            if timeout.is_timed_out() {
                return false;
            }
            self.wait_not_zero(timeout.time_left_nsec());
        }
    }

    pub fn release(&self) {
        self.release_count(1);
    }

    /// Adds `count` to the semaphore count
    ///
    /// # Panics
    ///
    /// panics if `count` is not positive or the count would go above the max count
    pub fn release_count(&self, count: i32) {
        assert!(count >= 1, "semaphore released with a count of zero");

        let result = self.count.fetch_update(Ordering::SeqCst, Ordering::Relaxed, |current| {
            current.checked_add(count).filter(|new_count| *new_count <= self.max_count)
        });
        assert!(result.is_ok(), "semaphore released past its max count");

        if self.waiter_count.load(Ordering::SeqCst) > 0 {
            let wake_count = if count == 1 { 1 } else { -1 };
            if let Err(error) = sys::signal_to_address(&self.count, SignalType::Signal, 0, wake_count) {
                panic!("failed to signal light semaphore: {error}");
            }
        }
    }

    pub fn current_count(&self) -> i32 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn max_count(&self) -> i32 {
        self.max_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_follows_acquire_and_release() {
        let semaphore = LightSemaphore::new(0, 2);
        assert!(!semaphore.try_acquire());
        assert!(!semaphore.timed_acquire(Duration::from_millis(5)));

        semaphore.release_count(2);
        assert_eq!(semaphore.current_count(), 2);
        semaphore.acquire();
        assert!(semaphore.timed_acquire(Duration::ZERO));
        assert_eq!(semaphore.current_count(), 0);
    }

    #[test]
    #[should_panic(expected = "past its max count")]
    fn release_past_max_panics() {
        let semaphore = LightSemaphore::new(1, 1);
        semaphore.release();
    }
}
