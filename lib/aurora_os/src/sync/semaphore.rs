use core::time::Duration;

use crate::multi_wait::{HolderNode, MultiWaitObjectList};
use crate::time::TimeoutHelper;
use super::{ConditionVariable, Mutex};

#[derive(Debug)]
struct SemaphoreState {
    count: u32,
    max_count: u32,
    multi_wait_list: MultiWaitObjectList,
}

/// A counting semaphore which blocks in the kernel while the count is zero
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<SemaphoreState>,
    cond_not_zero: ConditionVariable,
}

impl Semaphore {
    /// # Panics
    ///
    /// panics if `max_count` is zero or `initial_count` is greater than `max_count`
    pub const fn new(initial_count: u32, max_count: u32) -> Self {
        assert!(max_count >= 1, "semaphore max count must be at least 1");
        assert!(initial_count <= max_count, "semaphore initial count is greater than its max count");

        Semaphore {
            state: Mutex::new(SemaphoreState {
                count: initial_count,
                max_count,
                multi_wait_list: MultiWaitObjectList::new(),
            }),
            cond_not_zero: ConditionVariable::new(),
        }
    }

    pub fn acquire(&self) {
        let mut state = self.state.lock();
        while state.count == 0 {
            self.cond_not_zero.wait(&mut state);
        }
        state.count -= 1;
    }

    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.count == 0 {
            return false;
        }
        state.count -= 1;
        true
    }

    /// Returns false if the count stayed zero until `timeout` passed
    pub fn timed_acquire(&self, timeout: Duration) -> bool {
        let timeout = TimeoutHelper::new(timeout);
        let mut state = self.state.lock();

        while state.count == 0 {
            if timeout.is_timed_out() {
                return false;
            }
            self.cond_not_zero.timed_wait_until(&mut state, &timeout);
        }

        state.count -= 1;
        true
    }

    /// # Panics
    ///
    /// panics if the count would go above the max count
    pub fn release(&self) {
        let mut state = self.state.lock();
        assert!(state.count < state.max_count, "semaphore released past its max count");

        state.count += 1;
        self.cond_not_zero.signal();
        state.multi_wait_list.signal_all_threads();
    }

    /// Adds `count` to the semaphore count
    ///
    /// # Panics
    ///
    /// panics if `count` is zero or the count would go above the max count
    pub fn release_count(&self, count: u32) {
        assert!(count >= 1, "semaphore released with a count of zero");

        let mut state = self.state.lock();
        assert!(
            state.count.checked_add(count).is_some_and(|new_count| new_count <= state.max_count),
            "semaphore released past its max count",
        );

        state.count += count;
        self.cond_not_zero.broadcast();
        state.multi_wait_list.signal_all_threads();
    }

    pub fn current_count(&self) -> u32 {
        self.state.lock().count
    }

    pub fn max_count(&self) -> u32 {
        self.state.lock().max_count
    }

    pub(crate) fn is_signaled_for_multi_wait(&self) -> bool {
        self.state.lock().count > 0
    }

    pub(crate) fn link_multi_wait_holder(&self, holder: &HolderNode) -> bool {
        let mut state = self.state.lock();
        state.multi_wait_list.link(holder);
        state.count > 0
    }

    pub(crate) fn unlink_multi_wait_holder(&self, holder: &HolderNode) {
        self.state.lock().multi_wait_list.unlink(holder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_follows_acquire_and_release() {
        let semaphore = Semaphore::new(1, 3);
        assert!(semaphore.try_acquire());
        assert!(!semaphore.try_acquire());
        assert!(!semaphore.timed_acquire(Duration::from_millis(5)));

        semaphore.release_count(3);
        assert_eq!(semaphore.current_count(), 3);
        semaphore.acquire();
        assert!(semaphore.timed_acquire(Duration::ZERO));
        assert_eq!(semaphore.current_count(), 1);
    }

    #[test]
    #[should_panic(expected = "past its max count")]
    fn release_past_max_panics() {
        let semaphore = Semaphore::new(2, 2);
        semaphore.release();
    }
}
