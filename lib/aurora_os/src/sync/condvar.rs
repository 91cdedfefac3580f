use core::sync::atomic::AtomicU32;
use core::time::Duration;

use sys::SysErr;

use crate::time::{TimeoutHelper, WAIT_INFINITE};
use super::{InternalCriticalSection, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionVariableStatus {
    Success,
    TimedOut,
}

/// A condition variable paired with an [`InternalCriticalSection`]
///
/// The kernel releases the critical section and queues the waiter atomically,
/// and reacquires it for the waiter before a successful wait returns.
#[derive(Debug, Default)]
pub struct InternalConditionVariable {
    /// Key the kernel uses to find waiters, it is non zero while there are waiters
    value: AtomicU32,
}

impl InternalConditionVariable {
    pub const fn new() -> Self {
        InternalConditionVariable {
            value: AtomicU32::new(0),
        }
    }

    pub fn signal(&self) {
        sys::signal_process_wide_key(&self.value, 1);
    }

    pub fn broadcast(&self) {
        sys::signal_process_wide_key(&self.value, -1);
    }

    /// # Panics
    ///
    /// panics if the current thread does not hold `cs`
    pub fn wait(&self, cs: &InternalCriticalSection) {
        assert!(cs.is_locked_by_current_thread(), "condition variable waited on without holding the lock");

        let current = sys::get_current_thread_handle();
        if let Err(error) = sys::wait_process_wide_key_atomic(cs.word(), &self.value, current, WAIT_INFINITE) {
            panic!("failed to wait on condition variable: {error}");
        }
    }

    /// Waits until signaled or the deadline tracked by `timeout` passes
    ///
    /// `cs` is held again when this returns, whatever the result
    pub fn timed_wait(&self, cs: &InternalCriticalSection, timeout: &TimeoutHelper) -> ConditionVariableStatus {
        assert!(cs.is_locked_by_current_thread(), "condition variable waited on without holding the lock");

        let timeout_nsec = timeout.time_left_nsec();
        if timeout_nsec == 0 {
            // give other threads a chance at the lock, as an actual wait would
            cs.leave();
            cs.enter();
            return ConditionVariableStatus::TimedOut;
        }

        let current = sys::get_current_thread_handle();
        match sys::wait_process_wide_key_atomic(cs.word(), &self.value, current, timeout_nsec) {
            Ok(()) => ConditionVariableStatus::Success,
            Err(SysErr::TimedOut) => {
                // the kernel does not reacquire the lock when the wait times out
                cs.enter();
                ConditionVariableStatus::TimedOut
            },
            Err(error) => panic!("failed to wait on condition variable: {error}"),
        }
    }
}

/// A condition variable used together with a [`Mutex`](super::Mutex)
#[derive(Debug, Default)]
pub struct ConditionVariable {
    inner: InternalConditionVariable,
}

impl ConditionVariable {
    pub const fn new() -> Self {
        ConditionVariable {
            inner: InternalConditionVariable::new(),
        }
    }

    /// Wakes at most one waiting thread
    pub fn signal(&self) {
        self.inner.signal();
    }

    /// Wakes every waiting thread
    pub fn broadcast(&self) {
        self.inner.broadcast();
    }

    /// Releases the mutex held by `guard` and waits to be signaled, the mutex is held again when this returns
    ///
    /// # Panics
    ///
    /// panics if the mutex is locked recursively
    pub fn wait<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>) {
        let raw = guard.raw();
        let nest_count = raw.begin_condition_wait();
        self.inner.wait(raw.critical_section());
        raw.end_condition_wait(nest_count);
    }

    pub fn timed_wait<T: ?Sized>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> ConditionVariableStatus {
        self.timed_wait_until(guard, &TimeoutHelper::new(timeout))
    }

    pub(crate) fn timed_wait_until<T: ?Sized>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        timeout: &TimeoutHelper,
    ) -> ConditionVariableStatus {
        let raw = guard.raw();
        let nest_count = raw.begin_condition_wait();
        let status = self.inner.timed_wait(raw.critical_section(), timeout);
        raw.end_condition_wait(nest_count);
        status
    }
}
