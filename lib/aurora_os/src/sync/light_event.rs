use core::sync::atomic::{fence, AtomicI32, Ordering};
use core::time::Duration;

use sys::{ArbitrationType, SignalType, SysErr};

use crate::time::{TimeoutHelper, WAIT_INFINITE};
use super::EventClearMode;

const NOT_SIGNALED_NO_WAITER: i32 = 0;
const NOT_SIGNALED_WAITER: i32 = 1;
const SIGNALED: i32 = 2;

/// An event implemented with a single word and kernel address waits
///
/// The clear mode is picked per call instead of per event,
/// so the same event can be used with either mode as long as every caller agrees.
#[derive(Debug)]
pub struct InternalLightEvent {
    state: AtomicI32,
}

impl InternalLightEvent {
    pub const fn new(signaled: bool) -> Self {
        InternalLightEvent {
            state: AtomicI32::new(if signaled { SIGNALED } else { NOT_SIGNALED_NO_WAITER }),
        }
    }

    /// Wakes one waiter, or leaves the event signaled for the next waiter if there are none
    pub fn signal_with_auto_clear(&self) {
        fence(Ordering::SeqCst);

        loop {
            match self.state.load(Ordering::Relaxed) {
                NOT_SIGNALED_NO_WAITER => {
                    if self.state.compare_exchange(NOT_SIGNALED_NO_WAITER, SIGNALED, Ordering::SeqCst, Ordering::Relaxed).is_ok() {
                        return;
                    }
                },
                NOT_SIGNALED_WAITER => {
                    // the kernel moves the state to no waiters or signaled depending on how many threads are left waiting
                    match sys::signal_to_address(&self.state, SignalType::SignalAndModifyByWaitingCountIfEqual, NOT_SIGNALED_WAITER, 1) {
                        Ok(()) => return,
                        Err(SysErr::InvalidState) => (),
                        Err(error) => panic!("failed to signal light event: {error}"),
                    }
                },
                _ => return,
            }
        }
    }

    /// Signals the event and wakes every waiter
    pub fn signal_with_manual_clear(&self) {
        fence(Ordering::SeqCst);

        loop {
            match self.state.load(Ordering::Relaxed) {
                NOT_SIGNALED_NO_WAITER => {
                    if self.state.compare_exchange(NOT_SIGNALED_NO_WAITER, SIGNALED, Ordering::SeqCst, Ordering::Relaxed).is_ok() {
                        return;
                    }
                },
                NOT_SIGNALED_WAITER => {
                    match sys::signal_to_address(&self.state, SignalType::SignalAndIncrementIfEqual, NOT_SIGNALED_WAITER, -1) {
                        Ok(()) => return,
                        Err(SysErr::InvalidState) => (),
                        Err(error) => panic!("failed to signal light event: {error}"),
                    }
                },
                _ => return,
            }
        }
    }

    pub fn clear(&self) {
        fence(Ordering::SeqCst);
        let _ = self.state.compare_exchange(SIGNALED, NOT_SIGNALED_NO_WAITER, Ordering::SeqCst, Ordering::Relaxed);
    }

    /// Waits for the state to leave [`NOT_SIGNALED_WAITER`], returns false if the wait timed out
    fn wait_for_signal(&self, timeout_nsec: i64) -> bool {
        match sys::wait_for_address(&self.state, ArbitrationType::WaitIfEqual, NOT_SIGNALED_WAITER, timeout_nsec) {
            Ok(()) | Err(SysErr::InvalidState) => true,
            Err(SysErr::TimedOut) => false,
            Err(error) => panic!("failed to wait on light event: {error}"),
        }
    }

    /// Registers the calling thread as a waiter, returns true if the event was signaled instead
    ///
    /// For auto clear waits the signaled state is consumed.
    fn prepare_wait(&self, clear_mode: EventClearMode) -> bool {
        loop {
            match self.state.load(Ordering::Relaxed) {
                NOT_SIGNALED_NO_WAITER => {
                    if self.state.compare_exchange(NOT_SIGNALED_NO_WAITER, NOT_SIGNALED_WAITER, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
                        return false;
                    }
                },
                NOT_SIGNALED_WAITER => return false,
                _ => match clear_mode {
                    EventClearMode::ManualClear => return true,
                    EventClearMode::AutoClear => {
                        if self.state.compare_exchange(SIGNALED, NOT_SIGNALED_NO_WAITER, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
                            return true;
                        }
                    },
                },
            }
        }
    }

    pub fn wait_with_auto_clear(&self) {
        loop {
            if self.prepare_wait(EventClearMode::AutoClear) {
                break;
            }

            // an auto clear signal hands the event to exactly the threads it woke,
            // anything else means the state changed under us and we have to look again
            match sys::wait_for_address(&self.state, ArbitrationType::WaitIfEqual, NOT_SIGNALED_WAITER, WAIT_INFINITE) {
                Ok(()) => break,
                Err(SysErr::InvalidState) => (),
                Err(error) => panic!("failed to wait on light event: {error}"),
            }
        }

        fence(Ordering::SeqCst);
    }

    pub fn wait_with_manual_clear(&self) {
        if !self.prepare_wait(EventClearMode::ManualClear) {
            self.wait_for_signal(WAIT_INFINITE);
        }

        fence(Ordering::SeqCst);
    }

    pub fn try_wait_with_auto_clear(&self) -> bool {
        fence(Ordering::SeqCst);
        self.state.compare_exchange(SIGNALED, NOT_SIGNALED_NO_WAITER, Ordering::SeqCst, Ordering::Relaxed).is_ok()
    }

    pub fn try_wait_with_manual_clear(&self) -> bool {
        fence(Ordering::SeqCst);
        self.state.load(Ordering::SeqCst) == SIGNALED
    }

    pub fn timed_wait_with_auto_clear(&self, timeout: &TimeoutHelper) -> bool {
        loop {
            if self.prepare_wait(EventClearMode::AutoClear) {
                break;
            }

            match sys::wait_for_address(&self.state, ArbitrationType::WaitIfEqual, NOT_SIGNALED_WAITER, timeout.time_left_nsec()) {
                Ok(()) => break,
                Err(SysErr::InvalidState) => (),
                Err(SysErr::TimedOut) => return false,
                Err(error) => panic!("failed to wait on light event: {error}"),
            }
        }

        fence(Ordering::SeqCst);
        true
    }

    pub fn timed_wait_with_manual_clear(&self, timeout: &TimeoutHelper) -> bool {
        if !self.prepare_wait(EventClearMode::ManualClear) && !self.wait_for_signal(timeout.time_left_nsec()) {
            return false;
        }

        fence(Ordering::SeqCst);
        true
    }
}

impl Default for InternalLightEvent {
    fn default() -> Self {
        Self::new(false)
    }
}

/// An event which only uses the kernel when a thread actually has to block
#[derive(Debug)]
pub struct LightEvent {
    inner: InternalLightEvent,
    clear_mode: EventClearMode,
}

impl LightEvent {
    pub const fn new(clear_mode: EventClearMode, signaled: bool) -> Self {
        LightEvent {
            inner: InternalLightEvent::new(signaled),
            clear_mode,
        }
    }

    pub fn clear_mode(&self) -> EventClearMode {
        self.clear_mode
    }

    pub fn signal(&self) {
        match self.clear_mode {
            EventClearMode::ManualClear => self.inner.signal_with_manual_clear(),
            EventClearMode::AutoClear => self.inner.signal_with_auto_clear(),
        }
    }

    pub fn wait(&self) {
        match self.clear_mode {
            EventClearMode::ManualClear => self.inner.wait_with_manual_clear(),
            EventClearMode::AutoClear => self.inner.wait_with_auto_clear(),
        }
    }

    pub fn try_wait(&self) -> bool {
        match self.clear_mode {
            EventClearMode::ManualClear => self.inner.try_wait_with_manual_clear(),
            EventClearMode::AutoClear => self.inner.try_wait_with_auto_clear(),
        }
    }

    /// Returns false if the event was not signaled before `timeout` passed
    pub fn timed_wait(&self, timeout: Duration) -> bool {
        let timeout = TimeoutHelper::new(timeout);
        match self.clear_mode {
            EventClearMode::ManualClear => self.inner.timed_wait_with_manual_clear(&timeout),
            EventClearMode::AutoClear => self.inner.timed_wait_with_auto_clear(&timeout),
        }
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_clear_consumes_signal() {
        let event = LightEvent::new(EventClearMode::AutoClear, false);
        assert!(!event.try_wait());

        event.signal();
        assert!(event.try_wait());
        assert!(!event.try_wait());

        event.signal();
        event.wait();
        assert!(!event.timed_wait(Duration::from_millis(5)));
    }

    #[test]
    fn manual_clear_keeps_signal() {
        let event = LightEvent::new(EventClearMode::ManualClear, true);
        event.wait();
        assert!(event.try_wait());
        assert!(event.timed_wait(Duration::ZERO));

        event.clear();
        assert!(!event.try_wait());
        assert!(!event.timed_wait(Duration::from_millis(5)));
    }
}
