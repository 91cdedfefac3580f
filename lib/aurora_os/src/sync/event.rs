use core::time::Duration;

use crate::multi_wait::{HolderNode, MultiWaitObjectList};
use crate::time::TimeoutHelper;
use super::{ConditionVariable, ConditionVariableStatus, EventClearMode, Mutex};

#[derive(Debug)]
struct EventState {
    signaled: bool,
    clear_mode: EventClearMode,
    /// Bumped by every manual clear signal, so a waiter can tell it was released
    /// even if the event was cleared again before it woke up
    broadcast_counter: u64,
    multi_wait_list: MultiWaitObjectList,
}

/// A user space event which threads can wait on until it is signaled
#[derive(Debug)]
pub struct Event {
    state: Mutex<EventState>,
    cond: ConditionVariable,
}

impl Event {
    pub const fn new(clear_mode: EventClearMode, signaled: bool) -> Self {
        Event {
            state: Mutex::new(EventState {
                signaled,
                clear_mode,
                broadcast_counter: 0,
                multi_wait_list: MultiWaitObjectList::new(),
            }),
            cond: ConditionVariable::new(),
        }
    }

    pub fn clear_mode(&self) -> EventClearMode {
        self.state.lock().clear_mode
    }

    pub fn signal(&self) {
        let mut state = self.state.lock();
        if state.signaled {
            return;
        }

        state.signaled = true;
        match state.clear_mode {
            EventClearMode::ManualClear => {
                state.broadcast_counter = state.broadcast_counter.wrapping_add(1);
                self.cond.broadcast();
            },
            EventClearMode::AutoClear => self.cond.signal(),
        }

        state.multi_wait_list.signal_all_threads();
    }

    pub fn wait(&self) {
        let mut state = self.state.lock();

        let broadcast_counter = state.broadcast_counter;
        while !state.signaled {
            if state.broadcast_counter != broadcast_counter {
                break;
            }
            self.cond.wait(&mut state);
        }

        if state.clear_mode == EventClearMode::AutoClear {
            state.signaled = false;
        }
    }

    pub fn try_wait(&self) -> bool {
        let mut state = self.state.lock();

        let signaled = state.signaled;
        if state.clear_mode == EventClearMode::AutoClear {
            state.signaled = false;
        }
        signaled
    }

    /// Returns false if the event was not signaled before `timeout` passed
    pub fn timed_wait(&self, timeout: Duration) -> bool {
        let timeout = TimeoutHelper::new(timeout);
        let mut state = self.state.lock();

        let broadcast_counter = state.broadcast_counter;
        while !state.signaled {
            if state.broadcast_counter != broadcast_counter {
                break;
            }
            if self.cond.timed_wait_until(&mut state, &timeout) == ConditionVariableStatus::TimedOut {
                return false;
            }
        }

        if state.clear_mode == EventClearMode::AutoClear {
            state.signaled = false;
        }
        true
    }

    pub fn clear(&self) {
        self.state.lock().signaled = false;
    }

    pub(crate) fn is_signaled_for_multi_wait(&self) -> bool {
        self.state.lock().signaled
    }

    pub(crate) fn link_multi_wait_holder(&self, holder: &HolderNode) -> bool {
        let mut state = self.state.lock();
        state.multi_wait_list.link(holder);
        state.signaled
    }

    pub(crate) fn unlink_multi_wait_holder(&self, holder: &HolderNode) {
        self.state.lock().multi_wait_list.unlink(holder);
    }
}

impl Default for Event {
    fn default() -> Self {
        Event::new(EventClearMode::AutoClear, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_clear_resets_after_wait() {
        let event = Event::new(EventClearMode::AutoClear, true);
        assert!(event.try_wait());
        assert!(!event.try_wait());

        event.signal();
        event.wait();
        assert!(!event.timed_wait(Duration::from_millis(10)));
    }

    #[test]
    fn manual_clear_stays_signaled() {
        let event = Event::new(EventClearMode::ManualClear, false);
        assert!(!event.try_wait());

        event.signal();
        event.wait();
        assert!(event.try_wait());
        assert!(event.timed_wait(Duration::ZERO));

        event.clear();
        assert!(!event.try_wait());
    }
}
