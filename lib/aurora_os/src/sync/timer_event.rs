use core::time::Duration;

use crate::multi_wait::{HolderNode, MultiWaitObjectList};
use crate::time::{Tick, TimeoutHelper};
use super::{ConditionVariable, EventClearMode, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Stop,
    OneShot,
    Periodic,
}

#[derive(Debug)]
struct TimerEventState {
    timer_state: TimerState,
    signaled: bool,
    clear_mode: EventClearMode,
    broadcast_counter: u64,
    /// When a periodic timer first fired, later periods are counted from here
    first: Tick,
    /// Length of a period in ticks, never zero for a periodic timer
    interval: u64,
    next_time_to_wakeup: Tick,
    multi_wait_list: MultiWaitObjectList,
}

impl TimerEventState {
    /// Fires the timer if its wakeup time passed, returns true if it fired
    fn update_signal_state_and_recalc_next_time_to_wakeup(&mut self, now: Tick) -> bool {
        if self.timer_state == TimerState::Stop || self.next_time_to_wakeup >= now {
            return false;
        }

        self.signaled = true;

        if self.timer_state == TimerState::OneShot {
            self.timer_state = TimerState::Stop;
            return true;
        }

        let mut next_time = self.next_time_to_wakeup.as_raw().saturating_add(self.interval);
        if next_time < now.as_raw() {
            // skip every period which was missed without a query
            let periods = (now.as_raw() - self.first.as_raw()) / self.interval;
            next_time = self.first.as_raw().saturating_add(self.interval.saturating_mul(periods + 1));
        }
        self.next_time_to_wakeup = Tick::from_raw(next_time);

        true
    }

    fn wakeup_time(&self) -> Tick {
        match self.timer_state {
            TimerState::Stop => Tick::MAX,
            TimerState::OneShot | TimerState::Periodic => self.next_time_to_wakeup,
        }
    }

    /// Wakes every waiter so they look at the new timer state
    fn wake_all(&mut self, cond: &ConditionVariable) {
        self.broadcast_counter = self.broadcast_counter.wrapping_add(1);
        cond.broadcast();
        self.multi_wait_list.broadcast_all_threads();
    }
}

/// An event which signals itself once or periodically after a delay
#[derive(Debug)]
pub struct TimerEvent {
    state: Mutex<TimerEventState>,
    cond: ConditionVariable,
}

impl TimerEvent {
    pub const fn new(clear_mode: EventClearMode) -> Self {
        TimerEvent {
            state: Mutex::new(TimerEventState {
                timer_state: TimerState::Stop,
                signaled: false,
                clear_mode,
                broadcast_counter: 0,
                first: Tick::from_raw(0),
                interval: 0,
                next_time_to_wakeup: Tick::from_raw(0),
                multi_wait_list: MultiWaitObjectList::new(),
            }),
            cond: ConditionVariable::new(),
        }
    }

    /// Signals the event once, `first` from now
    pub fn start_one_shot(&self, first: Duration) {
        let mut state = self.state.lock();

        let next_time = Tick::now() + first;
        state.timer_state = TimerState::OneShot;
        state.first = next_time;
        state.interval = 0;
        state.next_time_to_wakeup = next_time;

        state.wake_all(&self.cond);
    }

    /// Signals the event `first` from now, and then every `interval`
    ///
    /// # Panics
    ///
    /// panics if `interval` is zero
    pub fn start_periodic(&self, first: Duration, interval: Duration) {
        assert!(!interval.is_zero(), "timer event interval must not be zero");

        let mut state = self.state.lock();

        let next_time = Tick::now() + first;
        state.timer_state = TimerState::Periodic;
        state.first = next_time;
        state.interval = Tick::from_duration(interval).as_raw().max(1);
        state.next_time_to_wakeup = next_time;

        state.wake_all(&self.cond);
    }

    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.timer_state = TimerState::Stop;
        state.wake_all(&self.cond);
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

    pub fn clear(&self) {
        self.state.lock().signaled = false;
    }

    pub fn wait(&self) {
        let mut state = self.state.lock();

        let broadcast_counter = state.broadcast_counter;
        while !state.signaled {
            if state.broadcast_counter != broadcast_counter {
                break;
            }

            let now = Tick::now();
            if state.update_signal_state_and_recalc_next_time_to_wakeup(now) {
                break;
            }

            match state.timer_state {
                TimerState::Stop => self.cond.wait(&mut state),
                TimerState::OneShot | TimerState::Periodic => {
                    let timeout = TimeoutHelper::new(state.next_time_to_wakeup.saturating_duration_since(now));
                    self.cond.timed_wait_until(&mut state, &timeout);
                },
            }
        }

        if state.clear_mode == EventClearMode::AutoClear {
            state.signaled = false;
        }
    }

    pub fn try_wait(&self) -> bool {
        let mut state = self.state.lock();
        state.update_signal_state_and_recalc_next_time_to_wakeup(Tick::now());

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

            let now = Tick::now();
            if state.update_signal_state_and_recalc_next_time_to_wakeup(now) {
                break;
            }

            if timeout.is_timed_out() {
                return false;
            }

            match state.timer_state {
                TimerState::Stop => {
                    self.cond.timed_wait_until(&mut state, &timeout);
                },
                TimerState::OneShot | TimerState::Periodic => {
                    let until_wakeup = state.next_time_to_wakeup.saturating_duration_since(now);
                    let wait_timeout = TimeoutHelper::new(until_wakeup.min(timeout.time_left()));
                    self.cond.timed_wait_until(&mut state, &wait_timeout);
                },
            }
        }

        if state.clear_mode == EventClearMode::AutoClear {
            state.signaled = false;
        }
        true
    }

    pub(crate) fn is_signaled_for_multi_wait(&self) -> bool {
        let mut state = self.state.lock();
        state.update_signal_state_and_recalc_next_time_to_wakeup(Tick::now());
        state.signaled
    }

    pub(crate) fn link_multi_wait_holder(&self, holder: &HolderNode) -> bool {
        let mut state = self.state.lock();
        state.multi_wait_list.link(holder);
        state.update_signal_state_and_recalc_next_time_to_wakeup(Tick::now());
        state.signaled
    }

    pub(crate) fn unlink_multi_wait_holder(&self, holder: &HolderNode) {
        self.state.lock().multi_wait_list.unlink(holder);
    }

    pub(crate) fn wakeup_time_for_multi_wait(&self) -> Tick {
        self.state.lock().wakeup_time()
    }
}
