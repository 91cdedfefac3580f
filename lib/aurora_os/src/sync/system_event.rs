use core::time::Duration;

use sys::KResult;

use super::{Event, EventClearMode, InterProcessEvent};

/// An event which is either local to the process or backed by a kernel event
#[derive(Debug)]
pub enum SystemEvent {
    Event(Event),
    InterProcessEvent(InterProcessEvent),
}

impl SystemEvent {
    /// Creates an event local to the process
    pub const fn new(clear_mode: EventClearMode) -> Self {
        SystemEvent::Event(Event::new(clear_mode, false))
    }

    /// Creates an event backed by a new kernel event, which can be shared with other processes
    pub fn new_inter_process(clear_mode: EventClearMode) -> KResult<Self> {
        Ok(SystemEvent::InterProcessEvent(InterProcessEvent::new(clear_mode)?))
    }

    pub fn is_inter_process(&self) -> bool {
        matches!(self, SystemEvent::InterProcessEvent(_))
    }

    pub fn signal(&self) {
        match self {
            SystemEvent::Event(event) => event.signal(),
            SystemEvent::InterProcessEvent(event) => event.signal(),
        }
    }

    pub fn clear(&self) {
        match self {
            SystemEvent::Event(event) => event.clear(),
            SystemEvent::InterProcessEvent(event) => event.clear(),
        }
    }

    pub fn wait(&self) {
        match self {
            SystemEvent::Event(event) => event.wait(),
            SystemEvent::InterProcessEvent(event) => event.wait(),
        }
    }

    pub fn try_wait(&self) -> bool {
        match self {
            SystemEvent::Event(event) => event.try_wait(),
            SystemEvent::InterProcessEvent(event) => event.try_wait(),
        }
    }

    pub fn timed_wait(&self, timeout: Duration) -> bool {
        match self {
            SystemEvent::Event(event) => event.timed_wait(timeout),
            SystemEvent::InterProcessEvent(event) => event.timed_wait(timeout),
        }
    }
}

impl From<Event> for SystemEvent {
    fn from(event: Event) -> Self {
        SystemEvent::Event(event)
    }
}

impl From<InterProcessEvent> for SystemEvent {
    fn from(event: InterProcessEvent) -> Self {
        SystemEvent::InterProcessEvent(event)
    }
}
