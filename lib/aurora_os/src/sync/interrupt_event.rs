use core::time::Duration;

use sys::{Handle, InterruptType, KResult};

use crate::time::TimeoutHelper;
use super::inter_process_event::{try_wait_on_handle, wait_on_handle};
use super::EventClearMode;

/// An event signaled by the kernel when an interrupt fires
///
/// Auto clear events are edge triggered, manual clear events are level triggered.
#[derive(Debug)]
pub struct InterruptEvent {
    handle: Handle,
    clear_mode: EventClearMode,
}

impl InterruptEvent {
    pub fn new(name: u32, clear_mode: EventClearMode) -> KResult<Self> {
        let kind = match clear_mode {
            EventClearMode::AutoClear => InterruptType::Edge,
            EventClearMode::ManualClear => InterruptType::Level,
        };

        Ok(InterruptEvent {
            handle: sys::create_interrupt_event(name, kind)?,
            clear_mode,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn clear_mode(&self) -> EventClearMode {
        self.clear_mode
    }

    pub fn clear(&self) {
        if let Err(error) = sys::clear_event(self.handle) {
            panic!("failed to clear interrupt event: {error}");
        }
    }

    pub fn wait(&self) {
        wait_on_handle(self.handle, self.clear_mode, None);
    }

    pub fn try_wait(&self) -> bool {
        try_wait_on_handle(self.handle, self.clear_mode)
    }

    /// Returns false if the interrupt did not fire before `timeout` passed
    pub fn timed_wait(&self, timeout: Duration) -> bool {
        wait_on_handle(self.handle, self.clear_mode, Some(&TimeoutHelper::new(timeout)))
    }
}

impl Drop for InterruptEvent {
    fn drop(&mut self) {
        if let Err(error) = sys::close_handle(self.handle) {
            log::warn!("failed to close interrupt event handle: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_interrupt_signals_event() {
        let event = InterruptEvent::new(0x51, EventClearMode::AutoClear).unwrap();
        assert!(!event.try_wait());

        sys::raise_interrupt(0x51);
        event.wait();
        assert!(!event.timed_wait(Duration::from_millis(5)));
    }
}
