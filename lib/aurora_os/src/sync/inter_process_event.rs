use core::time::Duration;

use sys::{Handle, KResult, SysErr};

use crate::time::{TimeoutHelper, WAIT_INFINITE};
use super::EventClearMode;

/// Waits on the readable event handle `handle`, returns false on timeout
///
/// For auto clear waits the thread which manages to reset the event wins,
/// the others go back to waiting.
pub(super) fn wait_on_handle(handle: Handle, clear_mode: EventClearMode, timeout: Option<&TimeoutHelper>) -> bool {
    loop {
        let timeout_nsec = match timeout {
            Some(timeout) => timeout.time_left_nsec(),
            None => WAIT_INFINITE,
        };

        match sys::wait_synchronization(&[handle], timeout_nsec) {
            Ok(_) => {
                if clear_mode == EventClearMode::AutoClear && sys::reset_signal(handle).is_err() {
                    continue;
                }
                return true;
            },
            Err(SysErr::TimedOut) => return false,
            // a multi wait on this thread may leave a cancellation behind
            Err(SysErr::Cancelled) => (),
            Err(error) => panic!("failed to wait on event handle {handle:?}: {error}"),
        }
    }
}

/// Checks if the readable event handle `handle` is signaled without blocking
pub(super) fn try_wait_on_handle(handle: Handle, clear_mode: EventClearMode) -> bool {
    if clear_mode == EventClearMode::AutoClear {
        return sys::reset_signal(handle).is_ok();
    }

    loop {
        match sys::wait_synchronization(&[handle], 0) {
            Ok(_) => return true,
            Err(SysErr::TimedOut) => return false,
            Err(SysErr::Cancelled) => (),
            Err(error) => panic!("failed to poll event handle {handle:?}: {error}"),
        }
    }
}

fn close_managed_handle(handle: Handle, managed: bool) {
    if managed && handle.is_valid() {
        if let Err(error) = sys::close_handle(handle) {
            log::warn!("failed to close event handle {handle:?}: {error}");
        }
    }
}

/// An event backed by a kernel event object, which can be shared with other processes through its handles
///
/// The readable handle is used to wait and the writable handle to signal.
/// Handles created by or handed to the event as managed are closed when it is dropped.
#[derive(Debug)]
pub struct InterProcessEvent {
    readable_handle: Handle,
    is_readable_handle_managed: bool,
    writable_handle: Handle,
    is_writable_handle_managed: bool,
    clear_mode: EventClearMode,
}

impl InterProcessEvent {
    /// Creates a new kernel event
    pub fn new(clear_mode: EventClearMode) -> KResult<Self> {
        let (writable_handle, readable_handle) = sys::create_event()?;

        Ok(InterProcessEvent {
            readable_handle,
            is_readable_handle_managed: true,
            writable_handle,
            is_writable_handle_managed: true,
            clear_mode,
        })
    }

    /// Wraps existing event handles, either of which may be [`Handle::INVALID`]
    ///
    /// # Panics
    ///
    /// panics if both handles are invalid
    pub fn attach(
        readable_handle: Handle,
        is_readable_handle_managed: bool,
        writable_handle: Handle,
        is_writable_handle_managed: bool,
        clear_mode: EventClearMode,
    ) -> Self {
        assert!(
            readable_handle.is_valid() || writable_handle.is_valid(),
            "inter process event needs a readable or writable handle",
        );

        InterProcessEvent {
            readable_handle,
            is_readable_handle_managed: is_readable_handle_managed && readable_handle.is_valid(),
            writable_handle,
            is_writable_handle_managed: is_writable_handle_managed && writable_handle.is_valid(),
            clear_mode,
        }
    }

    pub fn attach_readable_handle(handle: Handle, managed: bool, clear_mode: EventClearMode) -> Self {
        Self::attach(handle, managed, Handle::INVALID, false, clear_mode)
    }

    pub fn attach_writable_handle(handle: Handle, managed: bool, clear_mode: EventClearMode) -> Self {
        Self::attach(Handle::INVALID, false, handle, managed, clear_mode)
    }

    /// Takes the readable handle out of the event, the caller becomes responsible for closing it
    pub fn detach_readable_handle(&mut self) -> Handle {
        let handle = core::mem::replace(&mut self.readable_handle, Handle::INVALID);
        self.is_readable_handle_managed = false;
        handle
    }

    /// Takes the writable handle out of the event, the caller becomes responsible for closing it
    pub fn detach_writable_handle(&mut self) -> Handle {
        let handle = core::mem::replace(&mut self.writable_handle, Handle::INVALID);
        self.is_writable_handle_managed = false;
        handle
    }

    pub fn readable_handle(&self) -> Handle {
        self.readable_handle
    }

    pub fn writable_handle(&self) -> Handle {
        self.writable_handle
    }

    pub fn clear_mode(&self) -> EventClearMode {
        self.clear_mode
    }

    pub fn signal(&self) {
        if let Err(error) = sys::signal_event(self.writable_handle) {
            panic!("failed to signal inter process event: {error}");
        }
    }

    pub fn clear(&self) {
        let handle = if self.writable_handle.is_valid() {
            self.writable_handle
        } else {
            self.readable_handle
        };

        if let Err(error) = sys::clear_event(handle) {
            panic!("failed to clear inter process event: {error}");
        }
    }

    pub fn wait(&self) {
        wait_on_handle(self.readable_handle, self.clear_mode, None);
    }

    pub fn try_wait(&self) -> bool {
        try_wait_on_handle(self.readable_handle, self.clear_mode)
    }

    /// Returns false if the event was not signaled before `timeout` passed
    pub fn timed_wait(&self, timeout: Duration) -> bool {
        wait_on_handle(self.readable_handle, self.clear_mode, Some(&TimeoutHelper::new(timeout)))
    }
}

impl Drop for InterProcessEvent {
    fn drop(&mut self) {
        close_managed_handle(self.readable_handle, self.is_readable_handle_managed);
        close_managed_handle(self.writable_handle, self.is_writable_handle_managed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_clear_is_claimed_once() {
        let event = InterProcessEvent::new(EventClearMode::AutoClear).unwrap();
        assert!(!event.try_wait());

        event.signal();
        assert!(event.try_wait());
        assert!(!event.try_wait());

        event.signal();
        event.wait();
        assert!(!event.timed_wait(Duration::from_millis(5)));
    }

    #[test]
    fn detached_handles_stay_open() {
        let mut event = InterProcessEvent::new(EventClearMode::ManualClear).unwrap();
        let writable = event.detach_writable_handle();
        drop(event);

        // the readable end was closed, but the detached writable end still works
        sys::signal_event(writable).unwrap();
        sys::close_handle(writable).unwrap();
    }

    #[test]
    fn manual_clear_through_attached_handles() {
        let (writable, readable) = sys::create_event().unwrap();
        let reader = InterProcessEvent::attach_readable_handle(readable, true, EventClearMode::ManualClear);
        let writer = InterProcessEvent::attach_writable_handle(writable, true, EventClearMode::ManualClear);

        writer.signal();
        assert!(reader.try_wait());
        assert!(reader.timed_wait(Duration::ZERO));

        reader.clear();
        assert!(!reader.try_wait());
    }
}
