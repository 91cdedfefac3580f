//! Synchronization primitives built on kernel arbitration and kernel events

mod busy_mutex;
pub use busy_mutex::*;
mod condvar;
pub use condvar::*;
mod critical_section;
pub use critical_section::*;
mod event;
pub use event::*;
mod inter_process_event;
pub use inter_process_event::*;
mod interrupt_event;
pub use interrupt_event::*;
mod light_event;
pub use light_event::*;
mod light_message_queue;
pub use light_message_queue::*;
mod light_semaphore;
pub use light_semaphore::*;
mod message_queue;
pub use message_queue::*;
mod mutex;
pub use mutex::*;
mod ring_buffer;
mod rw_busy_mutex;
pub use rw_busy_mutex::*;
mod rw_lock;
pub use rw_lock::*;
mod semaphore;
pub use semaphore::*;
mod system_event;
pub use system_event::*;
mod timer_event;
pub use timer_event::*;

/// Whether an event stays signaled after a waiter is released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClearMode {
    /// The event stays signaled until it is cleared
    ManualClear,
    /// The event is cleared when a waiter is released by it
    AutoClear,
}
