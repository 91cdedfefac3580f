use std::time::Duration;

use crate::config::SYSTEM_TICK_FREQUENCY;
use crate::kernel::{current_thread, current_thread_local_region, spawn_thread, KERNEL};
use crate::{Handle, KResult, SysErr, ThreadLocalRegion};

/// Returns the handle the calling thread uses to refer to itself
///
/// This is the value stored in arbitrated lock words owned by the thread
pub fn get_current_thread_handle() -> Handle {
    current_thread().handle
}

/// Returns the kernel id of the thread referred to by `thread`
pub fn get_thread_id(thread: Handle) -> KResult<u64> {
    KERNEL.lock()
        .thread_by_handle(thread)?
        .ok_or(SysErr::InvalidState)
}

/// Returns the calling thread's thread local region
pub fn thread_local_region() -> &'static ThreadLocalRegion {
    current_thread_local_region()
}

/// Creates and starts a thread running `f`
///
/// The returned handle is owned by the caller, it becomes signaled when the thread exits
pub fn create_thread<F: FnOnce() + Send + 'static>(f: F) -> KResult<Handle> {
    spawn_thread(f)
}

/// Suspends the calling thread for `nsec` nanoseconds, or yields if `nsec` is not positive
pub fn sleep_thread(nsec: i64) {
    if nsec <= 0 {
        std::thread::yield_now();
    } else {
        std::thread::sleep(Duration::from_nanos(nsec as u64));
    }
}

/// Performs the preemption that was deferred while the calling thread's disable count was non zero
pub fn synchronize_preemption_state() {
    let tlr = thread_local_region();
    if tlr.interrupt_flag.swap(false, core::sync::atomic::Ordering::AcqRel) {
        std::thread::yield_now();
    }
}

/// Returns the number of ticks of the system counter since boot, the counter runs at [`SYSTEM_TICK_FREQUENCY`]
pub fn get_system_tick() -> u64 {
    let nanos = KERNEL.uptime().as_nanos();
    (nanos * SYSTEM_TICK_FREQUENCY as u128 / 1_000_000_000) as u64
}
