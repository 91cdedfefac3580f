use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::kernel::{current_thread, deadline, sleep, HandleKind, WakeReason, KERNEL};
use crate::{ArbitrationType, Handle, KResult, SignalType, SysErr, HANDLE_WAIT_MASK};

/// Blocks until the lock `word` is handed to the calling thread
///
/// `word` is expected to hold `owner` with [`HANDLE_WAIT_MASK`](crate::HANDLE_WAIT_MASK) set, if it does not
/// this returns immediately so the caller can retry. When woken, `word` holds `tag`,
/// with the wait bit set if more threads are still waiting.
pub fn arbitrate_lock(owner: Handle, word: &AtomicU32, tag: Handle) -> KResult<()> {
    let thread = current_thread();
    let mut kernel = KERNEL.lock();

    // the owner may have released the lock and exited already
    if word.load(Ordering::Acquire) != owner.as_raw() | HANDLE_WAIT_MASK {
        return Ok(());
    }
    kernel.objects.get_handle_of_kind(owner, HandleKind::Thread)?;

    if !kernel.queue_lock_waiter(thread.id, owner, word, tag) {
        return Ok(());
    }

    match sleep(&mut kernel, &thread, None) {
        Some(WakeReason::Released) => Ok(()),
        Some(WakeReason::Error(error)) => Err(error),
        _ => Err(SysErr::InvalidState),
    }
}

/// Hands the lock `word` to the next thread waiting for it, or stores [`Handle::INVALID`] if there are none
pub fn arbitrate_unlock(word: &AtomicU32) -> KResult<()> {
    if (word as *const AtomicU32 as usize) % core::mem::align_of::<AtomicU32>() != 0 {
        return Err(SysErr::InvalidAddress);
    }

    KERNEL.lock().release_lock(word as *const _ as usize);
    Ok(())
}

/// Atomically releases the lock `word` and waits on the condition variable `key`
///
/// When signaled the kernel reacquires the lock on behalf of the caller before returning.
/// On [`SysErr::TimedOut`] the lock is *not* held.
pub fn wait_process_wide_key_atomic(word: &AtomicU32, key: &AtomicU32, tag: Handle, timeout_nsec: i64) -> KResult<()> {
    let thread = current_thread();
    let mut kernel = KERNEL.lock();

    let address = word as *const _ as usize;
    if timeout_nsec == 0 {
        kernel.release_lock(address);
        return Err(SysErr::TimedOut);
    }

    kernel.queue_condition_variable_waiter(thread.id, address, key, tag);

    match sleep(&mut kernel, &thread, deadline(timeout_nsec)) {
        Some(WakeReason::Released) => Ok(()),
        Some(WakeReason::Error(error)) => Err(error),
        Some(_) => Err(SysErr::InvalidState),
        None => {
            kernel.arbiter.remove_thread(thread.id);
            Err(SysErr::TimedOut)
        },
    }
}

/// Wakes up to `count` threads waiting on the condition variable `key`, all of them if `count` is not positive
pub fn signal_process_wide_key(key: &AtomicU32, count: i32) {
    KERNEL.lock().signal_condition_variable(key, count);
}

/// Waits on `word` if the comparison described by `kind` against `value` holds
///
/// # Errors
///
/// - [`SysErr::InvalidState`]: the comparison failed, so the thread did not wait
/// - [`SysErr::TimedOut`]: the timeout elapsed, or was 0 and the thread would have waited
pub fn wait_for_address(word: &AtomicI32, kind: ArbitrationType, value: i32, timeout_nsec: i64) -> KResult<()> {
    let thread = current_thread();
    let mut kernel = KERNEL.lock();

    kernel.queue_address_waiter(thread.id, word, kind, value, timeout_nsec == 0)?;

    match sleep(&mut kernel, &thread, deadline(timeout_nsec)) {
        Some(WakeReason::Released) => Ok(()),
        Some(WakeReason::Error(error)) => Err(error),
        Some(_) => Err(SysErr::InvalidState),
        None => {
            kernel.arbiter.remove_thread(thread.id);
            Err(SysErr::TimedOut)
        },
    }
}

/// Updates `word` as described by `kind` and wakes up to `count` threads waiting on it,
/// all of them if `count` is not positive
///
/// # Errors
///
/// [`SysErr::InvalidState`] if `kind` requires `word` to equal `value` and it does not, no threads are woken then
pub fn signal_to_address(word: &AtomicI32, kind: SignalType, value: i32, count: i32) -> KResult<()> {
    KERNEL.lock().signal_address(word, kind, value, count)
}
