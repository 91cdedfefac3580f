use crate::config::ARGUMENT_HANDLE_COUNT_MAX;
use crate::kernel::{current_thread, deadline, HandleKind, KObject, KernelState, KERNEL};
use crate::{Handle, InterruptType, KResult, SysErr};

/// Waits until one of the objects referred to by `handles` is signaled
///
/// Returns the index of the signaled handle. A negative `timeout_nsec` waits forever and a
/// timeout of 0 only checks if any object is already signaled.
///
/// # Errors
///
/// - [`SysErr::TimedOut`]: the timeout elapsed
/// - [`SysErr::Cancelled`]: the wait was cancelled with [`cancel_synchronization`], or a cancellation was pending
/// - [`SysErr::InvalidHandle`]: a handle does not refer to a waitable object
/// - [`SysErr::OutOfRange`]: more than [`ARGUMENT_HANDLE_COUNT_MAX`] handles were passed
pub fn wait_synchronization(handles: &[Handle], timeout_nsec: i64) -> KResult<usize> {
    if handles.len() > ARGUMENT_HANDLE_COUNT_MAX {
        return Err(SysErr::OutOfRange);
    }

    let thread = current_thread();
    let mut kernel = KERNEL.lock();

    let objects = handles.iter()
        .map(|handle| kernel.objects.waitable_object(*handle))
        .collect::<KResult<Vec<_>>>()?;

    KernelState::wait_objects(&mut kernel, &thread, objects, deadline(timeout_nsec), timeout_nsec == 0)
}

/// Cancels the synchronization wait of the thread referred to by `thread`
///
/// If that thread is not currently in [`wait_synchronization`], its next call fails with [`SysErr::Cancelled`] immediately
pub fn cancel_synchronization(thread: Handle) -> KResult<()> {
    let mut kernel = KERNEL.lock();

    if let Some(thread) = kernel.thread_by_handle(thread)? {
        kernel.cancel_synchronization(thread);
    }
    Ok(())
}

/// Creates an event, returning the writable and readable handles to it
pub fn create_event() -> KResult<(Handle, Handle)> {
    let mut kernel = KERNEL.lock();

    let object = kernel.objects.insert(KObject::Event { signaled: false });
    let writable = kernel.objects.create_handle(object, HandleKind::WritableEvent)?;
    match kernel.objects.create_handle(object, HandleKind::ReadableEvent) {
        Ok(readable) => Ok((writable, readable)),
        Err(error) => {
            kernel.close_handle(writable)?;
            Err(error)
        },
    }
}

/// Signals the event referred to by the writable handle `event`
pub fn signal_event(event: Handle) -> KResult<()> {
    let mut kernel = KERNEL.lock();

    let entry = kernel.objects.get_handle_of_kind(event, HandleKind::WritableEvent)?;
    kernel.set_signaled(entry.object, true)
}

/// Clears the event or interrupt event referred to by `event`, which may be either end of an event
pub fn clear_event(event: Handle) -> KResult<()> {
    let mut kernel = KERNEL.lock();

    let entry = kernel.objects.get_handle(event)?;
    match entry.kind {
        HandleKind::WritableEvent | HandleKind::ReadableEvent | HandleKind::InterruptEvent => {
            kernel.set_signaled(entry.object, false)
        },
        _ => Err(SysErr::InvalidHandle),
    }
}

/// Clears the readable event or interrupt event referred to by `event`
///
/// # Errors
///
/// [`SysErr::InvalidState`] if the event was not signaled, this is how exactly one of several
/// racing waiters claims an auto clear signal
pub fn reset_signal(event: Handle) -> KResult<()> {
    let mut kernel = KERNEL.lock();

    let entry = kernel.objects.get_handle(event)?;
    if !matches!(entry.kind, HandleKind::ReadableEvent | HandleKind::InterruptEvent) {
        return Err(SysErr::InvalidHandle);
    }

    if !kernel.objects.is_signaled(entry.object) {
        return Err(SysErr::InvalidState);
    }
    kernel.set_signaled(entry.object, false)
}

/// Creates an event which is signaled whenever interrupt `name` fires
pub fn create_interrupt_event(name: u32, kind: InterruptType) -> KResult<Handle> {
    let mut kernel = KERNEL.lock();

    let object = kernel.objects.insert(KObject::InterruptEvent {
        name,
        kind,
        signaled: false,
    });
    kernel.objects.create_handle(object, HandleKind::InterruptEvent)
}

pub fn close_handle(handle: Handle) -> KResult<()> {
    KERNEL.lock().close_handle(handle)
}
