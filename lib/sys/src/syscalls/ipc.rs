use crate::config::ARGUMENT_HANDLE_COUNT_MAX;
use crate::kernel::{current_thread, deadline, sleep, HandleKind, KObject, KernelState, WaitKind, WakeReason, KERNEL};
use crate::{Handle, KResult, SysErr};

/// Creates a session, returning the server and client handles to it
pub fn create_session() -> KResult<(Handle, Handle)> {
    let mut kernel = KERNEL.lock();

    let object = kernel.objects.insert(KObject::Session {
        pending: Default::default(),
        current: None,
        server_open: true,
    });

    let server = kernel.objects.create_handle(object, HandleKind::ServerSession)?;
    match kernel.objects.create_handle(object, HandleKind::ClientSession) {
        Ok(client) => Ok((server, client)),
        Err(error) => {
            kernel.close_handle(server)?;
            Err(error)
        },
    }
}

/// Sends a request on the session referred to by `client` and blocks until the server replies
///
/// # Errors
///
/// [`SysErr::SessionClosed`] if the server side of the session is closed before it replies
pub fn send_sync_request(client: Handle) -> KResult<()> {
    let thread = current_thread();
    let mut kernel = KERNEL.lock();

    let entry = kernel.objects.get_handle_of_kind(client, HandleKind::ClientSession)?;
    match kernel.objects.object_mut(entry.object) {
        Some(KObject::Session { pending, server_open: true, .. }) => pending.push_back(thread.id),
        _ => return Err(SysErr::SessionClosed),
    }
    kernel.thread_mut(thread.id).wait = WaitKind::Ipc;
    kernel.notify_object(entry.object);

    match sleep(&mut kernel, &thread, None) {
        Some(WakeReason::Released) => Ok(()),
        Some(WakeReason::Error(error)) => Err(error),
        _ => Err(SysErr::InvalidState),
    }
}

/// Replies to the request received on `reply_target` if it is valid, then waits like
/// [`wait_synchronization`](crate::wait_synchronization) on `handles`
///
/// When the returned index refers to a server session, the next request on that session
/// has been received and must be replied to with a later call.
pub fn reply_and_receive(handles: &[Handle], reply_target: Handle, timeout_nsec: i64) -> KResult<usize> {
    if handles.len() > ARGUMENT_HANDLE_COUNT_MAX {
        return Err(SysErr::OutOfRange);
    }

    let thread = current_thread();
    let mut kernel = KERNEL.lock();

    if reply_target.is_valid() {
        let entry = kernel.objects.get_handle_of_kind(reply_target, HandleKind::ServerSession)?;
        kernel.reply(entry.object)?;
    }

    let entries = handles.iter()
        .map(|handle| {
            let object = kernel.objects.waitable_object(*handle)?;
            Ok((object, kernel.objects.get_handle(*handle)?.kind))
        })
        .collect::<KResult<Vec<_>>>()?;

    let deadline = deadline(timeout_nsec);
    loop {
        let objects = entries.iter().map(|(object, _)| *object).collect();
        let index = KernelState::wait_objects(&mut kernel, &thread, objects, deadline, timeout_nsec == 0)?;

        let (object, kind) = entries[index];
        if kind != HandleKind::ServerSession || kernel.receive_request(object) {
            return Ok(index);
        }
        // another thread received the request first
    }
}
