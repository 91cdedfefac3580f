use std::collections::VecDeque;
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::config::{HANDLE_TABLE_SIZE, HANDLE_VALUE_MAX};
use crate::{Handle, InterruptType, KResult, SysErr};
use super::{sleep, KThread, KernelState, ThreadId, WaitKind, WakeReason};
use parking_lot::MutexGuard;

pub(crate) type ObjectId = u64;

#[derive(Debug)]
pub(crate) enum KObject {
    Thread {
        thread: ThreadId,
        exited: bool,
    },
    Event {
        signaled: bool,
    },
    InterruptEvent {
        name: u32,
        kind: InterruptType,
        signaled: bool,
    },
    Session {
        /// Clients which sent a request that has not been received yet
        pending: VecDeque<ThreadId>,
        /// Client whose request was received and is waiting for a reply
        current: Option<ThreadId>,
        server_open: bool,
    },
}

/// Which side of an object a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Thread,
    ReadableEvent,
    WritableEvent,
    InterruptEvent,
    ServerSession,
    ClientSession,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct HandleEntry {
    pub object: ObjectId,
    pub kind: HandleKind,
}

#[derive(Debug)]
struct ObjectEntry {
    object: KObject,
    handle_count: usize,
}

/// The process handle table along with every kernel object it references
#[derive(Debug)]
pub(crate) struct ObjectTable {
    objects: FxHashMap<ObjectId, ObjectEntry>,
    handles: FxHashMap<Handle, HandleEntry>,
    next_object: ObjectId,
    next_handle: u32,
}

impl ObjectTable {
    pub fn new() -> Self {
        ObjectTable {
            objects: FxHashMap::default(),
            handles: FxHashMap::default(),
            next_object: 1,
            next_handle: 1,
        }
    }

    /// Inserts an object which is not referenced by any handle yet
    pub fn insert(&mut self, object: KObject) -> ObjectId {
        let id = self.next_object;
        self.next_object += 1;
        self.objects.insert(id, ObjectEntry {
            object,
            handle_count: 0,
        });
        id
    }

    pub fn create_handle(&mut self, object: ObjectId, kind: HandleKind) -> KResult<Handle> {
        if self.handles.len() >= HANDLE_TABLE_SIZE {
            return Err(SysErr::OutOfHandles);
        }

        let entry = self.objects.get_mut(&object).ok_or(SysErr::InvalidHandle)?;

        // handle values are reused only after wrapping, and never overlap the lock wait bit
        let handle = loop {
            let candidate = Handle::from_raw(self.next_handle);
            self.next_handle = if self.next_handle >= HANDLE_VALUE_MAX {
                1
            } else {
                self.next_handle + 1
            };

            if !self.handles.contains_key(&candidate) {
                break candidate;
            }
        };

        entry.handle_count += 1;
        self.handles.insert(handle, HandleEntry { object, kind });
        Ok(handle)
    }

    pub fn get_handle(&self, handle: Handle) -> KResult<HandleEntry> {
        self.handles.get(&handle).copied().ok_or(SysErr::InvalidHandle)
    }

    /// Gets the handle entry for `handle` if it refers to an object of the given kind
    pub fn get_handle_of_kind(&self, handle: Handle, kind: HandleKind) -> KResult<HandleEntry> {
        let entry = self.get_handle(handle)?;
        if entry.kind == kind {
            Ok(entry)
        } else {
            Err(SysErr::InvalidHandle)
        }
    }

    pub fn object(&self, id: ObjectId) -> Option<&KObject> {
        Some(&self.objects.get(&id)?.object)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut KObject> {
        Some(&mut self.objects.get_mut(&id)?.object)
    }

    /// Removes `handle`, returning its entry and the object if this was the last handle to it
    fn remove_handle(&mut self, handle: Handle) -> KResult<(HandleEntry, Option<KObject>)> {
        let entry = self.handles.remove(&handle).ok_or(SysErr::InvalidHandle)?;
        // panic safety: objects live as long as any handle refers to them
        let object_entry = self.objects.get_mut(&entry.object).unwrap();
        object_entry.handle_count -= 1;

        if object_entry.handle_count == 0 {
            Ok((entry, self.objects.remove(&entry.object).map(|entry| entry.object)))
        } else {
            Ok((entry, None))
        }
    }

    /// Gets the object `handle` refers to if it is an object which can be waited on
    pub fn waitable_object(&self, handle: Handle) -> KResult<ObjectId> {
        let entry = self.get_handle(handle)?;
        match entry.kind {
            HandleKind::Thread
                | HandleKind::ReadableEvent
                | HandleKind::InterruptEvent
                | HandleKind::ServerSession => Ok(entry.object),
            HandleKind::WritableEvent | HandleKind::ClientSession => Err(SysErr::InvalidHandle),
        }
    }

    pub fn is_signaled(&self, id: ObjectId) -> bool {
        match self.object(id) {
            Some(KObject::Thread { exited, .. }) => *exited,
            Some(KObject::Event { signaled }) => *signaled,
            Some(KObject::InterruptEvent { signaled, .. }) => *signaled,
            Some(KObject::Session { pending, current, .. }) => !pending.is_empty() && current.is_none(),
            None => false,
        }
    }

    /// Returns every interrupt event object bound to interrupt `name`
    pub fn interrupt_events(&self, name: u32) -> Vec<ObjectId> {
        self.objects.iter()
            .filter(|(_, entry)| matches!(entry.object, KObject::InterruptEvent { name: n, .. } if n == name))
            .map(|(id, _)| *id)
            .collect()
    }
}

impl KernelState {
    /// Wakes every thread whose synchronization wait includes `object`, if `object` is signaled
    pub fn notify_object(&mut self, object: ObjectId) {
        if !self.objects.is_signaled(object) {
            return;
        }

        let woken: Vec<(ThreadId, usize)> = self.threads.iter()
            .filter_map(|(id, state)| match &state.wait {
                WaitKind::Synchronization(objects) => objects.iter()
                    .position(|waited| *waited == object)
                    .map(|index| (*id, index)),
                _ => None,
            })
            .collect();

        for (thread, index) in woken {
            self.wake(thread, WakeReason::Signaled(index));
        }
    }

    pub fn close_handle(&mut self, handle: Handle) -> KResult<()> {
        let (entry, destroyed) = self.objects.remove_handle(handle)?;
        log::trace!("closed handle {:?} ({:?})", handle, entry.kind);

        if entry.kind == HandleKind::ServerSession {
            self.close_server_session(entry.object, destroyed);
        }

        Ok(())
    }

    /// Fails every outstanding request on a session whose server side was closed
    fn close_server_session(&mut self, object: ObjectId, destroyed: Option<KObject>) {
        let clients: Vec<ThreadId> = match destroyed {
            Some(KObject::Session { pending, current, .. }) => pending.into_iter().chain(current).collect(),
            _ => match self.objects.object_mut(object) {
                Some(KObject::Session { pending, current, server_open }) => {
                    *server_open = false;
                    pending.drain(..).chain(current.take()).collect()
                },
                _ => Vec::new(),
            },
        };

        for client in clients {
            self.wake(client, WakeReason::Error(SysErr::SessionClosed));
        }
    }

    pub fn set_signaled(&mut self, object: ObjectId, value: bool) -> KResult<()> {
        match self.objects.object_mut(object) {
            Some(KObject::Event { signaled }) | Some(KObject::InterruptEvent { signaled, .. }) => {
                *signaled = value;
            },
            _ => return Err(SysErr::InvalidHandle),
        }

        if value {
            self.notify_object(object);
        }
        Ok(())
    }

    /// Blocks the current thread until one of `objects` is signaled
    ///
    /// Follows the kernel's order of checks: already signaled objects win, then a zero timeout fails,
    /// then a pending cancellation is consumed, and only then does the thread block
    pub fn wait_objects(
        kernel: &mut MutexGuard<'_, KernelState>,
        thread: &KThread,
        objects: Vec<ObjectId>,
        deadline: Option<Instant>,
        poll: bool,
    ) -> KResult<usize> {
        if let Some(index) = objects.iter().position(|object| kernel.objects.is_signaled(*object)) {
            return Ok(index);
        }

        if poll {
            return Err(SysErr::TimedOut);
        }

        let state = kernel.thread_mut(thread.id);
        if state.wait_cancelled {
            state.wait_cancelled = false;
            return Err(SysErr::Cancelled);
        }
        state.wait = WaitKind::Synchronization(objects);

        match sleep(kernel, thread, deadline) {
            Some(WakeReason::Signaled(index)) => Ok(index),
            Some(WakeReason::Cancelled) => Err(SysErr::Cancelled),
            Some(WakeReason::Error(error)) => Err(error),
            Some(WakeReason::Released) => Err(SysErr::InvalidState),
            None => Err(SysErr::TimedOut),
        }
    }

    /// Cancels the synchronization wait `thread` is in, or the next one it makes
    pub fn cancel_synchronization(&mut self, thread: ThreadId) {
        if matches!(self.thread(thread).wait, WaitKind::Synchronization(_)) {
            self.wake(thread, WakeReason::Cancelled);
        } else {
            self.thread_mut(thread).wait_cancelled = true;
        }
    }

    /// Removes the first pending request from a session and marks it as being handled
    pub fn receive_request(&mut self, object: ObjectId) -> bool {
        match self.objects.object_mut(object) {
            Some(KObject::Session { pending, current, .. }) if current.is_none() => {
                match pending.pop_front() {
                    Some(client) => {
                        *current = Some(client);
                        true
                    },
                    None => false,
                }
            },
            _ => false,
        }
    }

    /// Replies to the request currently being handled on a session
    pub fn reply(&mut self, object: ObjectId) -> KResult<()> {
        let client = match self.objects.object_mut(object) {
            Some(KObject::Session { current, .. }) => current.take().ok_or(SysErr::InvalidState)?,
            _ => return Err(SysErr::InvalidHandle),
        };

        self.wake(client, WakeReason::Released);
        // the next pending request may now be received
        self.notify_object(object);
        Ok(())
    }
}
