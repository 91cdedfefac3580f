use std::cell::OnceCell;
use std::sync::Arc;

use parking_lot::Condvar;

use crate::{Handle, KResult, SysErr, ThreadLocalRegion};
use super::{KERNEL, KernelState, ObjectId, ThreadId, ThreadState, WaitKind, KObject, HandleKind};

/// A thread known to the emulated kernel
#[derive(Debug)]
pub(crate) struct KThread {
    pub id: ThreadId,
    /// The handle the thread uses to refer to itself
    pub handle: Handle,
    pub object: ObjectId,
    pub wake_cond: Condvar,
    pub tlr: ThreadLocalRegion,
}

/// Keeps a thread registered with the kernel for as long as the os thread is alive
struct ThreadRegistration(Arc<KThread>);

impl Drop for ThreadRegistration {
    fn drop(&mut self) {
        KERNEL.lock().exit_thread(&self.0);
    }
}

thread_local! {
    static CURRENT_THREAD: OnceCell<ThreadRegistration> = const { OnceCell::new() };
}

/// Returns the calling thread, registering it with the kernel the first time it makes a syscall
pub(crate) fn current_thread() -> Arc<KThread> {
    CURRENT_THREAD.with(|current| {
        current.get_or_init(|| ThreadRegistration(KERNEL.lock().register_thread()))
            .0
            .clone()
    })
}

/// Returns the thread local region of the calling thread
pub(crate) fn current_thread_local_region() -> &'static ThreadLocalRegion {
    CURRENT_THREAD.with(|current| {
        let registration = current.get_or_init(|| ThreadRegistration(KERNEL.lock().register_thread()));
        let tlr: *const ThreadLocalRegion = &registration.0.tlr;
        // safety: the registration lives until the thread exits, and the region is only handed out to that thread
        unsafe { &*tlr }
    })
}

/// Spawns an os thread which is registered with the kernel before it starts running
///
/// Returns a new handle to the thread, the handle becomes signaled when the thread exits
pub(crate) fn spawn_thread<F: FnOnce() + Send + 'static>(f: F) -> KResult<Handle> {
    let (thread, handle) = {
        let mut kernel = KERNEL.lock();
        let thread = kernel.register_thread();
        let handle = match kernel.objects.create_handle(thread.object, HandleKind::Thread) {
            Ok(handle) => handle,
            Err(error) => {
                kernel.exit_thread(&thread);
                return Err(error);
            },
        };
        (thread, handle)
    };

    let registration = ThreadRegistration(thread.clone());
    let spawn_result = std::thread::Builder::new()
        .name(format!("kthread-{}", thread.id))
        .spawn(move || {
            CURRENT_THREAD.with(|current| {
                if current.set(registration).is_err() {
                    unreachable!("fresh thread was already registered");
                }
            });
            f();
        });

    match spawn_result {
        Ok(_) => Ok(handle),
        Err(error) => {
            // the registration was dropped with the closure, which already exited the thread
            log::warn!("failed to spawn os thread: {error}");
            let _ = KERNEL.lock().close_handle(handle);
            Err(SysErr::OutOfResource)
        },
    }
}

impl KernelState {
    pub fn register_thread(&mut self) -> Arc<KThread> {
        let id = self.alloc_thread_id();
        let object = self.objects.insert(KObject::Thread { thread: id, exited: false });
        // panic safety: running out of handles while creating a thread leaves no way to report it
        let handle = self.objects.create_handle(object, HandleKind::Thread)
            .expect("out of handles while registering thread");

        let thread = Arc::new(KThread {
            id,
            handle,
            object,
            wake_cond: Condvar::new(),
            tlr: ThreadLocalRegion::new(),
        });

        self.threads.insert(id, ThreadState {
            thread: thread.clone(),
            wake: None,
            wait: WaitKind::None,
            wait_cancelled: false,
        });

        log::trace!("registered thread {} with handle {:?}", id, handle);
        thread
    }

    pub fn exit_thread(&mut self, thread: &KThread) {
        self.arbiter.remove_thread(thread.id);
        self.threads.remove(&thread.id);

        if let Some(KObject::Thread { exited, .. }) = self.objects.object_mut(thread.object) {
            *exited = true;
        }
        self.notify_object(thread.object);

        if self.close_handle(thread.handle).is_err() {
            log::warn!("thread {} exited without its own handle", thread.id);
        }

        log::trace!("thread {} exited", thread.id);
    }

    /// Looks up the kernel thread referred to by `handle`
    pub fn thread_by_handle(&self, handle: Handle) -> KResult<Option<ThreadId>> {
        let entry = self.objects.get_handle(handle)?;
        match self.objects.object(entry.object) {
            Some(KObject::Thread { thread, exited }) => Ok(if *exited { None } else { Some(*thread) }),
            _ => Err(SysErr::InvalidHandle),
        }
    }
}
