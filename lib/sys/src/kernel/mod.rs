//! In process emulation of the kernel side of the syscalls
//!
//! All kernel state lives behind one lock, every thread which blocks in a syscall sleeps on its own condvar
//! paired with that lock, and whichever syscall makes the thread runnable again stores a [`WakeReason`] for it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lazy_static::lazy_static;
use parking_lot::{Mutex, MutexGuard};
use rand_core::{OsRng, RngCore};
use rustc_hash::FxHashMap;

use crate::{KResult, SysErr};

mod arbiter;
pub(crate) use arbiter::*;
mod memory;
pub(crate) use memory::*;
mod object;
pub(crate) use object::*;
mod thread;
pub(crate) use thread::*;

pub(crate) type ThreadId = u64;

/// Why a blocked thread was made runnable again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WakeReason {
    /// The object at this index of the thread's wait list was signaled
    Signaled(usize),
    /// Woken by lock hand off, condition variable signal, address signal or an ipc reply
    Released,
    Cancelled,
    Error(SysErr),
}

/// What a blocked thread is waiting on
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) enum WaitKind {
    #[default]
    None,
    /// Waiting for any of these objects to become signaled, this wait can be cancelled
    Synchronization(Vec<ObjectId>),
    /// Waiting in one of the arbiter queues
    Arbitration,
    /// Waiting for a server to reply to a request
    Ipc,
}

#[derive(Debug)]
pub(crate) struct ThreadState {
    pub thread: Arc<KThread>,
    pub wake: Option<WakeReason>,
    pub wait: WaitKind,
    /// Set when the thread is cancelled while it is not in a cancellable wait,
    /// the next synchronization wait consumes it and fails with [`SysErr::Cancelled`]
    pub wait_cancelled: bool,
}

pub(crate) struct KernelState {
    pub threads: FxHashMap<ThreadId, ThreadState>,
    pub objects: ObjectTable,
    pub arbiter: Arbiter,
    pub memory: VirtualMemory,
    next_thread_id: ThreadId,
}

impl KernelState {
    fn new() -> Self {
        KernelState {
            threads: FxHashMap::default(),
            objects: ObjectTable::new(),
            arbiter: Arbiter::new(),
            memory: VirtualMemory::new(),
            next_thread_id: 1,
        }
    }

    pub fn thread(&self, thread: ThreadId) -> &ThreadState {
        // panic safety: a thread's state exists from registration until it exits,
        // and only a running thread makes syscalls
        self.threads.get(&thread).expect("kernel thread state missing")
    }

    pub fn thread_mut(&mut self, thread: ThreadId) -> &mut ThreadState {
        self.threads.get_mut(&thread).expect("kernel thread state missing")
    }

    pub fn alloc_thread_id(&mut self) -> ThreadId {
        let id = self.next_thread_id;
        self.next_thread_id += 1;
        id
    }

    /// Makes `thread` runnable with `reason`, does nothing if the thread has already exited
    pub fn wake(&mut self, thread: ThreadId, reason: WakeReason) {
        if let Some(state) = self.threads.get_mut(&thread) {
            state.wake = Some(reason);
            state.wait = WaitKind::None;
            state.thread.wake_cond.notify_one();
        }
    }
}

pub(crate) struct Kernel {
    state: Mutex<KernelState>,
    boot_time: Instant,
    entropy: [u64; 4],
}

impl Kernel {
    fn new() -> Self {
        let mut entropy = [0; 4];
        for word in entropy.iter_mut() {
            *word = OsRng.next_u64();
        }

        Kernel {
            state: Mutex::new(KernelState::new()),
            boot_time: Instant::now(),
            entropy,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, KernelState> {
        self.state.lock()
    }

    pub fn uptime(&self) -> Duration {
        self.boot_time.elapsed()
    }

    pub fn entropy(&self, index: usize) -> KResult<u64> {
        self.entropy.get(index).copied().ok_or(SysErr::OutOfRange)
    }
}

lazy_static! {
    pub(crate) static ref KERNEL: Kernel = Kernel::new();
}

/// Converts a syscall timeout in nanoseconds to a deadline
///
/// Negative timeouts wait forever, as do timeouts too large to represent
pub(crate) fn deadline(timeout_nsec: i64) -> Option<Instant> {
    if timeout_nsec < 0 {
        None
    } else {
        Instant::now().checked_add(Duration::from_nanos(timeout_nsec as u64))
    }
}

/// Blocks the calling thread until another thread wakes it or `deadline` passes
///
/// The kernel lock is released while sleeping and held again on return.
/// Returns `None` if the deadline passed without a wakeup, in which case the caller
/// must remove the thread from whatever queue it put it in.
pub(crate) fn sleep(
    kernel: &mut MutexGuard<'_, KernelState>,
    thread: &KThread,
    deadline: Option<Instant>,
) -> Option<WakeReason> {
    loop {
        if let Some(reason) = kernel.thread_mut(thread.id).wake.take() {
            return Some(reason);
        }

        match deadline {
            Some(deadline) => {
                if thread.wake_cond.wait_until(kernel, deadline).timed_out() {
                    let state = kernel.thread_mut(thread.id);
                    let reason = state.wake.take();
                    if reason.is_none() {
                        state.wait = WaitKind::None;
                    }
                    return reason;
                }
            },
            None => thread.wake_cond.wait(kernel),
        }
    }
}
