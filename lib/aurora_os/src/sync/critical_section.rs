use core::sync::atomic::{AtomicU32, Ordering};

use sys::{Handle, HANDLE_WAIT_MASK};

/// A blocking lock arbitrated by the kernel
///
/// The lock word holds the handle of the owning thread, with [`HANDLE_WAIT_MASK`] set
/// once another thread is blocked waiting for it. Uncontended locking and unlocking never enters the kernel.
/// The lock is not recursive, [`Mutex`](super::Mutex) builds recursion on top of it.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct InternalCriticalSection {
    word: AtomicU32,
}

impl InternalCriticalSection {
    pub const fn new() -> Self {
        InternalCriticalSection {
            word: AtomicU32::new(Handle::INVALID.as_raw()),
        }
    }

    /// Views an arbitrated lock word as a critical section
    pub(crate) fn from_word(word: &AtomicU32) -> &InternalCriticalSection {
        // safety: InternalCriticalSection is a transparent wrapper around AtomicU32
        unsafe { &*(word as *const AtomicU32 as *const InternalCriticalSection) }
    }

    pub(crate) fn word(&self) -> &AtomicU32 {
        &self.word
    }

    pub fn enter(&self) {
        debug_assert_eq!(
            sys::thread_local_region().disable_count(), 0,
            "blocking lock entered with preemption disabled",
        );

        let current = sys::get_current_thread_handle();

        let mut value = self.word.load(Ordering::Relaxed);
        loop {
            if value == Handle::INVALID.as_raw() {
                match self.word.compare_exchange_weak(value, current.as_raw(), Ordering::Acquire, Ordering::Relaxed) {
                    Ok(_) => return,
                    Err(new_value) => {
                        value = new_value;
                        continue;
                    },
                }
            }

            if value & HANDLE_WAIT_MASK == 0 {
                if let Err(new_value) = self.word.compare_exchange_weak(
                    value,
                    value | HANDLE_WAIT_MASK,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    value = new_value;
                    continue;
                }
            }

            let owner = Handle::from_raw(value & !HANDLE_WAIT_MASK);
            if let Err(error) = sys::arbitrate_lock(owner, &self.word, current) {
                panic!("failed to arbitrate lock: {error}");
            }

            value = self.word.load(Ordering::Acquire);
            if value & !HANDLE_WAIT_MASK == current.as_raw() {
                return;
            }
        }
    }

    pub fn try_enter(&self) -> bool {
        let current = sys::get_current_thread_handle();

        self.word
            .compare_exchange(Handle::INVALID.as_raw(), current.as_raw(), Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// # Panics
    ///
    /// panics if the current thread does not hold the lock
    pub fn leave(&self) {
        let current = sys::get_current_thread_handle();

        let value = self.word.load(Ordering::Relaxed);
        assert_eq!(
            value & !HANDLE_WAIT_MASK, current.as_raw(),
            "critical section left by a thread which does not hold it",
        );

        // other threads can only set the wait bit while we hold the lock, so a failed exchange means it is set
        if self.word.compare_exchange(current.as_raw(), Handle::INVALID.as_raw(), Ordering::Release, Ordering::Relaxed).is_err() {
            if let Err(error) = sys::arbitrate_unlock(&self.word) {
                panic!("failed to arbitrate unlock: {error}");
            }
        }
    }

    pub fn is_locked_by_current_thread(&self) -> bool {
        let current = sys::get_current_thread_handle();
        self.word.load(Ordering::Relaxed) & !HANDLE_WAIT_MASK == current.as_raw()
    }
}
