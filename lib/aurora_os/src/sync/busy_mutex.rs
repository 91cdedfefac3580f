use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};

use sys::ThreadLocalRegion;

/// Increments the current thread's disable count so the kernel defers preempting it
pub(super) fn disable_preemption() -> &'static ThreadLocalRegion {
    let tlr = sys::thread_local_region();
    tlr.disable_count.fetch_add(1, Ordering::Relaxed);
    tlr
}

/// Undoes [`disable_preemption`], performing any preemption that was deferred
/// once the disable count drops back to zero
pub(super) fn enable_preemption(tlr: &ThreadLocalRegion) {
    let old_count = tlr.disable_count.fetch_sub(1, Ordering::Relaxed);
    assert!(old_count > 0, "preemption disable count underflowed");

    if old_count == 1 && tlr.interrupt_flag() {
        sys::synchronize_preemption_state();
    }
}

/// A spinlock which never blocks in the kernel
///
/// The current thread's preemption is deferred while the lock is held,
/// so critical sections must be short and must not block.
#[derive(Debug, Default)]
pub struct InternalBusyMutex {
    value: AtomicU32,
}

impl InternalBusyMutex {
    pub const fn new() -> Self {
        InternalBusyMutex {
            value: AtomicU32::new(0),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.value.load(Ordering::Relaxed) != 0
    }

    pub fn lock(&self) {
        loop {
            let tlr = disable_preemption();
            if self.value.compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed).is_ok() {
                return;
            }
            enable_preemption(tlr);

            while self.is_locked() {
                spin_loop();
            }
        }
    }

    pub fn try_lock(&self) -> bool {
        let tlr = disable_preemption();
        if self.value.compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed).is_ok() {
            true
        } else {
            enable_preemption(tlr);
            false
        }
    }

    /// Must only be called by the thread which locked the mutex
    pub fn unlock(&self) {
        assert!(self.is_locked(), "unlocked a busy mutex which was not locked");

        self.value.store(0, Ordering::Release);
        enable_preemption(sys::thread_local_region());
    }
}

/// A [`InternalBusyMutex`] protecting `T`
#[derive(Debug, Default)]
pub struct BusyMutex<T: ?Sized> {
    lock: InternalBusyMutex,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for BusyMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for BusyMutex<T> {}

impl<T> BusyMutex<T> {
    pub const fn new(data: T) -> Self {
        BusyMutex {
            lock: InternalBusyMutex::new(),
            data: UnsafeCell::new(data),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> BusyMutex<T> {
    pub fn lock(&self) -> BusyMutexGuard<'_, T> {
        self.lock.lock();
        BusyMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock(&self) -> Option<BusyMutexGuard<'_, T>> {
        if self.lock.try_lock() {
            Some(BusyMutexGuard {
                mutex: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

/// The disable count belongs to the locking thread, so the guard can't leave it
#[derive(Debug)]
pub struct BusyMutexGuard<'a, T: ?Sized> {
    mutex: &'a BusyMutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> Deref for BusyMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // safety: the guard holds the lock
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for BusyMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // safety: the guard holds the lock
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for BusyMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.lock.unlock();
    }
}
