use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::MUTEX_RECURSIVE_LOCK_COUNT_MAX;
use super::InternalCriticalSection;

/// A kernel arbitrated mutex without any data, optionally recursive
///
/// The nest count is only touched by the thread holding the critical section,
/// it is atomic so the mutex can be shared between threads.
#[derive(Debug)]
pub struct RawMutex {
    cs: InternalCriticalSection,
    recursive: bool,
    nest_count: AtomicU32,
}

impl RawMutex {
    pub const fn new(recursive: bool) -> Self {
        RawMutex {
            cs: InternalCriticalSection::new(),
            recursive,
            nest_count: AtomicU32::new(0),
        }
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Returns true if the current thread relocked the mutex it already holds
    fn try_relock(&self) -> bool {
        if !self.cs.is_locked_by_current_thread() {
            return false;
        }

        assert!(self.recursive, "non recursive mutex locked again by the thread holding it");

        let nest_count = self.nest_count.load(Ordering::Relaxed);
        assert!(nest_count < MUTEX_RECURSIVE_LOCK_COUNT_MAX, "mutex recursion limit exceeded");
        self.nest_count.store(nest_count + 1, Ordering::Relaxed);
        true
    }

    pub fn lock(&self) {
        if self.try_relock() {
            return;
        }

        self.cs.enter();
        self.nest_count.store(1, Ordering::Relaxed);
    }

    pub fn try_lock(&self) -> bool {
        if self.try_relock() {
            return true;
        }

        if self.cs.try_enter() {
            self.nest_count.store(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// # Panics
    ///
    /// panics if the current thread does not hold the mutex
    pub fn unlock(&self) {
        assert!(self.cs.is_locked_by_current_thread(), "mutex unlocked by a thread which does not hold it");

        let nest_count = self.nest_count.load(Ordering::Relaxed) - 1;
        self.nest_count.store(nest_count, Ordering::Relaxed);
        if nest_count == 0 {
            self.cs.leave();
        }
    }

    pub fn is_locked_by_current_thread(&self) -> bool {
        self.cs.is_locked_by_current_thread()
    }

    pub(super) fn critical_section(&self) -> &InternalCriticalSection {
        &self.cs
    }

    /// Marks the mutex as released before a condition variable wait gives up the critical section
    ///
    /// Returns the nest count to hand to [`RawMutex::end_condition_wait`]
    pub(super) fn begin_condition_wait(&self) -> u32 {
        assert!(self.cs.is_locked_by_current_thread(), "condition variable waited on without holding the mutex");

        let nest_count = self.nest_count.swap(0, Ordering::Relaxed);
        assert_eq!(nest_count, 1, "condition variable waited on with a recursively locked mutex");
        nest_count
    }

    pub(super) fn end_condition_wait(&self, nest_count: u32) {
        debug_assert!(self.cs.is_locked_by_current_thread());
        self.nest_count.store(nest_count, Ordering::Relaxed);
    }
}

/// A non recursive kernel arbitrated mutex protecting `T`
///
/// Locking it again from the thread which holds it panics instead of deadlocking.
#[derive(Debug)]
pub struct Mutex<T: ?Sized> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(data: T) -> Self {
        Mutex {
            raw: RawMutex::new(false),
            data: UnsafeCell::new(data),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw.lock();
        MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.raw.try_lock() {
            Some(MutexGuard {
                mutex: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }

    pub fn is_locked_by_current_thread(&self) -> bool {
        self.raw.is_locked_by_current_thread()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Mutex::new(T::default())
    }
}

/// Lock words hold the locking thread's handle, so the guard must stay on that thread
#[derive(Debug)]
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    pub(super) fn raw(&self) -> &'a RawMutex {
        &self.mutex.raw
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // safety: the guard holds the lock
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // safety: the guard holds the lock
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.raw.unlock();
    }
}

/// A recursive kernel arbitrated mutex protecting `T`
///
/// The holding thread may lock it again, so guards only give shared access to the data.
#[derive(Debug)]
pub struct RecursiveMutex<T: ?Sized> {
    raw: RawMutex,
    data: T,
}

unsafe impl<T: ?Sized + Send> Send for RecursiveMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for RecursiveMutex<T> {}

impl<T> RecursiveMutex<T> {
    pub const fn new(data: T) -> Self {
        RecursiveMutex {
            raw: RawMutex::new(true),
            data,
        }
    }

    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T: ?Sized> RecursiveMutex<T> {
    pub fn lock(&self) -> RecursiveMutexGuard<'_, T> {
        self.raw.lock();
        RecursiveMutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock(&self) -> Option<RecursiveMutexGuard<'_, T>> {
        if self.raw.try_lock() {
            Some(RecursiveMutexGuard {
                mutex: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }

    pub fn is_locked_by_current_thread(&self) -> bool {
        self.raw.is_locked_by_current_thread()
    }
}

#[derive(Debug)]
pub struct RecursiveMutexGuard<'a, T: ?Sized> {
    mutex: &'a RecursiveMutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> Deref for RecursiveMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.mutex.data
    }
}

impl<T: ?Sized> Drop for RecursiveMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.raw.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recursive_nesting() {
        let mutex = RecursiveMutex::new(());

        let a = mutex.lock();
        let b = mutex.lock();
        assert!(mutex.try_lock().is_some());
        drop(a);
        assert!(mutex.is_locked_by_current_thread());
        drop(b);
        assert!(!mutex.is_locked_by_current_thread());
    }

    #[test]
    #[should_panic(expected = "non recursive mutex locked again")]
    fn non_recursive_relock_panics() {
        let mutex = Mutex::new(0);
        let _a = mutex.lock();
        let _b = mutex.lock();
    }

    #[test]
    #[should_panic(expected = "does not hold it")]
    fn unlock_without_holding_panics() {
        let mutex = RawMutex::new(false);
        mutex.unlock();
    }
}
