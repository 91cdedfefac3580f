use core::marker::PhantomData;
use core::ops::Range;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use bit_utils::{get_bits, set_bits};
use sys::{Handle, HANDLE_WAIT_MASK};

use crate::config::{MUTEX_RECURSIVE_LOCK_COUNT_MAX, READER_WRITER_LOCK_COUNT_MAX, READER_WRITER_LOCK_WAITER_COUNT_MAX};
use super::{InternalConditionVariable, InternalCriticalSection};

/// Snapshot of the packed lock word of a [`ReaderWriterLock`]
///
/// The low half is an arbitrated critical section word, the high half holds the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LockCount(u64);

impl LockCount {
    const HANDLE_BITS: Range<usize> = 0..32;
    const READ_LOCK_COUNT_BITS: Range<usize> = 32..47;
    const WRITE_LOCKED_BITS: Range<usize> = 47..48;
    const READ_WAITER_COUNT_BITS: Range<usize> = 48..56;
    const WRITE_WAITER_COUNT_BITS: Range<usize> = 56..64;

    fn get(&self, bits: Range<usize>) -> u64 {
        get_bits(self.0 as usize, bits) as u64
    }

    fn set(&mut self, bits: Range<usize>, value: u64) {
        self.0 = set_bits(self.0 as usize, bits, value as usize) as u64;
    }

    fn handle(&self) -> u32 {
        self.get(Self::HANDLE_BITS) as u32
    }

    fn set_handle(&mut self, handle: u32) {
        self.set(Self::HANDLE_BITS, handle as u64);
    }

    /// Gives up the critical section in the low half, leaving the wait bit for
    /// [`sys::arbitrate_unlock`] to hand the section over if it is set
    fn release_handle(&mut self) {
        if self.handle() & HANDLE_WAIT_MASK == 0 {
            self.set_handle(Handle::INVALID.as_raw());
        }
    }

    fn read_lock_count(&self) -> u64 {
        self.get(Self::READ_LOCK_COUNT_BITS)
    }

    fn inc_read_lock_count(&mut self) {
        let count = self.read_lock_count();
        assert!(count < READER_WRITER_LOCK_COUNT_MAX, "reader writer lock read count overflowed");
        self.set(Self::READ_LOCK_COUNT_BITS, count + 1);
    }

    fn dec_read_lock_count(&mut self) {
        let count = self.read_lock_count();
        assert!(count > 0, "read lock released on a reader writer lock with no readers");
        self.set(Self::READ_LOCK_COUNT_BITS, count - 1);
    }

    fn write_locked(&self) -> bool {
        self.get(Self::WRITE_LOCKED_BITS) != 0
    }

    fn set_write_locked(&mut self, write_locked: bool) {
        self.set(Self::WRITE_LOCKED_BITS, write_locked as u64);
    }

    fn read_waiter_count(&self) -> u64 {
        self.get(Self::READ_WAITER_COUNT_BITS)
    }

    fn inc_read_waiter_count(&mut self) {
        let count = self.read_waiter_count();
        assert!(count < READER_WRITER_LOCK_WAITER_COUNT_MAX, "too many readers waiting on reader writer lock");
        self.set(Self::READ_WAITER_COUNT_BITS, count + 1);
    }

    fn dec_read_waiter_count(&mut self) {
        let count = self.read_waiter_count();
        assert!(count > 0);
        self.set(Self::READ_WAITER_COUNT_BITS, count - 1);
    }

    fn write_waiter_count(&self) -> u64 {
        self.get(Self::WRITE_WAITER_COUNT_BITS)
    }

    fn inc_write_waiter_count(&mut self) {
        let count = self.write_waiter_count();
        assert!(count < READER_WRITER_LOCK_WAITER_COUNT_MAX, "too many writers waiting on reader writer lock");
        self.set(Self::WRITE_WAITER_COUNT_BITS, count + 1);
    }

    fn dec_write_waiter_count(&mut self) {
        let count = self.write_waiter_count();
        assert!(count > 0);
        self.set(Self::WRITE_WAITER_COUNT_BITS, count - 1);
    }
}

fn same_thread(handle: u32, current: Handle) -> bool {
    handle | HANDLE_WAIT_MASK == current.as_raw() | HANDLE_WAIT_MASK
}

/// A reader writer lock which prefers writers
///
/// Once a writer is waiting no new readers get the lock. The thread holding the write lock
/// may lock it for writing again, and may take read locks without giving up the write lock,
/// the lock is released once every one of those is released.
///
/// Blocking is done with the critical section stored in the low half of the lock word:
/// a thread which has to wait takes the critical section and waits on one of the condition variables,
/// and the writer keeps the critical section for as long as it holds the write lock.
#[derive(Debug, Default)]
pub struct ReaderWriterLock {
    lock_count: AtomicU64,
    /// Nest count of the write lock, only touched by the writer
    write_lock_count: AtomicU32,
    /// Raw handle of the thread holding the write lock
    owner: AtomicU32,
    cv_read: InternalConditionVariable,
    cv_write: InternalConditionVariable,
}

impl ReaderWriterLock {
    pub const fn new() -> Self {
        ReaderWriterLock {
            lock_count: AtomicU64::new(0),
            write_lock_count: AtomicU32::new(0),
            owner: AtomicU32::new(Handle::INVALID.as_raw()),
            cv_read: InternalConditionVariable::new(),
            cv_write: InternalConditionVariable::new(),
        }
    }

    fn load(&self) -> LockCount {
        LockCount(self.lock_count.load(Ordering::Relaxed))
    }

    fn compare_exchange(&self, expected: LockCount, new: LockCount, success: Ordering) -> Result<LockCount, LockCount> {
        self.lock_count
            .compare_exchange_weak(expected.0, new.0, success, Ordering::Relaxed)
            .map(LockCount)
            .map_err(LockCount)
    }

    /// The critical section word the kernel arbitrates, which is the low half of the lock word
    fn handle_word(&self) -> &AtomicU32 {
        let words = self.lock_count.as_ptr() as *const AtomicU32;
        let index = if cfg!(target_endian = "little") { 0 } else { 1 };
        // safety: the lock word is 8 byte aligned and lives as long as self, so both halves are valid 4 byte aligned words
        unsafe { &*words.add(index) }
    }

    fn critical_section(&self) -> &InternalCriticalSection {
        InternalCriticalSection::from_word(self.handle_word())
    }

    fn arbitrate_lock(&self, owner: u32, current: Handle) {
        let owner = Handle::from_raw(owner & !HANDLE_WAIT_MASK);
        if let Err(error) = sys::arbitrate_lock(owner, self.handle_word(), current) {
            panic!("failed to arbitrate reader writer lock: {error}");
        }
    }

    fn arbitrate_unlock(&self) {
        if let Err(error) = sys::arbitrate_unlock(self.handle_word()) {
            panic!("failed to arbitrate unlock reader writer lock: {error}");
        }
    }

    fn is_owned_by(&self, thread: Handle) -> bool {
        self.owner.load(Ordering::Relaxed) == thread.as_raw()
    }

    /// Takes the critical section in the low half of the lock word without touching the counters
    fn enter_critical_section(&self, current: Handle) {
        let mut expected = self.load();
        loop {
            let mut lock_count = expected;
            let handle = lock_count.handle();
            lock_count.set_handle(if handle != 0 {
                handle | HANDLE_WAIT_MASK
            } else {
                current.as_raw()
            });

            match self.compare_exchange(expected, lock_count, Ordering::Acquire) {
                Ok(_) if handle == 0 => return,
                Ok(_) => {
                    self.arbitrate_lock(handle, current);
                    expected = self.load();
                    if same_thread(expected.handle(), current) {
                        return;
                    }
                },
                Err(actual) => expected = actual,
            }
        }
    }

    /// Gives up the critical section, handing it to a waiting thread if there is one
    fn leave_critical_section(&self) {
        let mut expected = self.load();
        let lock_count = loop {
            let mut lock_count = expected;
            lock_count.release_handle();

            match self.compare_exchange(expected, lock_count, Ordering::Release) {
                Ok(_) => break lock_count,
                Err(actual) => expected = actual,
            }
        };

        if lock_count.handle() & HANDLE_WAIT_MASK != 0 {
            self.arbitrate_unlock();
        }
    }

    fn acquire_read_lock_write_locked(&self, current: Handle) {
        let mut expected = self.load();
        assert!(expected.write_locked() && same_thread(expected.handle(), current));

        loop {
            let mut lock_count = expected;
            lock_count.inc_read_lock_count();
            match self.compare_exchange(expected, lock_count, Ordering::Relaxed) {
                Ok(_) => return,
                Err(actual) => expected = actual,
            }
        }
    }

    fn release_read_lock_write_locked(&self, current: Handle) {
        let mut expected = self.load();
        assert!(
            expected.write_locked() && same_thread(expected.handle(), current),
            "write lock owner does not hold the critical section",
        );

        loop {
            let mut lock_count = expected;
            lock_count.dec_read_lock_count();
            match self.compare_exchange(expected, lock_count, Ordering::Relaxed) {
                Ok(_) => break,
                Err(actual) => expected = actual,
            }
        }

        self.release_write_lock_impl();
    }

    /// Fully unlocks the write locked lock once no nested read or write locks are left
    fn release_write_lock_impl(&self) {
        let lock_count = self.load();
        assert!(lock_count.write_locked(), "reader writer lock is not write locked");

        if lock_count.read_lock_count() != 0 || self.write_lock_count.load(Ordering::Relaxed) != 0 {
            return;
        }

        self.owner.store(Handle::INVALID.as_raw(), Ordering::Relaxed);

        // woken threads queue for the critical section, which is handed to them below
        if lock_count.write_waiter_count() > 0 {
            self.cv_write.signal();
        } else if lock_count.read_waiter_count() > 0 {
            self.cv_read.broadcast();
        }

        let mut expected = self.load();
        let lock_count = loop {
            let mut lock_count = expected;
            lock_count.set_write_locked(false);
            lock_count.release_handle();

            match self.compare_exchange(expected, lock_count, Ordering::Release) {
                Ok(_) => break lock_count,
                Err(actual) => expected = actual,
            }
        };

        if lock_count.handle() != 0 {
            self.arbitrate_unlock();
        }
    }

    pub fn acquire_read_lock(&self) {
        let current = sys::get_current_thread_handle();
        if self.is_owned_by(current) {
            return self.acquire_read_lock_write_locked(current);
        }

        let mut arbitrated = false;
        let mut lock_count;
        let got_read_lock = loop {
            let mut expected = self.load();
            let (got_lock, needs_arbitrate_lock) = loop {
                lock_count = expected;
                debug_assert!(!lock_count.write_locked() || lock_count.handle() != 0);

                let result = if lock_count.write_locked() || lock_count.write_waiter_count() != 0 {
                    if !arbitrated {
                        lock_count.inc_read_waiter_count();
                    }

                    let handle = lock_count.handle();
                    let needs_arbitrate = handle != 0;
                    lock_count.set_handle(if needs_arbitrate {
                        handle | HANDLE_WAIT_MASK
                    } else {
                        current.as_raw()
                    });
                    (false, needs_arbitrate)
                } else {
                    if arbitrated {
                        lock_count.dec_read_waiter_count();
                    }
                    lock_count.inc_read_lock_count();
                    (true, false)
                };

                match self.compare_exchange(expected, lock_count, Ordering::Acquire) {
                    Ok(_) => break result,
                    Err(actual) => expected = actual,
                }
            };

            if !needs_arbitrate_lock {
                break got_lock;
            }

            self.arbitrate_lock(lock_count.handle(), current);
            lock_count = self.load();
            if same_thread(lock_count.handle(), current) {
                break false;
            }

            arbitrated = true;
        };

        if got_read_lock {
            return;
        }

        // holding the critical section, wait for the writers to finish
        let mut expected = lock_count;
        loop {
            while lock_count.write_waiter_count() != 0 {
                self.cv_read.wait(self.critical_section());
                expected = self.load();
                lock_count = expected;
            }

            lock_count.dec_read_waiter_count();
            lock_count.inc_read_lock_count();
            lock_count.release_handle();

            match self.compare_exchange(expected, lock_count, Ordering::Release) {
                Ok(_) => break,
                Err(actual) => {
                    expected = actual;
                    lock_count = actual;
                },
            }
        }

        if lock_count.handle() & HANDLE_WAIT_MASK != 0 {
            self.arbitrate_unlock();
        }
    }

    pub fn try_acquire_read_lock(&self) -> bool {
        let current = sys::get_current_thread_handle();
        if self.is_owned_by(current) {
            self.acquire_read_lock_write_locked(current);
            return true;
        }

        let mut expected = self.load();
        loop {
            let mut lock_count = expected;
            if lock_count.write_locked() || lock_count.write_waiter_count() != 0 {
                return false;
            }

            lock_count.inc_read_lock_count();
            match self.compare_exchange(expected, lock_count, Ordering::Acquire) {
                Ok(_) => return true,
                Err(actual) => expected = actual,
            }
        }
    }

    /// # Panics
    ///
    /// panics if the lock is not read locked
    pub fn release_read_lock(&self) {
        assert!(self.load().read_lock_count() > 0, "read lock released on a reader writer lock with no readers");

        let current = sys::get_current_thread_handle();
        if self.is_owned_by(current) {
            return self.release_read_lock_write_locked(current);
        }

        let mut expected = self.load();
        loop {
            let mut lock_count = expected;
            lock_count.dec_read_lock_count();

            // the last reader hands the lock to a waiting writer
            if lock_count.read_lock_count() == 0 && lock_count.write_waiter_count() != 0 {
                break;
            }

            match self.compare_exchange(expected, lock_count, Ordering::Release) {
                Ok(_) => return,
                Err(actual) => expected = actual,
            }
        }

        debug_assert!(!expected.write_locked());

        self.enter_critical_section(current);

        let mut expected = self.load();
        loop {
            let mut lock_count = expected;
            debug_assert!(lock_count.read_lock_count() == 1 && lock_count.write_waiter_count() > 0);
            lock_count.dec_read_lock_count();

            match self.compare_exchange(expected, lock_count, Ordering::Relaxed) {
                Ok(_) => break,
                Err(actual) => expected = actual,
            }
        }

        self.cv_write.signal();
        self.leave_critical_section();
    }

    pub fn acquire_write_lock(&self) {
        let current = sys::get_current_thread_handle();
        if self.is_owned_by(current) {
            debug_assert!(self.load().write_locked() && same_thread(self.load().handle(), current));
            return self.inc_write_lock_count();
        }

        let mut arbitrated = false;
        loop {
            let mut expected = self.load();
            let mut lock_count;
            let (got_write_lock, needs_arbitrate_lock) = loop {
                lock_count = expected;
                debug_assert!(!lock_count.write_locked() || lock_count.handle() != 0);

                let result = if lock_count.read_lock_count() > 0 || lock_count.handle() != 0 {
                    if !arbitrated {
                        lock_count.inc_write_waiter_count();
                    }

                    let handle = lock_count.handle();
                    let needs_arbitrate = handle != 0;
                    lock_count.set_handle(if needs_arbitrate {
                        handle | HANDLE_WAIT_MASK
                    } else {
                        current.as_raw()
                    });
                    (false, needs_arbitrate)
                } else {
                    if arbitrated {
                        lock_count.dec_write_waiter_count();
                    }
                    // the writer holds the critical section for as long as it is write locked
                    lock_count.set_write_locked(true);
                    lock_count.set_handle(current.as_raw());
                    (true, false)
                };

                match self.compare_exchange(expected, lock_count, Ordering::Acquire) {
                    Ok(_) => break result,
                    Err(actual) => expected = actual,
                }
            };

            if got_write_lock {
                break;
            }

            let mut expected = lock_count;
            if needs_arbitrate_lock {
                self.arbitrate_lock(lock_count.handle(), current);
                arbitrated = true;

                expected = self.load();
                if !same_thread(expected.handle(), current) {
                    continue;
                }
            }

            // holding the critical section, wait for the readers to leave
            loop {
                let mut lock_count = expected;
                while lock_count.read_lock_count() > 0 {
                    self.cv_write.wait(self.critical_section());
                    expected = self.load();
                    lock_count = expected;
                }
                debug_assert!(!lock_count.write_locked());

                lock_count.dec_write_waiter_count();
                lock_count.set_write_locked(true);

                match self.compare_exchange(expected, lock_count, Ordering::Acquire) {
                    Ok(_) => break,
                    Err(actual) => expected = actual,
                }
            }

            break;
        }

        assert_eq!(self.write_lock_count.load(Ordering::Relaxed), 0);
        self.write_lock_count.store(1, Ordering::Relaxed);
        self.owner.store(current.as_raw(), Ordering::Relaxed);
    }

    pub fn try_acquire_write_lock(&self) -> bool {
        let current = sys::get_current_thread_handle();
        if self.is_owned_by(current) {
            self.inc_write_lock_count();
            return true;
        }

        let mut expected = self.load();
        loop {
            let mut lock_count = expected;
            if lock_count.read_lock_count() > 0 || lock_count.handle() != 0 {
                return false;
            }

            lock_count.set_write_locked(true);
            lock_count.set_handle(current.as_raw());

            match self.compare_exchange(expected, lock_count, Ordering::Acquire) {
                Ok(_) => break,
                Err(actual) => expected = actual,
            }
        }

        assert_eq!(self.write_lock_count.load(Ordering::Relaxed), 0);
        self.write_lock_count.store(1, Ordering::Relaxed);
        self.owner.store(current.as_raw(), Ordering::Relaxed);
        true
    }

    fn inc_write_lock_count(&self) {
        let count = self.write_lock_count.load(Ordering::Relaxed);
        assert!(count < MUTEX_RECURSIVE_LOCK_COUNT_MAX, "reader writer lock write recursion limit exceeded");
        self.write_lock_count.store(count + 1, Ordering::Relaxed);
    }

    /// # Panics
    ///
    /// panics if the current thread does not hold the write lock
    pub fn release_write_lock(&self) {
        let current = sys::get_current_thread_handle();
        assert!(self.is_owned_by(current), "write lock released by a thread which does not hold it");

        let count = self.write_lock_count.load(Ordering::Relaxed);
        assert!(count > 0);
        self.write_lock_count.store(count - 1, Ordering::Relaxed);

        self.release_write_lock_impl();
    }

    pub fn is_read_locked(&self) -> bool {
        self.load().read_lock_count() > 0
    }

    pub fn is_write_locked(&self) -> bool {
        self.load().write_locked()
    }

    pub fn is_write_lock_held_by_current_thread(&self) -> bool {
        self.is_owned_by(sys::get_current_thread_handle()) && self.write_lock_count.load(Ordering::Relaxed) > 0
    }

    /// Returns true if the current thread holds the write lock or read locks nested inside it
    pub fn is_locked_by_current_thread(&self) -> bool {
        self.is_owned_by(sys::get_current_thread_handle())
    }

    pub fn read(&self) -> ReadLockGuard<'_> {
        self.acquire_read_lock();
        ReadLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_read(&self) -> Option<ReadLockGuard<'_>> {
        if self.try_acquire_read_lock() {
            Some(ReadLockGuard {
                lock: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }

    pub fn write(&self) -> WriteLockGuard<'_> {
        self.acquire_write_lock();
        WriteLockGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_write(&self) -> Option<WriteLockGuard<'_>> {
        if self.try_acquire_write_lock() {
            Some(WriteLockGuard {
                lock: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct ReadLockGuard<'a> {
    lock: &'a ReaderWriterLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReadLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read_lock();
    }
}

#[derive(Debug)]
pub struct WriteLockGuard<'a> {
    lock: &'a ReaderWriterLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for WriteLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write_lock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_count_fields_are_independent() {
        let mut lock_count = LockCount(0);
        lock_count.set_handle(0x1234 | HANDLE_WAIT_MASK);
        lock_count.inc_read_lock_count();
        lock_count.inc_read_lock_count();
        lock_count.set_write_locked(true);
        lock_count.inc_read_waiter_count();
        lock_count.inc_write_waiter_count();
        lock_count.inc_write_waiter_count();

        assert_eq!(lock_count.handle(), 0x1234 | HANDLE_WAIT_MASK);
        assert_eq!(lock_count.read_lock_count(), 2);
        assert!(lock_count.write_locked());
        assert_eq!(lock_count.read_waiter_count(), 1);
        assert_eq!(lock_count.write_waiter_count(), 2);

        lock_count.release_handle();
        assert_eq!(lock_count.handle(), 0x1234 | HANDLE_WAIT_MASK);
        lock_count.set_handle(0x1234);
        lock_count.release_handle();
        assert_eq!(lock_count.handle(), 0);
        assert_eq!(lock_count.read_lock_count(), 2);
    }

    #[test]
    fn writer_owns_critical_section() {
        let lock = ReaderWriterLock::new();

        let guard = lock.write();
        assert!(lock.critical_section().is_locked_by_current_thread());
        assert!(lock.is_write_lock_held_by_current_thread());
        drop(guard);

        assert_eq!(lock.load(), LockCount(0));
    }

    #[test]
    fn nested_read_inside_write() {
        let lock = ReaderWriterLock::new();

        lock.acquire_write_lock();
        lock.acquire_read_lock();
        lock.acquire_write_lock();

        lock.release_write_lock();
        lock.release_write_lock();
        // the nested read lock keeps the lock write locked
        assert!(lock.is_write_locked());
        assert!(lock.is_locked_by_current_thread());

        lock.release_read_lock();
        assert!(!lock.is_write_locked());
        assert!(!lock.is_locked_by_current_thread());
        assert_eq!(lock.load(), LockCount(0));
    }

    #[test]
    #[should_panic(expected = "does not hold it")]
    fn release_write_without_holding_panics() {
        let lock = ReaderWriterLock::new();
        lock.release_write_lock();
    }
}
