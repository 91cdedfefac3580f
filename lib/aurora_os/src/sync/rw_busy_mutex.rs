use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut, Range};
use core::sync::atomic::{AtomicU32, Ordering};

use bit_utils::{get_bits, set_bits};

use super::busy_mutex::{disable_preemption, enable_preemption};

const WRITE_CURRENT_BITS: Range<usize> = 0..8;
const WRITE_NEXT_BITS: Range<usize> = 8..16;
const READ_COUNT_BITS: Range<usize> = 16..32;

const TICKET_MASK: usize = (1 << 8) - 1;

fn field(value: u32, bits: Range<usize>) -> usize {
    get_bits(value as usize, bits)
}

fn with_field(value: u32, bits: Range<usize>, field: usize) -> u32 {
    set_bits(value as usize, bits, field) as u32
}

/// A ticket based reader writer spinlock
///
/// Writers take a ticket and are served in order, and new readers are held off while any writer is waiting.
/// The lock word packs the ticket currently being served, the next ticket to hand out, and the read count.
#[derive(Debug, Default)]
pub struct InternalReaderWriterBusyMutex {
    value: AtomicU32,
}

impl InternalReaderWriterBusyMutex {
    pub const fn new() -> Self {
        InternalReaderWriterBusyMutex {
            value: AtomicU32::new(0),
        }
    }

    /// Advances the ticket in `bits` by one, wrapping without touching the other fields, and returns the previous word
    fn advance_ticket(&self, bits: Range<usize>, order: Ordering) -> u32 {
        let advance = |value| {
            let ticket = field(value, bits.clone());
            Some(with_field(value, bits.clone(), (ticket + 1) & TICKET_MASK))
        };

        match self.value.fetch_update(order, Ordering::Relaxed, advance) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    fn writer_present(value: u32) -> bool {
        field(value, WRITE_CURRENT_BITS) != field(value, WRITE_NEXT_BITS)
    }

    pub fn acquire_read_lock(&self) {
        loop {
            let tlr = disable_preemption();

            let value = self.value.load(Ordering::Relaxed);
            if !Self::writer_present(value) {
                let read_count = field(value, READ_COUNT_BITS);
                assert!(read_count < (1 << 16) - 1, "too many readers on busy mutex");

                let new_value = with_field(value, READ_COUNT_BITS, read_count + 1);
                if self.value.compare_exchange_weak(value, new_value, Ordering::Acquire, Ordering::Relaxed).is_ok() {
                    return;
                }
            }

            enable_preemption(tlr);
            spin_loop();
        }
    }

    pub fn release_read_lock(&self) {
        let result = self.value.fetch_update(Ordering::Release, Ordering::Relaxed, |value| {
            let read_count = field(value, READ_COUNT_BITS);
            if read_count == 0 {
                None
            } else {
                Some(with_field(value, READ_COUNT_BITS, read_count - 1))
            }
        });
        assert!(result.is_ok(), "released a read lock on a busy mutex with no readers");

        enable_preemption(sys::thread_local_region());
    }

    pub fn acquire_write_lock(&self) {
        disable_preemption();

        let ticket = field(self.advance_ticket(WRITE_NEXT_BITS, Ordering::Relaxed), WRITE_NEXT_BITS);

        loop {
            let value = self.value.load(Ordering::Acquire);
            if field(value, WRITE_CURRENT_BITS) == ticket && field(value, READ_COUNT_BITS) == 0 {
                return;
            }
            spin_loop();
        }
    }

    pub fn release_write_lock(&self) {
        self.advance_ticket(WRITE_CURRENT_BITS, Ordering::Release);

        enable_preemption(sys::thread_local_region());
    }

    pub fn read_count(&self) -> usize {
        field(self.value.load(Ordering::Relaxed), READ_COUNT_BITS)
    }

    pub fn is_write_locked_or_waited_on(&self) -> bool {
        Self::writer_present(self.value.load(Ordering::Relaxed))
    }
}

/// A [`InternalReaderWriterBusyMutex`] protecting `T`
#[derive(Debug, Default)]
pub struct ReaderWriterBusyMutex<T: ?Sized> {
    lock: InternalReaderWriterBusyMutex,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for ReaderWriterBusyMutex<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for ReaderWriterBusyMutex<T> {}

impl<T> ReaderWriterBusyMutex<T> {
    pub const fn new(data: T) -> Self {
        ReaderWriterBusyMutex {
            lock: InternalReaderWriterBusyMutex::new(),
            data: UnsafeCell::new(data),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> ReaderWriterBusyMutex<T> {
    pub fn read(&self) -> BusyReadGuard<'_, T> {
        self.lock.acquire_read_lock();
        BusyReadGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    pub fn write(&self) -> BusyWriteGuard<'_, T> {
        self.lock.acquire_write_lock();
        BusyWriteGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }
}

#[derive(Debug)]
pub struct BusyReadGuard<'a, T: ?Sized> {
    mutex: &'a ReaderWriterBusyMutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> Deref for BusyReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // safety: the guard holds a read lock
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for BusyReadGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.lock.release_read_lock();
    }
}

#[derive(Debug)]
pub struct BusyWriteGuard<'a, T: ?Sized> {
    mutex: &'a ReaderWriterBusyMutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> Deref for BusyWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // safety: the guard holds the write lock
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for BusyWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // safety: the guard holds the write lock
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for BusyWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.lock.release_write_lock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_share() {
        let mutex = ReaderWriterBusyMutex::new(5);

        let a = mutex.read();
        let b = mutex.read();
        assert_eq!(*a + *b, 10);
        assert_eq!(mutex.lock.read_count(), 2);
        assert_eq!(sys::thread_local_region().disable_count(), 2);

        drop(a);
        drop(b);
        assert_eq!(mutex.lock.read_count(), 0);
        assert_eq!(sys::thread_local_region().disable_count(), 0);
    }

    #[test]
    fn tickets_wrap() {
        let mutex = ReaderWriterBusyMutex::new(0usize);

        for _ in 0..300 {
            *mutex.write() += 1;
        }

        assert!(!mutex.lock.is_write_locked_or_waited_on());
        assert_eq!(*mutex.read(), 300);
    }

    #[test]
    fn ticket_advance_keeps_other_fields() {
        let lock = InternalReaderWriterBusyMutex::new();
        lock.value.store(with_field(0, WRITE_NEXT_BITS, TICKET_MASK) | (3 << 16), Ordering::Relaxed);

        let previous = lock.advance_ticket(WRITE_NEXT_BITS, Ordering::Relaxed);
        assert_eq!(field(previous, WRITE_NEXT_BITS), TICKET_MASK);

        let value = lock.value.load(Ordering::Relaxed);
        assert_eq!(field(value, WRITE_NEXT_BITS), 0);
        assert_eq!(field(value, WRITE_CURRENT_BITS), 0);
        assert_eq!(lock.read_count(), 3);
    }
}
