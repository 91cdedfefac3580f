use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use aurora_os::sync::{ReaderWriterBusyMutex, ReaderWriterLock};

#[test]
fn readers_hold_the_lock_together() {
    const READERS: usize = 4;

    let lock = Arc::new(ReaderWriterLock::new());
    let barrier = Arc::new(Barrier::new(READERS));

    let readers: Vec<_> = (0..READERS).map(|_| {
        let lock = lock.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            let _read = lock.read();
            // every reader has to be inside the lock at once to get past this
            barrier.wait();
            assert!(lock.is_read_locked());
            assert!(!lock.is_write_locked());
        })
    }).collect();

    for reader in readers {
        reader.join().unwrap();
    }

    assert!(!lock.is_read_locked());
}

#[test]
fn waiting_writer_blocks_new_readers() {
    let lock = Arc::new(ReaderWriterLock::new());
    let wrote = Arc::new(AtomicBool::new(false));

    lock.acquire_read_lock();

    let writer = {
        let lock = lock.clone();
        let wrote = wrote.clone();
        thread::spawn(move || {
            let _write = lock.write();
            wrote.store(true, Ordering::Release);
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!wrote.load(Ordering::Acquire));
    // writers are preferred, so a new reader has to wait behind the writer
    assert!(!lock.try_acquire_read_lock());

    lock.release_read_lock();
    writer.join().unwrap();

    assert!(wrote.load(Ordering::Acquire));
    assert!(lock.try_acquire_read_lock());
    lock.release_read_lock();
}

#[test]
fn writers_exclude_everyone() {
    const THREADS: usize = 6;
    const ITERATIONS: usize = 500;

    let lock = Arc::new(ReaderWriterLock::new());
    let writing = Arc::new(AtomicBool::new(false));
    let count = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..THREADS).map(|i| {
        let lock = lock.clone();
        let writing = writing.clone();
        let count = count.clone();
        thread::spawn(move || {
            for _ in 0..ITERATIONS {
                if i % 2 == 0 {
                    let _write = lock.write();
                    assert!(!writing.swap(true, Ordering::AcqRel));
                    count.fetch_add(1, Ordering::Relaxed);
                    writing.store(false, Ordering::Release);
                } else {
                    let _read = lock.read();
                    assert!(!writing.load(Ordering::Acquire));
                }
            }
        })
    }).collect();

    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(count.load(Ordering::Relaxed), THREADS / 2 * ITERATIONS);
    assert!(!lock.is_read_locked() && !lock.is_write_locked());
}

#[test]
fn write_lock_is_recursive_and_allows_reads() {
    let lock = ReaderWriterLock::new();

    lock.acquire_write_lock();
    lock.acquire_write_lock();
    lock.acquire_read_lock();
    assert!(lock.is_write_lock_held_by_current_thread());

    lock.release_write_lock();
    lock.release_write_lock();
    // the read lock taken while writing keeps the lock owned by this thread
    assert!(lock.is_locked_by_current_thread());
    lock.release_read_lock();

    assert!(!lock.is_locked_by_current_thread());
    assert!(lock.try_acquire_write_lock());
    lock.release_write_lock();
}

#[test]
fn busy_reader_writer_mutex_counts() {
    let mutex = Arc::new(ReaderWriterBusyMutex::new(0usize));

    let threads: Vec<_> = (0..4).map(|_| {
        let mutex = mutex.clone();
        thread::spawn(move || {
            for _ in 0..1000 {
                *mutex.write() += 1;
                let _ = *mutex.read();
            }
        })
    }).collect();

    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(*mutex.read(), 4000);
}
