use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use aurora_os::sync::{BusyMutex, InternalCriticalSection, Mutex, RecursiveMutex};

const THREADS: usize = 8;
const ITERATIONS: usize = 2000;

#[test]
fn contended_mutex_counts_exactly() {
    let counter = Arc::new(Mutex::new(0usize));
    let barrier = Arc::new(Barrier::new(THREADS));

    let threads: Vec<_> = (0..THREADS).map(|_| {
        let counter = counter.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            for _ in 0..ITERATIONS {
                let mut count = counter.lock();
                // a non atomic read modify write, which only works under the lock
                let value = *count;
                thread::yield_now();
                *count = value + 1;
            }
        })
    }).collect();

    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(*counter.lock(), THREADS * ITERATIONS);
}

#[test]
fn contended_critical_section() {
    let cs = Arc::new(InternalCriticalSection::new());
    let inside = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let threads: Vec<_> = (0..THREADS).map(|_| {
        let cs = cs.clone();
        let inside = inside.clone();
        thread::spawn(move || {
            for _ in 0..ITERATIONS / 4 {
                cs.enter();
                assert!(cs.is_locked_by_current_thread());
                assert_eq!(inside.fetch_add(1, std::sync::atomic::Ordering::Relaxed), 0);
                inside.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
                cs.leave();
            }
        })
    }).collect();

    for thread in threads {
        thread.join().unwrap();
    }

    assert!(!cs.is_locked_by_current_thread());
}

#[test]
fn try_lock_fails_while_another_thread_holds_the_lock() {
    let mutex = Arc::new(Mutex::new(()));
    let (locked_sender, locked_receiver) = mpsc::channel();
    let (release_sender, release_receiver) = mpsc::channel::<()>();

    let holder = {
        let mutex = mutex.clone();
        thread::spawn(move || {
            let _guard = mutex.lock();
            locked_sender.send(()).unwrap();
            release_receiver.recv().unwrap();
        })
    };

    locked_receiver.recv().unwrap();
    assert!(mutex.try_lock().is_none());
    assert!(!mutex.is_locked_by_current_thread());

    release_sender.send(()).unwrap();
    holder.join().unwrap();
    assert!(mutex.try_lock().is_some());
}

#[test]
fn recursive_mutex_nests() {
    let mutex = RecursiveMutex::new(5);

    let outer = mutex.lock();
    let inner = mutex.lock();
    assert_eq!(*inner, 5);
    assert!(mutex.try_lock().is_some());
    drop(inner);

    assert!(mutex.is_locked_by_current_thread());
    drop(outer);
    assert!(!mutex.is_locked_by_current_thread());
}

#[test]
fn busy_mutex_guards_data() {
    let mutex = Arc::new(BusyMutex::new(Vec::new()));

    let threads: Vec<_> = (0..4).map(|i| {
        let mutex = mutex.clone();
        thread::spawn(move || {
            for j in 0..100 {
                mutex.lock().push(i * 100 + j);
            }
        })
    }).collect();

    for thread in threads {
        thread.join().unwrap();
    }

    let mut values = mutex.lock().clone();
    values.sort_unstable();
    assert_eq!(values, (0..400).collect::<Vec<_>>());
}

#[test]
fn lock_wait_is_woken_by_unlock() {
    let mutex = Arc::new(Mutex::new(false));
    let guard = mutex.lock();

    let waiter = {
        let mutex = mutex.clone();
        thread::spawn(move || *mutex.lock())
    };

    thread::sleep(Duration::from_millis(20));
    drop(guard);
    *mutex.lock() = true;

    // the waiter either saw the value before or after the write, but it did get the lock
    waiter.join().unwrap();
}
