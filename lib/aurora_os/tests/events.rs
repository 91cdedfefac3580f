use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use aurora_os::sync::{
    Event,
    EventClearMode,
    InterProcessEvent,
    InterruptEvent,
    LightEvent,
    LightSemaphore,
    Semaphore,
    SystemEvent,
    TimerEvent,
};

#[test]
fn auto_clear_event_wakes_one_waiter_per_signal() {
    let event = Arc::new(Event::new(EventClearMode::AutoClear, false));
    let woken = Arc::new(AtomicUsize::new(0));

    let waiters: Vec<_> = (0..2).map(|_| {
        let event = event.clone();
        let woken = woken.clone();
        thread::spawn(move || {
            event.wait();
            woken.fetch_add(1, Ordering::AcqRel);
        })
    }).collect();

    thread::sleep(Duration::from_millis(20));
    event.signal();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(woken.load(Ordering::Acquire), 1);

    event.signal();
    for waiter in waiters {
        waiter.join().unwrap();
    }
    assert_eq!(woken.load(Ordering::Acquire), 2);
    assert!(!event.try_wait());
}

#[test]
fn manual_clear_event_releases_everyone() {
    let event = Arc::new(Event::new(EventClearMode::ManualClear, false));

    let waiters: Vec<_> = (0..4).map(|_| {
        let event = event.clone();
        thread::spawn(move || event.wait())
    }).collect();

    thread::sleep(Duration::from_millis(20));
    event.signal();
    for waiter in waiters {
        waiter.join().unwrap();
    }

    assert!(event.try_wait());
    event.clear();
    assert!(!event.timed_wait(Duration::from_millis(5)));
}

#[test]
fn light_event_between_threads() {
    let ping = Arc::new(LightEvent::new(EventClearMode::AutoClear, false));
    let pong = Arc::new(LightEvent::new(EventClearMode::AutoClear, false));

    let other = {
        let ping = ping.clone();
        let pong = pong.clone();
        thread::spawn(move || {
            for _ in 0..100 {
                ping.wait();
                pong.signal();
            }
        })
    };

    for _ in 0..100 {
        ping.signal();
        assert!(pong.timed_wait(Duration::from_secs(10)));
    }

    other.join().unwrap();
}

#[test]
fn semaphores_limit_concurrency() {
    let semaphore = Arc::new(Semaphore::new(2, 2));
    let light = Arc::new(LightSemaphore::new(2, 2));
    let inside = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..6).map(|i| {
        let semaphore = semaphore.clone();
        let light = light.clone();
        let inside = inside.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                if i % 2 == 0 {
                    semaphore.acquire();
                } else {
                    light.acquire();
                }

                assert!(inside.fetch_add(1, Ordering::AcqRel) < 4);
                thread::yield_now();
                inside.fetch_sub(1, Ordering::AcqRel);

                if i % 2 == 0 {
                    semaphore.release();
                } else {
                    light.release();
                }
            }
        })
    }).collect();

    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(semaphore.current_count(), 2);
    assert_eq!(light.current_count(), 2);
}

#[test]
fn semaphore_release_count_wakes_waiters() {
    let semaphore = Arc::new(Semaphore::new(0, 3));

    let waiters: Vec<_> = (0..3).map(|_| {
        let semaphore = semaphore.clone();
        thread::spawn(move || semaphore.acquire())
    }).collect();

    thread::sleep(Duration::from_millis(20));
    semaphore.release_count(3);
    for waiter in waiters {
        waiter.join().unwrap();
    }

    assert_eq!(semaphore.current_count(), 0);
    assert!(!semaphore.timed_acquire(Duration::from_millis(5)));
}

#[test]
fn inter_process_event_signals_other_thread() {
    let event = Arc::new(SystemEvent::new_inter_process(EventClearMode::AutoClear).unwrap());
    assert!(event.is_inter_process());

    let waiter = {
        let event = event.clone();
        thread::spawn(move || event.timed_wait(Duration::from_secs(10)))
    };

    thread::sleep(Duration::from_millis(10));
    event.signal();
    assert!(waiter.join().unwrap());
    assert!(!event.try_wait());
}

#[test]
fn inter_process_event_handles_can_be_shared() {
    let mut event = InterProcessEvent::new(EventClearMode::ManualClear).unwrap();
    let readable = event.detach_readable_handle();
    let reader = InterProcessEvent::attach_readable_handle(readable, true, EventClearMode::ManualClear);

    event.signal();
    assert!(reader.try_wait());
    event.clear();
    assert!(!reader.try_wait());
}

#[test]
fn interrupt_wakes_waiter() {
    const INTERRUPT: u32 = 0x23;

    let event = Arc::new(InterruptEvent::new(INTERRUPT, EventClearMode::ManualClear).unwrap());

    let waiter = {
        let event = event.clone();
        thread::spawn(move || event.wait())
    };

    thread::sleep(Duration::from_millis(10));
    sys::raise_interrupt(INTERRUPT);
    waiter.join().unwrap();

    // level triggered events stay signaled until cleared
    assert!(event.try_wait());
    event.clear();
    assert!(!event.try_wait());
}

#[test]
fn periodic_timer_fires_repeatedly() {
    let timer = TimerEvent::new(EventClearMode::AutoClear);
    timer.start_periodic(Duration::from_millis(5), Duration::from_millis(5));

    for _ in 0..3 {
        assert!(timer.timed_wait(Duration::from_secs(5)));
    }

    timer.stop();
    timer.clear();
    assert!(!timer.timed_wait(Duration::from_millis(20)));
}
