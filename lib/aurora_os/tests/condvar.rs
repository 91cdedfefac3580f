use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use aurora_os::sync::{ConditionVariable, ConditionVariableStatus, Mutex};

struct Channel {
    queue: Mutex<VecDeque<u32>>,
    not_empty: ConditionVariable,
}

#[test]
fn consumer_sees_every_item_in_order() {
    let channel = Arc::new(Channel {
        queue: Mutex::new(VecDeque::new()),
        not_empty: ConditionVariable::new(),
    });

    let consumer = {
        let channel = channel.clone();
        thread::spawn(move || {
            let mut received = Vec::new();
            while received.len() < 500 {
                let mut queue = channel.queue.lock();
                while queue.is_empty() {
                    channel.not_empty.wait(&mut queue);
                }
                received.extend(queue.drain(..));
            }
            received
        })
    };

    for i in 0..500 {
        channel.queue.lock().push_back(i);
        channel.not_empty.signal();
        if i % 50 == 0 {
            thread::sleep(Duration::from_millis(1));
        }
    }

    assert_eq!(consumer.join().unwrap(), (0..500).collect::<Vec<_>>());
}

#[test]
fn broadcast_wakes_every_waiter() {
    let state = Arc::new((Mutex::new(false), ConditionVariable::new()));

    let waiters: Vec<_> = (0..4).map(|_| {
        let state = state.clone();
        thread::spawn(move || {
            let (flag, cond) = &*state;
            let mut flag = flag.lock();
            while !*flag {
                cond.wait(&mut flag);
            }
        })
    }).collect();

    thread::sleep(Duration::from_millis(20));
    *state.0.lock() = true;
    state.1.broadcast();

    for waiter in waiters {
        waiter.join().unwrap();
    }
}

#[test]
fn timed_wait_times_out_and_keeps_the_lock() {
    let mutex = Mutex::new(0);
    let cond = ConditionVariable::new();

    let start = Instant::now();
    let mut guard = mutex.lock();
    assert_eq!(cond.timed_wait(&mut guard, Duration::from_millis(20)), ConditionVariableStatus::TimedOut);
    assert!(start.elapsed() >= Duration::from_millis(20));

    // the mutex is held again after the wait
    assert!(mutex.is_locked_by_current_thread());
    *guard += 1;
    drop(guard);
    assert!(!mutex.is_locked_by_current_thread());
}

#[test]
fn timed_wait_is_signaled() {
    let state = Arc::new((Mutex::new(false), ConditionVariable::new()));

    let signaler = {
        let state = state.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            *state.0.lock() = true;
            state.1.signal();
        })
    };

    let (flag, cond) = &*state;
    let mut flag = flag.lock();
    while !*flag {
        assert_eq!(cond.timed_wait(&mut flag, Duration::from_secs(10)), ConditionVariableStatus::Success);
    }
    drop(flag);

    signaler.join().unwrap();
}
