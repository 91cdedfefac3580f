use std::thread;
use std::time::{Duration, Instant};

use aurora_os::sync::{LightMessageQueue, MessageQueue};

#[test]
fn single_producer_keeps_order() {
    let mut buffer = [0; 4];
    let queue = MessageQueue::new(&mut buffer);

    thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..1000 {
                queue.send(i);
            }
        });

        for i in 0..1000 {
            assert_eq!(queue.receive(), i);
        }
    });

    assert!(queue.is_empty());
}

#[test]
fn many_producers_deliver_everything() {
    const PRODUCERS: usize = 4;
    const MESSAGES: usize = 250;

    let mut buffer = [0; 3];
    let queue = MessageQueue::new(&mut buffer);

    let mut received = thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let queue = &queue;
            scope.spawn(move || {
                for i in 0..MESSAGES {
                    queue.send(producer * MESSAGES + i);
                }
            });
        }

        (0..PRODUCERS * MESSAGES).map(|_| queue.receive()).collect::<Vec<_>>()
    });

    received.sort_unstable();
    assert_eq!(received, (0..PRODUCERS * MESSAGES).collect::<Vec<_>>());
}

#[test]
fn full_queue_blocks_sender_until_receive() {
    let mut buffer = [0; 1];
    let queue = MessageQueue::new(&mut buffer);

    queue.send(0xA);
    let start = Instant::now();
    assert!(!queue.timed_send(0xB, Duration::from_millis(20)));
    assert!(start.elapsed() >= Duration::from_millis(20));

    thread::scope(|scope| {
        let sender = scope.spawn(|| queue.send(0xB));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.receive(), 0xA);
        sender.join().unwrap();
    });

    assert_eq!(queue.try_peek(), Some(0xB));
    assert_eq!(queue.timed_receive(Duration::from_secs(1)), Some(0xB));
    assert_eq!(queue.try_receive(), None);
}

#[test]
fn peek_waits_for_a_message() {
    let mut buffer = [0; 2];
    let queue = MessageQueue::new(&mut buffer);

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(10));
            queue.jam(7);
        });

        assert_eq!(queue.peek(), 7);
    });

    assert_eq!(queue.len(), 1);
}

#[test]
fn light_queue_between_threads() {
    let mut buffer = [0; 2];
    let queue = LightMessageQueue::new(&mut buffer);

    let mut received = thread::scope(|scope| {
        for producer in 0..2 {
            let queue = &queue;
            scope.spawn(move || {
                for i in 0..300 {
                    queue.send(producer * 300 + i);
                }
            });
        }

        (0..600).map(|_| queue.receive()).collect::<Vec<_>>()
    });

    received.sort_unstable();
    assert_eq!(received, (0..600).collect::<Vec<_>>());
    assert_eq!(queue.timed_peek(Duration::from_millis(5)), None);
}
