use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use aurora_os::multi_wait::{MultiWait, MultiWaitHolder};
use aurora_os::sync::{
    Event,
    EventClearMode,
    InterProcessEvent,
    MessageQueue,
    MessageQueueWaitType,
    Semaphore,
    TimerEvent,
};
use sys::Handle;

#[test]
fn signal_from_another_thread_wakes_the_right_holder() {
    let event = Event::new(EventClearMode::AutoClear, false);
    let other = Event::new(EventClearMode::AutoClear, false);
    let holder = MultiWaitHolder::from_event(&event);
    let other_holder = MultiWaitHolder::from_event(&other);
    holder.set_user_data(1);
    other_holder.set_user_data(2);

    let mut multi_wait = MultiWait::new();
    multi_wait.link(&holder);
    multi_wait.link(&other_holder);
    assert_eq!(multi_wait.len(), 2);

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            event.signal();
        });

        let signaled = multi_wait.wait_any();
        assert_eq!(signaled.user_data(), 1);
    });

    // waiting does not consume the signal
    assert!(event.try_wait());

    multi_wait.unlink(&holder);
    assert!(!holder.is_linked());
    event.signal();
    assert!(multi_wait.timed_wait_any(Duration::from_millis(10)).is_none());

    multi_wait.unlink_all();
}

#[test]
fn already_signaled_holder_is_returned_first() {
    let first = Event::new(EventClearMode::ManualClear, false);
    let second = Event::new(EventClearMode::ManualClear, true);
    let first_holder = MultiWaitHolder::from_event(&first);
    let second_holder = MultiWaitHolder::from_event(&second);
    second_holder.set_user_data(2);

    let mut multi_wait = MultiWait::new();
    multi_wait.link(&first_holder);
    multi_wait.link(&second_holder);

    let signaled = multi_wait.try_wait_any().unwrap();
    assert_eq!(signaled.user_data(), 2);

    second.clear();
    assert!(multi_wait.try_wait_any().is_none());

    multi_wait.unlink_all();
    assert!(multi_wait.is_empty());
}

#[test]
fn timer_fires_before_deadline() {
    let timer = TimerEvent::new(EventClearMode::AutoClear);
    let event = Event::new(EventClearMode::AutoClear, false);
    let timer_holder = MultiWaitHolder::from_timer_event(&timer);
    let event_holder = MultiWaitHolder::from_event(&event);
    timer_holder.set_user_data(7);

    let mut multi_wait = MultiWait::new();
    multi_wait.link(&event_holder);
    multi_wait.link(&timer_holder);

    timer.start_one_shot(Duration::from_millis(30));
    let start = Instant::now();
    let signaled = multi_wait.timed_wait_any(Duration::from_secs(5)).unwrap();

    assert_eq!(signaled.user_data(), 7);
    assert!(start.elapsed() >= Duration::from_millis(25));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(timer.try_wait());

    // a timer set past the deadline does not fire
    timer.start_one_shot(Duration::from_secs(60));
    assert!(multi_wait.timed_wait_any(Duration::from_millis(20)).is_none());

    multi_wait.unlink_all();
}

#[test]
fn kernel_and_user_space_objects_together() {
    let kernel_event = InterProcessEvent::new(EventClearMode::AutoClear).unwrap();
    let user_event = Event::new(EventClearMode::AutoClear, false);
    let kernel_holder = MultiWaitHolder::from_inter_process_event(&kernel_event);
    let user_holder = MultiWaitHolder::from_event(&user_event);
    kernel_holder.set_user_data(1);
    user_holder.set_user_data(2);

    let mut multi_wait = MultiWait::new();
    multi_wait.link(&kernel_holder);
    multi_wait.link(&user_holder);

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(10));
            kernel_event.signal();
        });
        assert_eq!(multi_wait.wait_any().user_data(), 1);
    });
    assert!(kernel_event.try_wait());

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(10));
            user_event.signal();
        });
        assert_eq!(multi_wait.wait_any().user_data(), 2);
    });

    multi_wait.unlink_all();
}

#[test]
fn thread_holder_is_signaled_on_exit() {
    let thread = sys::create_thread(|| thread::sleep(Duration::from_millis(20))).unwrap();
    let holder = MultiWaitHolder::from_thread(thread);

    let mut multi_wait = MultiWait::new();
    multi_wait.link(&holder);
    let signaled = multi_wait.wait_any();
    assert!(std::ptr::eq(signaled, &holder));

    multi_wait.unlink_all();
    sys::close_handle(thread).unwrap();
}

#[test]
fn semaphore_and_queue_holders() {
    let semaphore = Semaphore::new(0, 1);
    let mut buffer = [0; 1];
    let queue = MessageQueue::new(&mut buffer);

    let semaphore_holder = MultiWaitHolder::from_semaphore(&semaphore);
    let not_empty_holder = MultiWaitHolder::from_message_queue(&queue, MessageQueueWaitType::ForNotEmpty);
    let not_full_holder = MultiWaitHolder::from_message_queue(&queue, MessageQueueWaitType::ForNotFull);
    semaphore_holder.set_user_data(1);
    not_empty_holder.set_user_data(2);
    not_full_holder.set_user_data(3);

    let mut multi_wait = MultiWait::new();
    multi_wait.link(&semaphore_holder);
    multi_wait.link(&not_empty_holder);
    assert!(multi_wait.try_wait_any().is_none());

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(10));
            queue.send(0x55);
        });
        assert_eq!(multi_wait.wait_any().user_data(), 2);
    });

    multi_wait.unlink(&not_empty_holder);
    multi_wait.link(&not_full_holder);
    assert!(multi_wait.try_wait_any().is_none());

    thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(10));
            semaphore.release();
        });
        assert_eq!(multi_wait.wait_any().user_data(), 1);
    });
    assert!(semaphore.try_acquire());

    assert_eq!(queue.receive(), 0x55);
    assert_eq!(multi_wait.try_wait_any().unwrap().user_data(), 3);

    multi_wait.unlink_all();
}

#[test]
fn holders_move_between_multi_waits() {
    let signaled = Event::new(EventClearMode::ManualClear, true);
    let idle = Event::new(EventClearMode::ManualClear, false);
    let signaled_holder = MultiWaitHolder::from_event(&signaled);
    let idle_holder = MultiWaitHolder::from_event(&idle);

    let mut source = MultiWait::new();
    let mut target = MultiWait::new();
    source.link(&idle_holder);
    source.link(&signaled_holder);

    target.move_all_from(&mut source);
    assert!(source.is_empty());
    assert_eq!(target.len(), 2);
    assert!(target.holders().any(|linked| std::ptr::eq(linked, &idle_holder)));
    assert!(std::ptr::eq(target.try_wait_any().unwrap(), &signaled_holder));

    target.unlink_all();
}

#[test]
fn unlinking_from_the_wrong_multi_wait_panics() {
    let event = Event::new(EventClearMode::AutoClear, false);
    let holder = MultiWaitHolder::from_event(&event);

    let mut owner = MultiWait::new();
    let mut other = MultiWait::new();
    owner.link(&holder);

    let result = panic::catch_unwind(AssertUnwindSafe(|| other.unlink(&holder)));
    assert!(result.is_err());
    assert!(holder.is_linked());
    assert_eq!(owner.len(), 1);

    // ownership follows holders moved to another multi wait
    other.move_all_from(&mut owner);
    assert!(panic::catch_unwind(AssertUnwindSafe(|| owner.unlink(&holder))).is_err());
    other.unlink(&holder);
    assert!(!holder.is_linked());

    owner.link(&holder);
    owner.unlink_all();
    other.link(&holder);
    other.unlink(&holder);
}

#[test]
fn reply_and_receive_serves_a_session() {
    let (server, client) = sys::create_session().unwrap();
    let done = Event::new(EventClearMode::AutoClear, false);
    let server_holder = MultiWaitHolder::from_handle(server);
    let done_holder = MultiWaitHolder::from_event(&done);

    let mut multi_wait = MultiWait::new();
    multi_wait.link(&server_holder);
    multi_wait.link(&done_holder);

    thread::scope(|scope| {
        scope.spawn(|| {
            sys::send_sync_request(client).unwrap();
            done.signal();
        });

        let request = multi_wait.reply_and_receive(Handle::INVALID).unwrap();
        assert!(std::ptr::eq(request, &server_holder));

        // replying lets the client finish, which signals the event
        let finished = multi_wait.reply_and_receive(server).unwrap();
        assert!(std::ptr::eq(finished, &done_holder));
    });

    multi_wait.unlink_all();
    sys::close_handle(client).unwrap();
    sys::close_handle(server).unwrap();
}
