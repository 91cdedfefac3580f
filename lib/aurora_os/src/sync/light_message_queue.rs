use core::time::Duration;

use crate::time::TimeoutHelper;
use super::ring_buffer::{MessageBuffer, RingBuffer};
use super::{InternalLightEvent, Mutex, MutexGuard};

/// What a failed queue operation should do to the event it would wait on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    /// Leave the event alone, used by operations which do not wait afterwards
    Keep,
    /// Clear the event so the following wait blocks until the queue changes
    Clear,
}

/// A bounded queue of machine words which signals waiters with light events instead of condition variables
///
/// Cheaper than a [`MessageQueue`](super::MessageQueue) when the queue is rarely contended,
/// but it can not be waited on by a multi wait.
#[derive(Debug)]
pub struct LightMessageQueue<'b> {
    buffer: MessageBuffer<'b>,
    ring: Mutex<RingBuffer>,
    /// Manual clear events, cleared by a waiter right before it waits
    ev_not_empty: InternalLightEvent,
    ev_not_full: InternalLightEvent,
}

impl<'b> LightMessageQueue<'b> {
    /// # Panics
    ///
    /// panics if `buffer` is empty
    pub fn new(buffer: &'b mut [usize]) -> Self {
        let buffer = MessageBuffer::new(buffer);
        LightMessageQueue {
            ring: Mutex::new(RingBuffer::new(buffer.capacity())),
            buffer,
            ev_not_empty: InternalLightEvent::new(false),
            ev_not_full: InternalLightEvent::new(true),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }

    fn slots(&self, _ring: &MutexGuard<'_, RingBuffer>) -> &mut [usize] {
        // safety: the caller holds the queue lock
        unsafe { self.buffer.slots() }
    }

    fn try_enqueue_impl(&self, data: usize, jam: bool, on_failure: OnFailure) -> bool {
        {
            let mut ring = self.ring.lock();
            if ring.is_full() {
                if on_failure == OnFailure::Clear {
                    self.ev_not_full.clear();
                }
                return false;
            }

            let slots = self.slots(&ring);
            if jam {
                ring.jam(slots, data);
            } else {
                ring.enqueue(slots, data);
            }
        }

        self.ev_not_empty.signal_with_manual_clear();
        true
    }

    fn try_receive_impl(&self, on_failure: OnFailure) -> Option<usize> {
        let data = {
            let mut ring = self.ring.lock();
            if ring.is_empty() {
                if on_failure == OnFailure::Clear {
                    self.ev_not_empty.clear();
                }
                return None;
            }

            let slots = self.slots(&ring);
            ring.dequeue(slots)
        };

        self.ev_not_full.signal_with_manual_clear();
        Some(data)
    }

    fn try_peek_impl(&self, on_failure: OnFailure) -> Option<usize> {
        let ring = self.ring.lock();
        if ring.is_empty() {
            if on_failure == OnFailure::Clear {
                self.ev_not_empty.clear();
            }
            return None;
        }

        Some(ring.peek(self.slots(&ring)))
    }

    fn enqueue(&self, data: usize, jam: bool) {
        while !self.try_enqueue_impl(data, jam, OnFailure::Clear) {
            self.ev_not_full.wait_with_manual_clear();
        }
    }

    fn timed_enqueue(&self, data: usize, jam: bool, timeout: Duration) -> bool {
        let timeout = TimeoutHelper::new(timeout);
        while !self.try_enqueue_impl(data, jam, OnFailure::Clear) {
            if timeout.is_timed_out() {
                return false;
            }
            self.ev_not_full.timed_wait_with_manual_clear(&timeout);
        }
        true
    }

    /// Adds `data` to the back of the queue, waiting while it is full
    pub fn send(&self, data: usize) {
        self.enqueue(data, false);
    }

    pub fn try_send(&self, data: usize) -> bool {
        self.try_enqueue_impl(data, false, OnFailure::Keep)
    }

    pub fn timed_send(&self, data: usize, timeout: Duration) -> bool {
        self.timed_enqueue(data, false, timeout)
    }

    /// Adds `data` to the front of the queue, waiting while it is full
    pub fn jam(&self, data: usize) {
        self.enqueue(data, true);
    }

    pub fn try_jam(&self, data: usize) -> bool {
        self.try_enqueue_impl(data, true, OnFailure::Keep)
    }

    pub fn timed_jam(&self, data: usize, timeout: Duration) -> bool {
        self.timed_enqueue(data, true, timeout)
    }

    /// Removes the message at the front of the queue, waiting while it is empty
    pub fn receive(&self) -> usize {
        loop {
            if let Some(data) = self.try_receive_impl(OnFailure::Clear) {
                return data;
            }
            self.ev_not_empty.wait_with_manual_clear();
        }
    }

    pub fn try_receive(&self) -> Option<usize> {
        self.try_receive_impl(OnFailure::Keep)
    }

    pub fn timed_receive(&self, timeout: Duration) -> Option<usize> {
        let timeout = TimeoutHelper::new(timeout);
        loop {
            if let Some(data) = self.try_receive_impl(OnFailure::Clear) {
                return Some(data);
            }
            if timeout.is_timed_out() {
                return None;
            }
            self.ev_not_empty.timed_wait_with_manual_clear(&timeout);
        }
    }

    /// Returns the message at the front of the queue without removing it, waiting while it is empty
    pub fn peek(&self) -> usize {
        loop {
            if let Some(data) = self.try_peek_impl(OnFailure::Clear) {
                return data;
            }
            self.ev_not_empty.wait_with_manual_clear();
        }
    }

    pub fn try_peek(&self) -> Option<usize> {
        self.try_peek_impl(OnFailure::Keep)
    }

    pub fn timed_peek(&self, timeout: Duration) -> Option<usize> {
        let timeout = TimeoutHelper::new(timeout);
        loop {
            if let Some(data) = self.try_peek_impl(OnFailure::Clear) {
                return Some(data);
            }
            if timeout.is_timed_out() {
                return None;
            }
            self.ev_not_empty.timed_wait_with_manual_clear(&timeout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_slot_queue() {
        let mut buffer = [0; 1];
        let queue = LightMessageQueue::new(&mut buffer);

        assert!(queue.try_send(0xA));
        assert!(!queue.try_send(0xB));
        assert_eq!(queue.receive(), 0xA);
        assert!(queue.try_send(0xB));
        assert_eq!(queue.receive(), 0xB);
    }

    #[test]
    fn timed_operations_give_up() {
        let mut buffer = [0; 2];
        let queue = LightMessageQueue::new(&mut buffer);

        assert_eq!(queue.timed_receive(Duration::from_millis(5)), None);
        queue.send(1);
        queue.jam(2);
        assert!(!queue.timed_jam(3, Duration::from_millis(5)));

        assert_eq!(queue.try_peek(), Some(2));
        assert_eq!(queue.timed_receive(Duration::ZERO), Some(2));
        assert_eq!(queue.peek(), 1);
        assert_eq!(queue.receive(), 1);
        assert!(queue.timed_send(4, Duration::ZERO));
    }
}
