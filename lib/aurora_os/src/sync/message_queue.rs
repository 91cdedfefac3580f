use core::time::Duration;

use crate::multi_wait::{HolderNode, MultiWaitObjectList};
use crate::time::TimeoutHelper;
use super::ring_buffer::{MessageBuffer, RingBuffer};
use super::{ConditionVariable, Mutex, MutexGuard};

/// Which condition of a [`MessageQueue`] a multi wait holder waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageQueueWaitType {
    ForNotFull,
    ForNotEmpty,
}

#[derive(Debug)]
struct QueueState {
    ring: RingBuffer,
    not_full_list: MultiWaitObjectList,
    not_empty_list: MultiWaitObjectList,
}

/// A bounded queue of machine words stored in a caller supplied buffer
///
/// Larger messages are sent by sending a pointer or an index to them.
#[derive(Debug)]
pub struct MessageQueue<'b> {
    buffer: MessageBuffer<'b>,
    state: Mutex<QueueState>,
    cond_not_full: ConditionVariable,
    cond_not_empty: ConditionVariable,
}

impl<'b> MessageQueue<'b> {
    /// Creates a queue which holds as many messages as `buffer` has slots
    ///
    /// # Panics
    ///
    /// panics if `buffer` is empty
    pub fn new(buffer: &'b mut [usize]) -> Self {
        let buffer = MessageBuffer::new(buffer);
        MessageQueue {
            state: Mutex::new(QueueState {
                ring: RingBuffer::new(buffer.capacity()),
                not_full_list: MultiWaitObjectList::new(),
                not_empty_list: MultiWaitObjectList::new(),
            }),
            buffer,
            cond_not_full: ConditionVariable::new(),
            cond_not_empty: ConditionVariable::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn len(&self) -> usize {
        self.state.lock().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().ring.is_empty()
    }

    fn slots(&self, _state: &MutexGuard<'_, QueueState>) -> &mut [usize] {
        // safety: the caller holds the queue lock
        unsafe { self.buffer.slots() }
    }

    fn wait_not_full(&self, state: &mut MutexGuard<'_, QueueState>) {
        while state.ring.is_full() {
            self.cond_not_full.wait(state);
        }
    }

    fn timed_wait_not_full(&self, state: &mut MutexGuard<'_, QueueState>, timeout: &TimeoutHelper) -> bool {
        while state.ring.is_full() {
            if timeout.is_timed_out() {
                return false;
            }
            self.cond_not_full.timed_wait_until(state, timeout);
        }
        true
    }

    fn wait_not_empty(&self, state: &mut MutexGuard<'_, QueueState>) {
        while state.ring.is_empty() {
            self.cond_not_empty.wait(state);
        }
    }

    fn timed_wait_not_empty(&self, state: &mut MutexGuard<'_, QueueState>, timeout: &TimeoutHelper) -> bool {
        while state.ring.is_empty() {
            if timeout.is_timed_out() {
                return false;
            }
            self.cond_not_empty.timed_wait_until(state, timeout);
        }
        true
    }

    fn enqueue(&self, state: &mut MutexGuard<'_, QueueState>, data: usize) {
        let slots = self.slots(state);
        state.ring.enqueue(slots, data);

        self.cond_not_empty.broadcast();
        state.not_empty_list.signal_all_threads();
    }

    fn jam_front(&self, state: &mut MutexGuard<'_, QueueState>, data: usize) {
        let slots = self.slots(state);
        state.ring.jam(slots, data);

        self.cond_not_empty.broadcast();
        state.not_empty_list.signal_all_threads();
    }

    fn dequeue(&self, state: &mut MutexGuard<'_, QueueState>) -> usize {
        let slots = self.slots(state);
        let data = state.ring.dequeue(slots);

        self.cond_not_full.broadcast();
        state.not_full_list.signal_all_threads();
        data
    }

    /// Adds `data` to the back of the queue, waiting while it is full
    pub fn send(&self, data: usize) {
        let mut state = self.state.lock();
        self.wait_not_full(&mut state);
        self.enqueue(&mut state, data);
    }

    pub fn try_send(&self, data: usize) -> bool {
        let mut state = self.state.lock();
        if state.ring.is_full() {
            return false;
        }
        self.enqueue(&mut state, data);
        true
    }

    pub fn timed_send(&self, data: usize, timeout: Duration) -> bool {
        let timeout = TimeoutHelper::new(timeout);
        let mut state = self.state.lock();
        if !self.timed_wait_not_full(&mut state, &timeout) {
            return false;
        }
        self.enqueue(&mut state, data);
        true
    }

    /// Adds `data` to the front of the queue, waiting while it is full
    pub fn jam(&self, data: usize) {
        let mut state = self.state.lock();
        self.wait_not_full(&mut state);
        self.jam_front(&mut state, data);
    }

    pub fn try_jam(&self, data: usize) -> bool {
        let mut state = self.state.lock();
        if state.ring.is_full() {
            return false;
        }
        self.jam_front(&mut state, data);
        true
    }

    pub fn timed_jam(&self, data: usize, timeout: Duration) -> bool {
        let timeout = TimeoutHelper::new(timeout);
        let mut state = self.state.lock();
        if !self.timed_wait_not_full(&mut state, &timeout) {
            return false;
        }
        self.jam_front(&mut state, data);
        true
    }

    /// Removes the message at the front of the queue, waiting while it is empty
    pub fn receive(&self) -> usize {
        let mut state = self.state.lock();
        self.wait_not_empty(&mut state);
        self.dequeue(&mut state)
    }

    pub fn try_receive(&self) -> Option<usize> {
        let mut state = self.state.lock();
        if state.ring.is_empty() {
            return None;
        }
        Some(self.dequeue(&mut state))
    }

    pub fn timed_receive(&self, timeout: Duration) -> Option<usize> {
        let timeout = TimeoutHelper::new(timeout);
        let mut state = self.state.lock();
        if !self.timed_wait_not_empty(&mut state, &timeout) {
            return None;
        }
        Some(self.dequeue(&mut state))
    }

    /// Returns the message at the front of the queue without removing it, waiting while it is empty
    pub fn peek(&self) -> usize {
        let mut state = self.state.lock();
        self.wait_not_empty(&mut state);
        state.ring.peek(self.slots(&state))
    }

    pub fn try_peek(&self) -> Option<usize> {
        let state = self.state.lock();
        if state.ring.is_empty() {
            return None;
        }
        Some(state.ring.peek(self.slots(&state)))
    }

    pub fn timed_peek(&self, timeout: Duration) -> Option<usize> {
        let timeout = TimeoutHelper::new(timeout);
        let mut state = self.state.lock();
        if !self.timed_wait_not_empty(&mut state, &timeout) {
            return None;
        }
        Some(state.ring.peek(self.slots(&state)))
    }

    fn is_signaled(state: &QueueState, wait_type: MessageQueueWaitType) -> bool {
        match wait_type {
            MessageQueueWaitType::ForNotFull => !state.ring.is_full(),
            MessageQueueWaitType::ForNotEmpty => !state.ring.is_empty(),
        }
    }

    pub(crate) fn is_signaled_for_multi_wait(&self, wait_type: MessageQueueWaitType) -> bool {
        Self::is_signaled(&self.state.lock(), wait_type)
    }

    pub(crate) fn link_multi_wait_holder(&self, holder: &HolderNode, wait_type: MessageQueueWaitType) -> bool {
        let mut state = self.state.lock();
        match wait_type {
            MessageQueueWaitType::ForNotFull => state.not_full_list.link(holder),
            MessageQueueWaitType::ForNotEmpty => state.not_empty_list.link(holder),
        }
        Self::is_signaled(&state, wait_type)
    }

    pub(crate) fn unlink_multi_wait_holder(&self, holder: &HolderNode, wait_type: MessageQueueWaitType) {
        let mut state = self.state.lock();
        match wait_type {
            MessageQueueWaitType::ForNotFull => state.not_full_list.unlink(holder),
            MessageQueueWaitType::ForNotEmpty => state.not_empty_list.unlink(holder),
        }
    }
}
