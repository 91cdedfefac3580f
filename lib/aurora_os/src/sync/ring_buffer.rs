use core::marker::PhantomData;
use core::ptr::NonNull;

/// The caller supplied storage of a message queue
///
/// Kept outside of the queue lock so the queue stays covariant over the buffer lifetime,
/// every access still happens with the queue lock held.
#[derive(Debug)]
pub(super) struct MessageBuffer<'b> {
    ptr: NonNull<usize>,
    capacity: usize,
    _buffer: PhantomData<&'b mut [usize]>,
}

// the buffer is only accessed through the queue lock
unsafe impl Send for MessageBuffer<'_> {}
unsafe impl Sync for MessageBuffer<'_> {}

impl<'b> MessageBuffer<'b> {
    /// # Panics
    ///
    /// panics if `buffer` is empty
    pub fn new(buffer: &'b mut [usize]) -> Self {
        assert!(!buffer.is_empty(), "message queue capacity must be at least 1");

        MessageBuffer {
            capacity: buffer.len(),
            ptr: NonNull::from(buffer).cast(),
            _buffer: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// # Safety
    ///
    /// the caller must hold the lock of the queue owning the buffer for as long as the slice is used
    pub unsafe fn slots(&self) -> &mut [usize] {
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) }
    }
}

/// Where the messages of a message queue are in its buffer
///
/// Messages occupy `count` slots starting at `offset`, wrapping around the end of the buffer.
#[derive(Debug)]
pub(super) struct RingBuffer {
    offset: usize,
    count: usize,
    capacity: usize,
}

impl RingBuffer {
    pub const fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "message queue capacity must be at least 1");

        RingBuffer {
            offset: 0,
            count: 0,
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    /// Adds `data` after the last message
    pub fn enqueue(&mut self, slots: &mut [usize], data: usize) {
        assert!(!self.is_full(), "message queue is full");

        let index = (self.offset + self.count) % self.capacity;
        slots[index] = data;
        self.count += 1;
    }

    /// Adds `data` in front of the first message
    pub fn jam(&mut self, slots: &mut [usize], data: usize) {
        assert!(!self.is_full(), "message queue is full");

        self.offset = if self.offset == 0 {
            self.capacity - 1
        } else {
            self.offset - 1
        };
        slots[self.offset] = data;
        self.count += 1;
    }

    /// Removes and returns the first message
    pub fn dequeue(&mut self, slots: &[usize]) -> usize {
        assert!(!self.is_empty(), "message queue is empty");

        let data = slots[self.offset];
        self.offset = (self.offset + 1) % self.capacity;
        self.count -= 1;
        data
    }

    pub fn peek(&self, slots: &[usize]) -> usize {
        assert!(!self.is_empty(), "message queue is empty");
        slots[self.offset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_invariant(ring: &RingBuffer) {
        assert!(ring.count <= ring.capacity);
        assert!(ring.offset < ring.capacity);
    }

    #[test]
    fn send_is_fifo_and_jam_is_lifo() {
        let mut slots = [0; 4];
        let mut ring = RingBuffer::new(slots.len());

        ring.enqueue(&mut slots, 1);
        ring.enqueue(&mut slots, 2);
        ring.jam(&mut slots, 10);
        ring.jam(&mut slots, 11);
        check_invariant(&ring);
        assert!(ring.is_full());

        assert_eq!(ring.peek(&slots), 11);
        assert_eq!(ring.dequeue(&slots), 11);
        assert_eq!(ring.dequeue(&slots), 10);
        assert_eq!(ring.dequeue(&slots), 1);
        assert_eq!(ring.dequeue(&slots), 2);
        assert!(ring.is_empty());
        check_invariant(&ring);
    }

    #[test]
    fn wraps_around_the_buffer() {
        let mut slots = [0; 3];
        let mut ring = RingBuffer::new(slots.len());

        for round in 0..10 {
            ring.enqueue(&mut slots, round);
            ring.enqueue(&mut slots, round + 100);
            check_invariant(&ring);
            assert_eq!(ring.dequeue(&slots), round);
            assert_eq!(ring.dequeue(&slots), round + 100);
            check_invariant(&ring);
        }
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn zero_capacity_panics() {
        RingBuffer::new(0);
    }
}
