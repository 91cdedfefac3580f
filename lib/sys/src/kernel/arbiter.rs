use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::{ArbitrationType, Handle, KResult, SignalType, SysErr, HANDLE_WAIT_MASK};
use super::{KernelState, ThreadId, WaitKind, WakeReason};

#[derive(Debug, Clone, Copy)]
struct LockWaiter {
    thread: ThreadId,
    address: usize,
    tag: Handle,
}

#[derive(Debug, Clone, Copy)]
struct ConditionVariableWaiter {
    thread: ThreadId,
    key: usize,
    /// Address of the lock word to reacquire once signaled
    address: usize,
    tag: Handle,
}

#[derive(Debug, Clone, Copy)]
struct AddressWaiter {
    thread: ThreadId,
    address: usize,
}

/// Queues of threads blocked on user memory words
///
/// Threads are woken in the order they started waiting
#[derive(Debug, Default)]
pub(crate) struct Arbiter {
    lock_waiters: Vec<LockWaiter>,
    condition_variable_waiters: Vec<ConditionVariableWaiter>,
    address_waiters: Vec<AddressWaiter>,
}

/// Gets the user lock word at `address`
///
/// # Safety
///
/// `address` must be the address of a live 4 byte aligned word, which is true for any word a thread is blocked on
unsafe fn user_word<'a>(address: usize) -> &'a AtomicU32 {
    unsafe { &*(address as *const AtomicU32) }
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every queue entry belonging to `thread`
    pub fn remove_thread(&mut self, thread: ThreadId) -> bool {
        let old_len = self.lock_waiters.len() + self.condition_variable_waiters.len() + self.address_waiters.len();
        self.lock_waiters.retain(|waiter| waiter.thread != thread);
        self.condition_variable_waiters.retain(|waiter| waiter.thread != thread);
        self.address_waiters.retain(|waiter| waiter.thread != thread);
        old_len != self.lock_waiters.len() + self.condition_variable_waiters.len() + self.address_waiters.len()
    }

    fn address_waiter_count(&self, address: usize) -> usize {
        self.address_waiters.iter()
            .filter(|waiter| waiter.address == address)
            .count()
    }
}

impl KernelState {
    /// Queues the current thread as a waiter for the lock at `address` if it is still owned by `owner` with waiters
    ///
    /// Returns false if the lock word changed and the thread should not block
    pub fn queue_lock_waiter(&mut self, thread: ThreadId, owner: Handle, word: &AtomicU32, tag: Handle) -> bool {
        if word.load(Ordering::Acquire) != owner.as_raw() | HANDLE_WAIT_MASK {
            return false;
        }

        self.arbiter.lock_waiters.push(LockWaiter {
            thread,
            address: word as *const _ as usize,
            tag,
        });
        self.thread_mut(thread).wait = WaitKind::Arbitration;
        true
    }

    /// Hands the lock at `address` to the next waiter, or marks it unowned if there are none
    pub fn release_lock(&mut self, address: usize) {
        // safety: the caller holds the lock at address, so the word is alive
        let word = unsafe { user_word(address) };

        let Some(index) = self.arbiter.lock_waiters.iter().position(|waiter| waiter.address == address) else {
            word.store(Handle::INVALID.as_raw(), Ordering::Release);
            return;
        };

        let waiter = self.arbiter.lock_waiters.remove(index);
        let has_more_waiters = self.arbiter.lock_waiters.iter().any(|waiter| waiter.address == address);

        let next_value = if has_more_waiters {
            waiter.tag.as_raw() | HANDLE_WAIT_MASK
        } else {
            waiter.tag.as_raw()
        };
        word.store(next_value, Ordering::Release);

        self.wake(waiter.thread, WakeReason::Released);
    }

    /// Releases the lock at `address` and queues the current thread on the condition variable `key`
    pub fn queue_condition_variable_waiter(&mut self, thread: ThreadId, address: usize, key: &AtomicU32, tag: Handle) {
        key.store(1, Ordering::Release);
        self.release_lock(address);

        self.arbiter.condition_variable_waiters.push(ConditionVariableWaiter {
            thread,
            key: key as *const _ as usize,
            address,
            tag,
        });
        self.thread_mut(thread).wait = WaitKind::Arbitration;
    }

    /// Wakes up to `count` waiters on the condition variable `key`, or all of them if `count` is not positive
    ///
    /// Each woken waiter either gets its lock immediately or is moved into the lock's waiter queue
    pub fn signal_condition_variable(&mut self, key: &AtomicU32, count: i32) {
        let key_address = key as *const _ as usize;
        let mut woken = 0;

        while count <= 0 || woken < count {
            let Some(index) = self.arbiter.condition_variable_waiters.iter().position(|waiter| waiter.key == key_address) else {
                break;
            };
            let waiter = self.arbiter.condition_variable_waiters.remove(index);
            woken += 1;

            self.acquire_lock_for(waiter);
        }

        if !self.arbiter.condition_variable_waiters.iter().any(|waiter| waiter.key == key_address) {
            key.store(0, Ordering::Release);
        }
    }

    fn acquire_lock_for(&mut self, waiter: ConditionVariableWaiter) {
        // safety: the waiter is blocked with its lock word still alive
        let word = unsafe { user_word(waiter.address) };

        loop {
            let value = word.load(Ordering::Acquire);
            if value == Handle::INVALID.as_raw() {
                if word.compare_exchange(value, waiter.tag.as_raw(), Ordering::AcqRel, Ordering::Relaxed).is_ok() {
                    self.wake(waiter.thread, WakeReason::Released);
                    return;
                }
            } else if value & HANDLE_WAIT_MASK != 0
                || word.compare_exchange(value, value | HANDLE_WAIT_MASK, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
                self.arbiter.lock_waiters.push(LockWaiter {
                    thread: waiter.thread,
                    address: waiter.address,
                    tag: waiter.tag,
                });
                return;
            }
        }
    }

    /// Checks `word` against `value` as described by `kind`, and queues the thread if it should wait
    pub fn queue_address_waiter(
        &mut self,
        thread: ThreadId,
        word: &AtomicI32,
        kind: ArbitrationType,
        value: i32,
        poll: bool,
    ) -> KResult<()> {
        let should_wait = match kind {
            ArbitrationType::WaitIfLessThan => word.load(Ordering::Acquire) < value,
            ArbitrationType::DecrementAndWaitIfLessThan => word
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    if current < value {
                        Some(current.wrapping_sub(1))
                    } else {
                        None
                    }
                })
                .is_ok(),
            ArbitrationType::WaitIfEqual => word.load(Ordering::Acquire) == value,
        };

        if !should_wait {
            return Err(SysErr::InvalidState);
        }

        if poll {
            return Err(SysErr::TimedOut);
        }

        self.arbiter.address_waiters.push(AddressWaiter {
            thread,
            address: word as *const _ as usize,
        });
        self.thread_mut(thread).wait = WaitKind::Arbitration;
        Ok(())
    }

    /// Optionally updates `word` as described by `kind`, then wakes up to `count` threads waiting on it
    pub fn signal_address(&mut self, word: &AtomicI32, kind: SignalType, value: i32, count: i32) -> KResult<()> {
        let address = word as *const _ as usize;

        match kind {
            SignalType::Signal => (),
            SignalType::SignalAndIncrementIfEqual => {
                word.compare_exchange(value, value.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                    .map_err(|_| SysErr::InvalidState)?;
            },
            SignalType::SignalAndModifyByWaitingCountIfEqual => {
                let waiter_count = self.arbiter.address_waiter_count(address);
                let new_value = if waiter_count == 0 {
                    value.wrapping_add(1)
                } else if count <= 0 || waiter_count <= count as usize {
                    value.wrapping_sub(1)
                } else {
                    value
                };

                word.compare_exchange(value, new_value, Ordering::AcqRel, Ordering::Acquire)
                    .map_err(|_| SysErr::InvalidState)?;
            },
        }

        let mut woken = 0;
        while count <= 0 || woken < count {
            let Some(index) = self.arbiter.address_waiters.iter().position(|waiter| waiter.address == address) else {
                break;
            };
            let waiter = self.arbiter.address_waiters.remove(index);
            woken += 1;

            self.wake(waiter.thread, WakeReason::Released);
        }

        Ok(())
    }
}
