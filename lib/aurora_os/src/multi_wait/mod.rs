//! Waiting on many heterogeneous objects at once
//!
//! A [`MultiWait`] holds a list of [`MultiWaitHolder`]s. Holders for objects backed by a kernel handle
//! are waited on with one kernel wait, while holders for user space objects register themselves with the
//! object for the duration of the wait. Signaling such an object records the holder in the waiting engine
//! and cancels the engine's kernel wait, so the waiting thread notices.

use core::marker::PhantomData;
use core::ptr::NonNull;
use core::time::Duration;

use bit_utils::container::LinkedList;
use scopeguard::defer;
use sys::{Handle, KResult, SysErr};

use crate::config::MULTI_WAIT_MAX_HANDLES;
use crate::sync::Mutex;
use crate::time::{timeout_nsec, Tick, WAIT_INFINITE};

mod holder;
pub use holder::MultiWaitHolder;
pub(crate) use holder::HolderNode;
use holder::{MultiWaitTag, TriBool};
mod object_list;
pub(crate) use object_list::MultiWaitObjectList;

#[derive(Debug)]
struct EngineState {
    /// The first holder signaled during the current wait
    signaled_holder: Option<NonNull<HolderNode>>,
    /// Thread to cancel when a user space object is signaled
    waiting_thread: Handle,
}

// the signaled holder is only dereferenced by the waiting thread, which owns the holders
unsafe impl Send for EngineState {}

/// The part of a multi wait which other threads reach through holders
///
/// Lock order is the object's lock first, then the engine lock.
#[derive(Debug)]
pub(crate) struct MultiWaitImpl {
    state: Mutex<EngineState>,
}

impl MultiWaitImpl {
    const fn new() -> Self {
        MultiWaitImpl {
            state: Mutex::new(EngineState {
                signaled_holder: None,
                waiting_thread: Handle::INVALID,
            }),
        }
    }

    /// Records `holder` as the signaled holder if there is none yet, and cancels the kernel wait of the waiting thread
    ///
    /// With `None` only the kernel wait is cancelled, so the waiting thread recalculates its timeout.
    pub(crate) fn notify(&self, holder: Option<NonNull<HolderNode>>) {
        let mut state = self.state.lock();
        if state.signaled_holder.is_some() {
            return;
        }

        state.signaled_holder = holder;
        if let Err(error) = sys::cancel_synchronization(state.waiting_thread) {
            panic!("failed to cancel multi wait: {error}");
        }
    }

    fn begin_wait(&self) {
        let mut state = self.state.lock();
        state.signaled_holder = None;
        state.waiting_thread = sys::get_current_thread_handle();
    }

    fn end_wait(&self) {
        self.state.lock().waiting_thread = Handle::INVALID;
    }

    fn signaled_holder(&self) -> Option<NonNull<HolderNode>> {
        self.state.lock().signaled_holder
    }

    fn set_signaled_holder(&self, holder: NonNull<HolderNode>) {
        self.state.lock().signaled_holder = Some(holder);
    }
}

/// How a kernel wait in the wait loop ended
enum WaitResult {
    Index(usize),
    TimedOut,
    Cancelled,
}

/// Waits for any one of a set of [`MultiWaitHolder`]s to be signaled
///
/// Only the thread which owns the multi wait may link and unlink holders or wait on it,
/// any thread may signal the objects being waited on.
///
/// Linked holders point back to the multi wait, so it must not be moved while holders are linked.
/// A wait updates the holders to the current address.
pub struct MultiWait<'a> {
    holders: LinkedList<HolderNode, MultiWaitTag>,
    inner: MultiWaitImpl,
    _holders: PhantomData<&'a MultiWaitHolder<'a>>,
}

impl<'a> MultiWait<'a> {
    pub const fn new() -> Self {
        MultiWait {
            holders: LinkedList::new(),
            inner: MultiWaitImpl::new(),
            _holders: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    /// # Panics
    ///
    /// panics if `holder` is already linked to a multi wait
    pub fn link(&mut self, holder: &'a MultiWaitHolder<'a>) {
        assert!(!holder.is_linked(), "multi wait holder is already linked");
        holder.node().set_engine(Some(NonNull::from(&self.inner)));
        // safety: the holder is borrowed for as long as the multi wait may refer to it
        unsafe { self.holders.push(NonNull::from(holder.node())) };
    }

    /// # Panics
    ///
    /// panics if `holder` is not linked to this multi wait
    pub fn unlink(&mut self, holder: &MultiWaitHolder<'_>) {
        let node = holder.node();
        assert!(node.is_owned_by(&self.inner), "multi wait holder is not linked to this multi wait");
        // safety: the node is owned by this multi wait, so it is in this list
        unsafe { self.holders.remove(NonNull::from(node)) };
        node.set_engine(None);
    }

    pub fn unlink_all(&mut self) {
        while let Some(node) = self.holders.pop_front() {
            // safety: every node in the list belongs to a holder borrowed for 'a
            unsafe { node.as_ref() }.set_engine(None);
        }
    }

    /// Moves every holder linked to `other` to the end of this multi wait
    pub fn move_all_from(&mut self, other: &mut MultiWait<'a>) {
        let engine = NonNull::from(&self.inner);
        for node in other.holders.iter() {
            node.set_engine(Some(engine));
        }
        self.holders.append(&mut other.holders);
    }

    pub fn holders(&self) -> impl Iterator<Item = &'a MultiWaitHolder<'a>> + '_ {
        // safety: every node in the list belongs to a holder borrowed for 'a
        self.holders.iter().map(|node| unsafe { MultiWaitHolder::from_node(NonNull::from(node)) })
    }

    /// Blocks until one of the linked holders is signaled and returns it
    pub fn wait_any(&self) -> &'a MultiWaitHolder<'a> {
        loop {
            match self.wait_any_impl(None, None) {
                Ok(Some(holder)) => return holder,
                Ok(None) => (),
                Err(error) => panic!("multi wait failed: {error}"),
            }
        }
    }

    /// Returns a signaled holder if any are signaled right now
    pub fn try_wait_any(&self) -> Option<&'a MultiWaitHolder<'a>> {
        self.timed_wait_any(Duration::ZERO)
    }

    /// Returns the first holder signaled before `timeout` passes
    pub fn timed_wait_any(&self, timeout: Duration) -> Option<&'a MultiWaitHolder<'a>> {
        match self.wait_any_impl(Some(timeout), None) {
            Ok(holder) => holder,
            Err(error) => panic!("multi wait failed: {error}"),
        }
    }

    /// Replies to the ipc request received on `reply_target` and waits for any holder to be signaled
    ///
    /// Pass [`Handle::INVALID`] to only wait. Errors from the ipc reply are returned to the caller.
    pub fn reply_and_receive(&self, reply_target: Handle) -> KResult<&'a MultiWaitHolder<'a>> {
        let mut reply_target = reply_target;
        loop {
            if let Some(holder) = self.wait_any_impl(None, Some(reply_target))? {
                return Ok(holder);
            }
            reply_target = Handle::INVALID;
        }
    }

    fn wait_any_impl(
        &self,
        timeout: Option<Duration>,
        reply_target: Option<Handle>,
    ) -> KResult<Option<&'a MultiWaitHolder<'a>>> {
        self.inner.begin_wait();
        defer! {
            self.unlink_holders_from_object_lists();
            self.inner.end_wait();
        }

        let mut signaled_holder = self.link_holders_to_object_lists();

        // an object may have been signaled after its holder was linked
        if let Some(holder) = self.inner.signaled_holder() {
            signaled_holder = Some(holder);
        }

        let signaled_holder = match signaled_holder {
            Some(holder) => {
                // the reply still has to be sent even though nothing is waited on
                if let Some(target) = reply_target.filter(Handle::is_valid) {
                    match sys::reply_and_receive(&[], target, 0) {
                        Ok(_) | Err(SysErr::TimedOut) | Err(SysErr::Cancelled) => (),
                        Err(error) => return Err(error),
                    }
                }
                Some(holder)
            },
            None => self.wait_any_handle(timeout, reply_target)?,
        };

        // safety: every node in the list belongs to a holder borrowed for 'a
        Ok(signaled_holder.map(|node| unsafe { MultiWaitHolder::from_node(node) }))
    }

    fn wait_any_handle(
        &self,
        timeout: Option<Duration>,
        reply_target: Option<Handle>,
    ) -> KResult<Option<NonNull<HolderNode>>> {
        let mut handles = [Handle::INVALID; MULTI_WAIT_MAX_HANDLES];
        let mut objects = [None; MULTI_WAIT_MAX_HANDLES];
        let handle_count = self.build_handle_array(&mut handles, &mut objects);
        let handles = &handles[..handle_count];

        let end_time = match timeout {
            Some(timeout) => Tick::now() + timeout,
            None => Tick::MAX,
        };
        let mut reply_target = reply_target;

        loop {
            let now = Tick::now();
            let (min_timeout_object, min_timeout) = self.recalc_timeout(now, end_time);
            let has_deadline = timeout.is_some() || min_timeout_object.is_some();

            let wait_result = match reply_target {
                Some(target) => {
                    let timeout_nsec = if has_deadline { timeout_nsec(min_timeout) } else { WAIT_INFINITE };
                    sys::reply_and_receive(handles, target, timeout_nsec)
                },
                None if !has_deadline => sys::wait_synchronization(handles, WAIT_INFINITE),
                // nothing can be signaled in the kernel and the deadline is already here
                None if handles.is_empty() && min_timeout.is_zero() => Err(SysErr::TimedOut),
                None => sys::wait_synchronization(handles, timeout_nsec(min_timeout)),
            };

            let wait_result = match wait_result {
                Ok(index) => WaitResult::Index(index),
                Err(SysErr::TimedOut) => WaitResult::TimedOut,
                Err(SysErr::Cancelled) => WaitResult::Cancelled,
                Err(error) if reply_target.is_some() => return Err(error),
                Err(error) => panic!("failed to wait on multi wait handles: {error}"),
            };

            match wait_result {
                WaitResult::Index(index) => {
                    let Some(holder) = objects.get(index).copied().flatten() else {
                        panic!("kernel returned invalid multi wait index {index}");
                    };
                    self.inner.set_signaled_holder(holder);
                    return Ok(Some(holder));
                },
                WaitResult::TimedOut => match min_timeout_object {
                    Some(holder) => {
                        // safety: every node in the list belongs to a holder borrowed for 'a
                        if unsafe { MultiWaitHolder::from_node(holder) }.is_signaled() == TriBool::True {
                            self.inner.set_signaled_holder(holder);
                            return Ok(Some(holder));
                        }
                    },
                    None => return Ok(None),
                },
                WaitResult::Cancelled => {
                    if let Some(holder) = self.inner.signaled_holder() {
                        return Ok(Some(holder));
                    }
                    log::trace!("multi wait cancelled without a signaled holder");
                },
            }

            reply_target = reply_target.map(|_| Handle::INVALID);
        }
    }

    fn link_holders_to_object_lists(&self) -> Option<NonNull<HolderNode>> {
        let engine = NonNull::from(&self.inner);
        let mut signaled_holder = None;

        for node in self.holders.iter() {
            // the engine is refreshed first so a signal right after linking reaches it
            node.set_engine(Some(engine));

            // safety: every node in the list belongs to a holder borrowed for 'a
            let holder = unsafe { MultiWaitHolder::from_node(NonNull::from(node)) };
            if holder.link_to_object_list() == TriBool::True && signaled_holder.is_none() {
                signaled_holder = Some(NonNull::from(node));
            }
        }

        signaled_holder
    }

    fn unlink_holders_from_object_lists(&self) {
        for node in self.holders.iter() {
            // safety: every node in the list belongs to a holder borrowed for 'a
            let holder = unsafe { MultiWaitHolder::from_node(NonNull::from(node)) };
            holder.unlink_from_object_list();
        }
    }

    fn build_handle_array(
        &self,
        handles: &mut [Handle; MULTI_WAIT_MAX_HANDLES],
        objects: &mut [Option<NonNull<HolderNode>>; MULTI_WAIT_MAX_HANDLES],
    ) -> usize {
        let mut count = 0;

        for node in self.holders.iter() {
            // safety: every node in the list belongs to a holder borrowed for 'a
            let holder = unsafe { MultiWaitHolder::from_node(NonNull::from(node)) };
            if let Some(handle) = holder.native_handle() {
                assert!(count < MULTI_WAIT_MAX_HANDLES, "too many kernel handles linked to multi wait");
                handles[count] = handle;
                objects[count] = Some(NonNull::from(node));
                count += 1;
            }
        }

        count
    }

    /// Finds the holder which wakes up on its own before `end_time`, and how long until the earliest wakeup
    fn recalc_timeout(&self, now: Tick, end_time: Tick) -> (Option<NonNull<HolderNode>>, Duration) {
        let mut min_timeout_object = None;
        let mut min_time = end_time;

        for node in self.holders.iter() {
            // safety: every node in the list belongs to a holder borrowed for 'a
            let holder = unsafe { MultiWaitHolder::from_node(NonNull::from(node)) };
            let wakeup_time = holder.wakeup_time();
            if wakeup_time < min_time {
                min_timeout_object = Some(NonNull::from(node));
                min_time = wakeup_time;
            }
        }

        (min_timeout_object, min_time.saturating_duration_since(now))
    }
}

impl Default for MultiWait<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MultiWait<'_> {
    fn drop(&mut self) {
        assert!(self.holders.is_empty(), "multi wait dropped with holders still linked");
    }
}
