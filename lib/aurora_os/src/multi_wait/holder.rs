use core::cell::Cell;
use core::fmt::{self, Debug, Formatter};
use core::ptr::NonNull;

use bit_utils::container::{ListLink, ListNode};
use sys::Handle;

use crate::sync::{
    Event,
    InterProcessEvent,
    InterruptEvent,
    MessageQueue,
    MessageQueueWaitType,
    Semaphore,
    SystemEvent,
    TimerEvent,
};
use crate::time::Tick;
use super::MultiWaitImpl;

pub(crate) struct MultiWaitTag;
pub(crate) struct ObjectListTag;

/// A boolean which may also be unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TriBool {
    True,
    False,
    /// Objects backed by a kernel handle only know if they are signaled by waiting on the handle
    Undefined,
}

impl From<bool> for TriBool {
    fn from(value: bool) -> Self {
        if value {
            TriBool::True
        } else {
            TriBool::False
        }
    }
}

/// The part of a [`MultiWaitHolder`] which is linked into lists
///
/// Objects only ever see this part, so they do not depend on the lifetime of the holder.
pub(crate) struct HolderNode {
    multi_wait_link: ListLink<HolderNode>,
    object_link: ListLink<HolderNode>,
    /// The multi wait this holder is linked to, `None` while unlinked
    engine: Cell<Option<NonNull<MultiWaitImpl>>>,
}

impl HolderNode {
    const fn new() -> Self {
        HolderNode {
            multi_wait_link: ListLink::new(),
            object_link: ListLink::new(),
            engine: Cell::new(None),
        }
    }

    pub(super) fn set_engine(&self, engine: Option<NonNull<MultiWaitImpl>>) {
        self.engine.set(engine);
    }

    /// Returns true if this node is linked to the multi wait whose shared part is `engine`
    pub(super) fn is_owned_by(&self, engine: &MultiWaitImpl) -> bool {
        self.engine.get() == Some(NonNull::from(engine))
    }

    fn engine(&self) -> Option<&MultiWaitImpl> {
        // safety: objects only reach the node while the owning engine waits, and every wait
        // stores the engine's current address before linking the node to an object
        self.engine.get().map(|engine| unsafe { engine.as_ref() })
    }

    /// Called with the object lock held when the object watched by this holder is signaled
    pub(crate) fn notify_signaled(&self) {
        if let Some(engine) = self.engine() {
            engine.notify(Some(NonNull::from(self)));
        }
    }

    /// Called with the object lock held when the wakeup time of the watched object changed
    pub(crate) fn notify_wakeup(&self) {
        if let Some(engine) = self.engine() {
            engine.notify(None);
        }
    }

    fn is_linked_anywhere(&self) -> bool {
        self.multi_wait_link.is_linked() || self.object_link.is_linked()
    }
}

impl ListNode<MultiWaitTag> for HolderNode {
    fn list_link(&self) -> &ListLink<Self> {
        &self.multi_wait_link
    }
}

impl ListNode<ObjectListTag> for HolderNode {
    fn list_link(&self) -> &ListLink<Self> {
        &self.object_link
    }
}

#[derive(Debug, Clone, Copy)]
enum HolderKind<'a> {
    Handle(Handle),
    Event(&'a Event),
    InterProcessEvent(&'a InterProcessEvent),
    InterruptEvent(&'a InterruptEvent),
    TimerEvent(&'a TimerEvent),
    Thread(Handle),
    Semaphore(&'a Semaphore),
    MessageQueueNotFull(&'a MessageQueue<'a>),
    MessageQueueNotEmpty(&'a MessageQueue<'a>),
}

/// One object watched by a [`MultiWait`](super::MultiWait)
///
/// A holder must stay linked to at most one multi wait,
/// and the borrow taken by the multi wait keeps it in place while linked.
#[repr(C)]
pub struct MultiWaitHolder<'a> {
    // must stay the first field, engines hand back holders by casting their node
    node: HolderNode,
    kind: HolderKind<'a>,
    user_data: Cell<usize>,
}

impl<'a> MultiWaitHolder<'a> {
    const fn new(kind: HolderKind<'a>) -> Self {
        MultiWaitHolder {
            node: HolderNode::new(),
            kind,
            user_data: Cell::new(0),
        }
    }

    /// Watches any waitable kernel handle
    pub const fn from_handle(handle: Handle) -> Self {
        Self::new(HolderKind::Handle(handle))
    }

    pub const fn from_event(event: &'a Event) -> Self {
        Self::new(HolderKind::Event(event))
    }

    pub const fn from_inter_process_event(event: &'a InterProcessEvent) -> Self {
        Self::new(HolderKind::InterProcessEvent(event))
    }

    pub fn from_system_event(event: &'a SystemEvent) -> Self {
        match event {
            SystemEvent::Event(event) => Self::from_event(event),
            SystemEvent::InterProcessEvent(event) => Self::from_inter_process_event(event),
        }
    }

    pub const fn from_interrupt_event(event: &'a InterruptEvent) -> Self {
        Self::new(HolderKind::InterruptEvent(event))
    }

    pub const fn from_timer_event(event: &'a TimerEvent) -> Self {
        Self::new(HolderKind::TimerEvent(event))
    }

    /// Watches a thread, which is signaled once it exits
    pub const fn from_thread(thread: Handle) -> Self {
        Self::new(HolderKind::Thread(thread))
    }

    pub const fn from_semaphore(semaphore: &'a Semaphore) -> Self {
        Self::new(HolderKind::Semaphore(semaphore))
    }

    pub const fn from_message_queue(queue: &'a MessageQueue<'a>, wait_type: MessageQueueWaitType) -> Self {
        Self::new(match wait_type {
            MessageQueueWaitType::ForNotFull => HolderKind::MessageQueueNotFull(queue),
            MessageQueueWaitType::ForNotEmpty => HolderKind::MessageQueueNotEmpty(queue),
        })
    }

    pub fn user_data(&self) -> usize {
        self.user_data.get()
    }

    pub fn set_user_data(&self, user_data: usize) {
        self.user_data.set(user_data);
    }

    /// Returns true if this holder is linked to a multi wait
    pub fn is_linked(&self) -> bool {
        self.node.multi_wait_link.is_linked()
    }

    pub(super) fn node(&self) -> &HolderNode {
        &self.node
    }

    /// Gets the holder a node belongs to
    ///
    /// # Safety
    ///
    /// `node` must be the node of a live holder which is valid for `'a`
    pub(super) unsafe fn from_node(node: NonNull<HolderNode>) -> &'a MultiWaitHolder<'a> {
        unsafe { &*(node.as_ptr() as *const MultiWaitHolder<'a>) }
    }

    pub(crate) fn is_signaled(&self) -> TriBool {
        match self.kind {
            HolderKind::Handle(_)
                | HolderKind::InterProcessEvent(_)
                | HolderKind::InterruptEvent(_)
                | HolderKind::Thread(_) => TriBool::Undefined,
            HolderKind::Event(event) => event.is_signaled_for_multi_wait().into(),
            HolderKind::TimerEvent(event) => event.is_signaled_for_multi_wait().into(),
            HolderKind::Semaphore(semaphore) => semaphore.is_signaled_for_multi_wait().into(),
            HolderKind::MessageQueueNotFull(queue) => {
                queue.is_signaled_for_multi_wait(MessageQueueWaitType::ForNotFull).into()
            },
            HolderKind::MessageQueueNotEmpty(queue) => {
                queue.is_signaled_for_multi_wait(MessageQueueWaitType::ForNotEmpty).into()
            },
        }
    }

    /// Registers this holder with the watched object, returning whether it is already signaled
    pub(crate) fn link_to_object_list(&self) -> TriBool {
        match self.kind {
            HolderKind::Handle(_)
                | HolderKind::InterProcessEvent(_)
                | HolderKind::InterruptEvent(_)
                | HolderKind::Thread(_) => TriBool::Undefined,
            HolderKind::Event(event) => event.link_multi_wait_holder(&self.node).into(),
            HolderKind::TimerEvent(event) => event.link_multi_wait_holder(&self.node).into(),
            HolderKind::Semaphore(semaphore) => semaphore.link_multi_wait_holder(&self.node).into(),
            HolderKind::MessageQueueNotFull(queue) => {
                queue.link_multi_wait_holder(&self.node, MessageQueueWaitType::ForNotFull).into()
            },
            HolderKind::MessageQueueNotEmpty(queue) => {
                queue.link_multi_wait_holder(&self.node, MessageQueueWaitType::ForNotEmpty).into()
            },
        }
    }

    pub(crate) fn unlink_from_object_list(&self) {
        match self.kind {
            HolderKind::Handle(_)
                | HolderKind::InterProcessEvent(_)
                | HolderKind::InterruptEvent(_)
                | HolderKind::Thread(_) => (),
            HolderKind::Event(event) => event.unlink_multi_wait_holder(&self.node),
            HolderKind::TimerEvent(event) => event.unlink_multi_wait_holder(&self.node),
            HolderKind::Semaphore(semaphore) => semaphore.unlink_multi_wait_holder(&self.node),
            HolderKind::MessageQueueNotFull(queue) => {
                queue.unlink_multi_wait_holder(&self.node, MessageQueueWaitType::ForNotFull)
            },
            HolderKind::MessageQueueNotEmpty(queue) => {
                queue.unlink_multi_wait_holder(&self.node, MessageQueueWaitType::ForNotEmpty)
            },
        }
    }

    /// The kernel handle to wait on for this holder, if the object has one
    pub(crate) fn native_handle(&self) -> Option<Handle> {
        match self.kind {
            HolderKind::Handle(handle) | HolderKind::Thread(handle) => Some(handle),
            HolderKind::InterProcessEvent(event) => Some(event.readable_handle()),
            HolderKind::InterruptEvent(event) => Some(event.handle()),
            HolderKind::Event(_)
                | HolderKind::TimerEvent(_)
                | HolderKind::Semaphore(_)
                | HolderKind::MessageQueueNotFull(_)
                | HolderKind::MessageQueueNotEmpty(_) => None,
        }
    }

    /// The time at which this holder becomes signaled without any other thread signaling it
    pub(crate) fn wakeup_time(&self) -> Tick {
        match self.kind {
            HolderKind::TimerEvent(event) => event.wakeup_time_for_multi_wait(),
            _ => Tick::MAX,
        }
    }
}

impl Debug for MultiWaitHolder<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiWaitHolder")
            .field("kind", &self.kind)
            .field("user_data", &self.user_data.get())
            .field("linked", &self.is_linked())
            .finish()
    }
}

impl Drop for MultiWaitHolder<'_> {
    fn drop(&mut self) {
        assert!(!self.node.is_linked_anywhere(), "multi wait holder dropped while linked");
    }
}
