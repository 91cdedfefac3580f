use core::fmt::{self, Debug, Formatter};
use core::ptr::NonNull;

use bit_utils::container::LinkedList;

use super::holder::{HolderNode, ObjectListTag};

/// The holders of every multi wait currently waiting on a user space object
///
/// Only touched while the owning object's lock is held.
pub(crate) struct MultiWaitObjectList {
    holders: LinkedList<HolderNode, ObjectListTag>,
}

// the list only points to holders which are linked for the duration of a wait,
// and every access goes through the lock of the object owning the list
unsafe impl Send for MultiWaitObjectList {}

impl MultiWaitObjectList {
    pub const fn new() -> Self {
        MultiWaitObjectList {
            holders: LinkedList::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// Tells every waiting multi wait that the object was signaled through the holder watching it
    pub fn signal_all_threads(&self) {
        for holder in self.holders.iter() {
            holder.notify_signaled();
        }
    }

    /// Wakes every waiting multi wait without signaling any holder, so they recalculate their timeouts
    pub fn broadcast_all_threads(&self) {
        for holder in self.holders.iter() {
            holder.notify_wakeup();
        }
    }

    pub fn link(&mut self, holder: &HolderNode) {
        // safety: a holder is only linked while its multi wait is waiting,
        // and the multi wait borrows the holder for longer than that
        unsafe { self.holders.push(NonNull::from(holder)) };
    }

    pub fn unlink(&mut self, holder: &HolderNode) {
        // safety: holders are unlinked from the same object list they were linked to
        unsafe { self.holders.remove(NonNull::from(holder)) };
    }
}

impl Default for MultiWaitObjectList {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for MultiWaitObjectList {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiWaitObjectList")
            .field("holder_count", &self.holders.len())
            .finish()
    }
}

impl Drop for MultiWaitObjectList {
    fn drop(&mut self) {
        assert!(self.holders.is_empty(), "object dropped while a multi wait is waiting on it");
    }
}
