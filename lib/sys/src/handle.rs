use core::fmt;

use bytemuck::{Pod, Zeroable};

/// Set in an arbitrated lock word when other threads are waiting for the lock
pub const HANDLE_WAIT_MASK: u32 = 0x4000_0000;

/// A reference to a kernel object in the current process's handle table
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct Handle(u32);

impl Handle {
    pub const INVALID: Handle = Handle(0);

    pub const fn from_raw(raw: u32) -> Self {
        Handle(raw)
    }

    pub const fn as_raw(&self) -> u32 {
        self.0
    }

    pub const fn is_valid(&self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.0)
    }
}
