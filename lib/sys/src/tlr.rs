use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

/// The part of a thread's kernel thread local region which user code reads and writes directly
/// 
/// While `disable_count` is non zero the kernel defers preempting the thread and sets `interrupt_flag` instead,
/// the thread must call [`synchronize_preemption_state`](crate::synchronize_preemption_state)
/// once it drops `disable_count` back to zero with `interrupt_flag` set
#[derive(Debug, Default)]
#[repr(C)]
pub struct ThreadLocalRegion {
    pub disable_count: AtomicU16,
    pub interrupt_flag: AtomicBool,
}

impl ThreadLocalRegion {
    pub const fn new() -> Self {
        ThreadLocalRegion {
            disable_count: AtomicU16::new(0),
            interrupt_flag: AtomicBool::new(false),
        }
    }

    pub fn disable_count(&self) -> u16 {
        self.disable_count.load(Ordering::Relaxed)
    }

    pub fn interrupt_flag(&self) -> bool {
        self.interrupt_flag.load(Ordering::Acquire)
    }
}
