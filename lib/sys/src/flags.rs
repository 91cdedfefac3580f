//! Flags and argument enums used by some kernel syscalls

use bitflags::bitflags;
use strum::FromRepr;

bitflags! {
    /// Used to specify access permissions on memory mappings
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPermission: u32 {
        const READ = 1;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

impl Default for MemoryPermission {
    fn default() -> Self {
        Self::READ | Self::WRITE
    }
}

/// State of a region of virtual memory as reported by [`query_memory`](crate::query_memory)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(u32)]
pub enum MemoryState {
    Free = 0,
    Io = 1,
    Static = 2,
    Code = 3,
    Normal = 5,
    Alias = 8,
    Stack = 11,
    Transfered = 13,
    /// Memory which can never be mapped by the process
    Inaccessible = 16,
}

/// How [`wait_for_address`](crate::wait_for_address) decides if the calling thread should wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum ArbitrationType {
    /// Wait if the value is less than the argument
    WaitIfLessThan = 0,
    /// Decrement the value and wait if it was less than the argument
    DecrementAndWaitIfLessThan = 1,
    /// Wait if the value is equal to the argument
    WaitIfEqual = 2,
}

/// What [`signal_to_address`](crate::signal_to_address) does to the value before waking threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum SignalType {
    /// Only wake threads
    Signal = 0,
    /// If the value is equal to the argument, increment it and wake threads
    SignalAndIncrementIfEqual = 1,
    /// If the value is equal to the argument, adjust it by how many threads remain waiting and wake threads
    /// 
    /// With no waiting threads the value is incremented, if every waiting thread is woken the value is decremented,
    /// otherwise it is left unchanged
    SignalAndModifyByWaitingCountIfEqual = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum InterruptType {
    Edge = 0,
    Level = 1,
}

/// Information that can be retrieved with [`get_info`](crate::get_info)
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u32)]
pub enum InfoType {
    AliasRegionAddress = 2,
    AliasRegionSize = 3,
    HeapRegionAddress = 4,
    HeapRegionSize = 5,
    /// Sub id selects one of 4 64 bit entropy words
    RandomEntropy = 11,
    AslrRegionAddress = 12,
    AslrRegionSize = 13,
}
