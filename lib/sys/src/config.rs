//! Constants describing the emulated kernel and its process address space

use bit_utils::PAGE_SIZE;

/// Maximum number of handles which may be passed to a single synchronization syscall
pub const ARGUMENT_HANDLE_COUNT_MAX: usize = 0x40;

/// Frequency of the counter returned by [`get_system_tick`](crate::get_system_tick)
pub const SYSTEM_TICK_FREQUENCY: u64 = 19_200_000;

/// Start of the region of the address space where user mappings may be placed
pub const ASLR_REGION_START: usize = 0x800_0000;
/// Exclusive end of the region of the address space where user mappings may be placed
pub const ASLR_REGION_END: usize = 0x80_0000_0000;

pub const HEAP_REGION_START: usize = 0x8_0000_0000;
pub const HEAP_REGION_SIZE: usize = 0x10_0000_0000;

pub const ALIAS_REGION_START: usize = 0x40_0000_0000;
pub const ALIAS_REGION_SIZE: usize = 0x10_0000_0000;

/// Maximum number of handles a process may have open at once
pub const HANDLE_TABLE_SIZE: usize = 0x10000;

/// Largest value a handle can take, handles never have [`HANDLE_WAIT_MASK`](crate::HANDLE_WAIT_MASK) set
pub const HANDLE_VALUE_MAX: u32 = 0x3fff_ffff;

/// Every mapping must be aligned to this
pub const MEMORY_PAGE_SIZE: usize = PAGE_SIZE;
