//! Compile time limits and tuning constants

use bit_utils::Size;

/// How many random candidates [`AddressSpaceAllocator`](crate::addr_space::AddressSpaceAllocator) tries before giving up
pub const ALLOCATE_SPACE_ATTEMPTS: usize = 512;

/// How many times [`AslrSpaceManager::map_at_random_address`](crate::addr_space::AslrSpaceManager::map_at_random_address)
/// picks a new address after a failed mapping
pub const MAP_AT_RANDOM_ADDRESS_ATTEMPTS: usize = 64;

/// Unmapped space kept on both sides of every randomly placed mapping
pub const ASLR_GUARD_SIZE: Size = Size::from_pages(4);

/// Mappings at least this large are first placed at this alignment
pub const LARGE_PAGE_SIZE: usize = bit_utils::LARGE_PAGE_SIZE;

/// Maximum number of kernel handles a multi wait can wait on at once
pub const MULTI_WAIT_MAX_HANDLES: usize = sys::config::ARGUMENT_HANDLE_COUNT_MAX;

/// Maximum number of read locks held on a [`ReaderWriterLock`](crate::sync::ReaderWriterLock) at once
pub const READER_WRITER_LOCK_COUNT_MAX: u64 = (1 << 15) - 1;

/// Maximum number of readers or writers waiting on a [`ReaderWriterLock`](crate::sync::ReaderWriterLock) at once
pub const READER_WRITER_LOCK_WAITER_COUNT_MAX: u64 = (1 << 8) - 1;

/// Maximum nesting depth of a recursive mutex or write lock
pub const MUTEX_RECURSIVE_LOCK_COUNT_MAX: u32 = u16::MAX as u32;
