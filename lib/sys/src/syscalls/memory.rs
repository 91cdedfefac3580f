use bit_utils::Size;

use crate::config::*;
use crate::kernel::KERNEL;
use crate::{InfoType, KResult, MemoryPermission, MemoryState, SysErr};

/// Describes the block of memory containing a queried address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub address: usize,
    pub size: Size,
    pub state: MemoryState,
    pub permission: MemoryPermission,
}

impl MemoryInfo {
    pub fn end_address(&self) -> usize {
        self.address.saturating_add(self.size.bytes())
    }
}

/// Returns information about the block of memory which contains `address`
pub fn query_memory(address: usize) -> KResult<MemoryInfo> {
    Ok(KERNEL.lock().memory.query(address))
}

/// Maps `size` bytes of fresh memory at `address`
///
/// # Errors
///
/// - [`SysErr::InvalidAddress`]: `address` is not page aligned
/// - [`SysErr::InvalidSize`]: `size` is zero or not page aligned
/// - [`SysErr::InvalidCurrentMemory`]: part of the range is not free
pub fn map_memory(address: usize, size: Size, permission: MemoryPermission) -> KResult<()> {
    KERNEL.lock().memory.map(address, size, MemoryState::Normal, permission)
}

/// Unmaps a mapping previously made with [`map_memory`]
pub fn unmap_memory(address: usize, size: Size) -> KResult<()> {
    KERNEL.lock().memory.unmap(address, size)
}

/// Retrieves process information from the kernel
///
/// `sub_id` must be 0 except for [`InfoType::RandomEntropy`], where it selects one of the 4 entropy words
pub fn get_info(info: InfoType, sub_id: u64) -> KResult<u64> {
    if info != InfoType::RandomEntropy && sub_id != 0 {
        return Err(SysErr::InvalidCombination);
    }

    let value = match info {
        InfoType::RandomEntropy => return KERNEL.entropy(sub_id as usize),
        InfoType::AliasRegionAddress => ALIAS_REGION_START,
        InfoType::AliasRegionSize => ALIAS_REGION_SIZE,
        InfoType::HeapRegionAddress => HEAP_REGION_START,
        InfoType::HeapRegionSize => HEAP_REGION_SIZE,
        InfoType::AslrRegionAddress => ASLR_REGION_START,
        InfoType::AslrRegionSize => ASLR_REGION_END - ASLR_REGION_START,
    };

    Ok(value as u64)
}
