use std::collections::BTreeMap;
use std::ops::Bound;

use bit_utils::{page_aligned, Size};

use crate::config::{ASLR_REGION_END, ASLR_REGION_START};
use crate::{KResult, MemoryInfo, MemoryPermission, MemoryState, SysErr};

#[derive(Debug, Clone, Copy)]
struct MappedBlock {
    size: usize,
    state: MemoryState,
    permission: MemoryPermission,
}

/// Bookkeeping of which parts of the process address space are mapped
///
/// Only the aslr region can hold mappings, everything outside of it reports as inaccessible
#[derive(Debug, Default)]
pub(crate) struct VirtualMemory {
    blocks: BTreeMap<usize, MappedBlock>,
}

impl VirtualMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self, address: usize) -> MemoryInfo {
        if address < ASLR_REGION_START {
            return MemoryInfo {
                address: 0,
                size: Size::from_bytes(ASLR_REGION_START),
                state: MemoryState::Inaccessible,
                permission: MemoryPermission::empty(),
            };
        } else if address >= ASLR_REGION_END {
            return MemoryInfo {
                address: ASLR_REGION_END,
                size: Size::from_bytes(usize::MAX - ASLR_REGION_END),
                state: MemoryState::Inaccessible,
                permission: MemoryPermission::empty(),
            };
        }

        let previous = self.blocks.range(..=address).next_back();
        if let Some((&base, block)) = previous {
            if address < base + block.size {
                return MemoryInfo {
                    address: base,
                    size: Size::from_bytes(block.size),
                    state: block.state,
                    permission: block.permission,
                };
            }
        }

        let free_start = previous.map_or(ASLR_REGION_START, |(&base, block)| base + block.size);
        let free_end = self.blocks.range((Bound::Excluded(address), Bound::Unbounded))
            .next()
            .map_or(ASLR_REGION_END, |(&base, _)| base);

        MemoryInfo {
            address: free_start,
            size: Size::from_bytes(free_end - free_start),
            state: MemoryState::Free,
            permission: MemoryPermission::empty(),
        }
    }

    fn is_free(&self, address: usize, size: usize) -> bool {
        let info = self.query(address);
        info.state == MemoryState::Free && address + size <= info.address + info.size.bytes()
    }

    pub fn map(&mut self, address: usize, size: Size, state: MemoryState, permission: MemoryPermission) -> KResult<()> {
        if !page_aligned(address) {
            return Err(SysErr::InvalidAddress);
        }
        if size.is_zero() || !size.is_page_aligned() {
            return Err(SysErr::InvalidSize);
        }
        address.checked_add(size.bytes()).ok_or(SysErr::InvalidCurrentMemory)?;

        if !self.is_free(address, size.bytes()) {
            return Err(SysErr::InvalidCurrentMemory);
        }

        self.blocks.insert(address, MappedBlock {
            size: size.bytes(),
            state,
            permission,
        });
        Ok(())
    }

    pub fn unmap(&mut self, address: usize, size: Size) -> KResult<()> {
        if !page_aligned(address) {
            return Err(SysErr::InvalidAddress);
        }

        match self.blocks.get(&address) {
            Some(block) if block.size == size.bytes() => {
                self.blocks.remove(&address);
                Ok(())
            },
            _ => Err(SysErr::InvalidCurrentMemory),
        }
    }
}
