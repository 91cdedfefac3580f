//! Random placement of mappings in the process address space

use bit_utils::{Size, PAGE_SIZE};
use scopeguard::{guard, ScopeGuard};
use sys::{InfoType, KResult, MemoryPermission, MemoryState, SysErr};
use thiserror_no_std::Error;

use crate::config::{ASLR_GUARD_SIZE, LARGE_PAGE_SIZE, MAP_AT_RANDOM_ADDRESS_ATTEMPTS};
use crate::RngManager;

mod allocator;
pub use allocator::*;

#[derive(Debug, Error)]
pub enum AslrError {
    #[error("There is no free space in the aslr region where the mapping will fit")]
    OutOfAddressSpace,
    #[error("Syscall error when mapping memory: {0}")]
    Syscall(#[from] SysErr),
}

/// Queries the address space of the current process through the kernel
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelAddressSpace;

impl AddressSpaceQuery for KernelAddressSpace {
    fn is_free(&self, address: usize, size: usize) -> bool {
        let Some(end) = address.checked_add(size) else {
            return false;
        };

        match sys::query_memory(address) {
            Ok(info) => info.state == MemoryState::Free && end <= info.end_address(),
            Err(_) => false,
        }
    }
}

fn get_region_info(info: InfoType) -> KResult<usize> {
    Ok(sys::get_info(info, 0)? as usize)
}

/// Places mappings at random addresses in the aslr region of the current process
///
/// The heap and alias regions are never handed out.
#[derive(Debug)]
pub struct AslrSpaceManager {
    allocator: AddressSpaceAllocator<KernelAddressSpace>,
}

impl AslrSpaceManager {
    /// Reads the layout of the process address space from the kernel
    pub fn new() -> KResult<Self> {
        let aslr_start = get_region_info(InfoType::AslrRegionAddress)?;
        let aslr_size = get_region_info(InfoType::AslrRegionSize)?;

        let forbidden_regions = [
            ForbiddenRegion::new(
                get_region_info(InfoType::HeapRegionAddress)?,
                Size::from_bytes(get_region_info(InfoType::HeapRegionSize)?),
            ),
            ForbiddenRegion::new(
                get_region_info(InfoType::AliasRegionAddress)?,
                Size::from_bytes(get_region_info(InfoType::AliasRegionSize)?),
            ),
        ];

        log::debug!("aslr region is {aslr_start:#x} with size {aslr_size:#x}");

        Ok(AslrSpaceManager {
            allocator: AddressSpaceAllocator::new(
                KernelAddressSpace,
                aslr_start,
                aslr_start + aslr_size,
                ASLR_GUARD_SIZE,
                &forbidden_regions,
            ),
        })
    }

    pub fn allocator(&self) -> &AddressSpaceAllocator<KernelAddressSpace> {
        &self.allocator
    }

    /// Finds a random free address for a mapping of `size`
    ///
    /// Mappings of at least [`LARGE_PAGE_SIZE`] are placed at large page alignment
    /// plus `align_offset` if possible, everything else is page aligned.
    pub fn allocate_space(&self, rng: &RngManager, size: Size, align_offset: usize) -> Option<usize> {
        if size.bytes() >= LARGE_PAGE_SIZE {
            let large_offset = align_offset & (LARGE_PAGE_SIZE - 1);
            if let Some(address) = self.allocator.allocate_space(rng, size, LARGE_PAGE_SIZE, large_offset) {
                return Some(address);
            }
        }

        self.allocator.allocate_space(rng, size, PAGE_SIZE, 0)
    }

    pub fn check_guard_space(&self, address: usize, size: Size) -> bool {
        self.allocator.check_guard_space(address, size)
    }

    /// Maps `size` bytes at a random address using `map`, and returns the address
    ///
    /// An address is given up on when `map` fails with [`SysErr::InvalidCurrentMemory`], or when another
    /// mapping appeared in its guard space, in which case the new mapping is removed again with `unmap`.
    pub fn map_at_random_address<M, U>(
        &self,
        rng: &RngManager,
        size: Size,
        align_offset: usize,
        mut map: M,
        mut unmap: U,
    ) -> Result<usize, AslrError>
    where
        M: FnMut(usize, Size) -> KResult<()>,
        U: FnMut(usize, Size) -> KResult<()>,
    {
        for _ in 0..MAP_AT_RANDOM_ADDRESS_ATTEMPTS {
            let address = self.allocate_space(rng, size, align_offset)
                .ok_or(AslrError::OutOfAddressSpace)?;

            match map(address, size) {
                Ok(()) => (),
                Err(SysErr::InvalidCurrentMemory) => {
                    log::trace!("address {address:#x} was mapped by someone else, retrying");
                    continue;
                },
                Err(error) => return Err(error.into()),
            }

            let mapping = guard(&mut unmap, |unmap| {
                if let Err(error) = unmap(address, size) {
                    panic!("failed to unmap memory at {address:#x} after failed guard check: {error}");
                }
            });

            if !self.check_guard_space(address, size) {
                log::trace!("guard space of mapping at {address:#x} is no longer free, retrying");
                continue;
            }

            ScopeGuard::into_inner(mapping);
            return Ok(address);
        }

        log::debug!("failed to map {size} at a random address after {MAP_AT_RANDOM_ADDRESS_ATTEMPTS} attempts");
        Err(AslrError::OutOfAddressSpace)
    }

    /// Maps fresh memory of `size` at a random address
    pub fn map_memory(&self, rng: &RngManager, size: Size, permission: MemoryPermission) -> Result<usize, AslrError> {
        self.map_at_random_address(
            rng,
            size,
            0,
            |address, size| sys::map_memory(address, size, permission),
            sys::unmap_memory,
        )
    }
}
