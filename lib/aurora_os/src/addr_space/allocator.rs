use core::ops::Range;

use bit_utils::{align_down, is_aligned, page_aligned, Size, PAGE_SIZE};

use crate::config::ALLOCATE_SPACE_ATTEMPTS;
use crate::RngManager;

/// Maximum number of forbidden regions an [`AddressSpaceAllocator`] can exclude
pub const MAX_FORBIDDEN_REGIONS: usize = 2;

/// Answers whether parts of an address space are currently unmapped
pub trait AddressSpaceQuery {
    /// Returns true if nothing is mapped in `address..address + size`
    fn is_free(&self, address: usize, size: usize) -> bool;
}

/// A range of the address space an allocator must never hand out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForbiddenRegion {
    pub address: usize,
    pub size: Size,
}

impl ForbiddenRegion {
    pub const fn new(address: usize, size: Size) -> Self {
        ForbiddenRegion { address, size }
    }
}

/// Picks random free ranges of pages inside a bounded region of an address space
///
/// Every range handed out keeps `guard_size` of unmapped space on both sides,
/// and never comes within `guard_size` of a forbidden region.
#[derive(Debug)]
pub struct AddressSpaceAllocator<Q> {
    query: Q,
    start_page: usize,
    end_page: usize,
    guard_page_count: usize,
    /// Forbidden regions in pages, already grown by the guard size on both sides
    forbidden_pages: [Option<Range<usize>>; MAX_FORBIDDEN_REGIONS],
}

impl<Q: AddressSpaceQuery> AddressSpaceAllocator<Q> {
    /// Creates an allocator for `start..end`
    ///
    /// # Panics
    ///
    /// panics if any address or size is not page aligned, if a forbidden region grown by the guard size
    /// does not fit inside `start..end`, if forbidden regions overlap, or if there are more than
    /// [`MAX_FORBIDDEN_REGIONS`] of them
    pub fn new(query: Q, start: usize, end: usize, guard_size: Size, forbidden_regions: &[ForbiddenRegion]) -> Self {
        assert!(page_aligned(start) && page_aligned(end), "address space allocator bounds must be page aligned");
        assert!(start < end, "address space allocator region is empty");
        assert!(guard_size.is_page_aligned(), "address space allocator guard size must be page aligned");
        assert!(
            forbidden_regions.len() <= MAX_FORBIDDEN_REGIONS,
            "address space allocator supports at most {MAX_FORBIDDEN_REGIONS} forbidden regions",
        );

        let start_page = start / PAGE_SIZE;
        let end_page = end / PAGE_SIZE;
        let guard_page_count = guard_size.pages_rounded();

        let mut forbidden_pages: [Option<Range<usize>>; MAX_FORBIDDEN_REGIONS] = Default::default();
        for (slot, region) in forbidden_pages.iter_mut().zip(forbidden_regions) {
            assert!(
                page_aligned(region.address) && region.size.is_page_aligned(),
                "forbidden region {region:?} is not page aligned",
            );

            let region_start = region.address / PAGE_SIZE;
            let region_end = region_start + region.size.pages_rounded();
            let pages = region_start.checked_sub(guard_page_count)
                .zip(region_end.checked_add(guard_page_count))
                .map(|(start, end)| start..end)
                .filter(|pages| pages.start >= start_page && pages.end <= end_page);

            match pages {
                Some(pages) => *slot = Some(pages),
                None => panic!("forbidden region {region:?} with its guard pages is outside of the allocator region"),
            }
        }

        if let [Some(first), Some(second)] = &forbidden_pages {
            assert!(
                first.end <= second.start || second.end <= first.start,
                "forbidden regions of address space allocator overlap",
            );
        }

        AddressSpaceAllocator {
            query,
            start_page,
            end_page,
            guard_page_count,
            forbidden_pages,
        }
    }

    pub fn query(&self) -> &Q {
        &self.query
    }

    pub fn start_address(&self) -> usize {
        self.start_page * PAGE_SIZE
    }

    pub fn end_address(&self) -> usize {
        self.end_page * PAGE_SIZE
    }

    pub fn guard_size(&self) -> Size {
        Size::from_pages(self.guard_page_count)
    }

    fn is_forbidden(&self, pages: &Range<usize>) -> bool {
        self.forbidden_pages.iter()
            .flatten()
            .any(|forbidden| pages.start < forbidden.end && forbidden.start < pages.end)
    }

    /// Finds a random free range of `size` bytes with an address congruent to `align_offset` modulo `align`
    ///
    /// Returns `None` if the range can not fit in the region at all, or if no free candidate was found
    /// after [`ALLOCATE_SPACE_ATTEMPTS`] random picks.
    ///
    /// # Panics
    ///
    /// panics if `align` is not a page aligned power of 2, or `align_offset` is not a page aligned value below `align`
    pub fn allocate_space(&self, rng: &RngManager, size: Size, align: usize, align_offset: usize) -> Option<usize> {
        assert!(
            align.is_power_of_two() && page_aligned(align),
            "address space allocation alignment must be a page aligned power of 2",
        );
        assert!(
            page_aligned(align_offset) && align_offset < align,
            "address space allocation alignment offset must be page aligned and below the alignment",
        );

        let size_page_count = size.pages_rounded();
        let align_page_count = align / PAGE_SIZE;
        let align_offset_page_count = align_offset / PAGE_SIZE;

        if size_page_count == 0 {
            return None;
        }

        // lowest and highest page a range can start at while keeping its guard pages inside the region
        let lowest_page = self.start_page.checked_add(self.guard_page_count)?;
        let highest_page = self.end_page
            .checked_sub(self.guard_page_count)?
            .checked_sub(size_page_count)?;

        let mut first_page = align_down(lowest_page, align_page_count) + align_offset_page_count;
        if first_page < lowest_page {
            first_page = first_page.checked_add(align_page_count)?;
        }
        if first_page > highest_page {
            return None;
        }

        let slot_count = (highest_page - first_page) / align_page_count + 1;

        for _ in 0..ALLOCATE_SPACE_ATTEMPTS {
            let slot = (rng.generate_random_u64() % slot_count as u64) as usize;
            let page = first_page + slot * align_page_count;

            if self.is_forbidden(&(page..page + size_page_count)) {
                continue;
            }

            let guarded_start = (page - self.guard_page_count) * PAGE_SIZE;
            let guarded_size = Size::from_pages(size_page_count).padded_by(self.guard_page_count)?;
            if self.query.is_free(guarded_start, guarded_size.bytes()) {
                let address = page * PAGE_SIZE;
                debug_assert!(is_aligned(address.wrapping_sub(align_offset), align));
                return Some(address);
            }
        }

        log::debug!("no free address space for {size} after {ALLOCATE_SPACE_ATTEMPTS} attempts");
        None
    }

    /// Checks that the guard space on both sides of `address..address + size` is still unmapped
    pub fn check_guard_space(&self, address: usize, size: Size) -> bool {
        let guard_size = self.guard_page_count * PAGE_SIZE;
        if guard_size == 0 {
            return true;
        }

        let Some(guard_start) = address.checked_sub(guard_size) else {
            return false;
        };
        let Some(end) = address.checked_add(size.bytes_aligned()) else {
            return false;
        };

        self.query.is_free(guard_start, guard_size) && self.query.is_free(end, guard_size)
    }
}

#[cfg(test)]
mod tests {
    use std::vec::Vec;
    use std::cell::RefCell;

    use super::*;

    /// Address space which only knows about explicitly added mappings
    #[derive(Default)]
    struct FakeAddressSpace {
        mapped: RefCell<Vec<Range<usize>>>,
    }

    impl FakeAddressSpace {
        fn map(&self, address: usize, size: usize) {
            self.mapped.borrow_mut().push(address..address + size);
        }
    }

    impl AddressSpaceQuery for FakeAddressSpace {
        fn is_free(&self, address: usize, size: usize) -> bool {
            let end = address + size;
            !self.mapped.borrow().iter().any(|range| address < range.end && range.start < end)
        }
    }

    const START: usize = 0x10_0000;
    const GUARD: Size = Size::from_pages(1);

    fn rng() -> RngManager {
        RngManager::from_seed([7; 32])
    }

    #[test]
    fn allocations_avoid_forbidden_regions() {
        let forbidden = [ForbiddenRegion::new(START + 4 * PAGE_SIZE, Size::from_pages(8))];
        let allocator = AddressSpaceAllocator::new(FakeAddressSpace::default(), START, START + 32 * PAGE_SIZE, GUARD, &forbidden);
        let rng = rng();

        for _ in 0..200 {
            let address = allocator.allocate_space(&rng, Size::from_pages(2), PAGE_SIZE, 0).unwrap();
            let end = address + 2 * PAGE_SIZE;

            assert!(address >= START + PAGE_SIZE && end <= START + 31 * PAGE_SIZE);
            // forbidden region grown by a guard page is 3..13
            assert!(end <= START + 3 * PAGE_SIZE || address >= START + 13 * PAGE_SIZE);
        }
    }

    #[test]
    fn alignment_offset_is_respected() {
        let allocator = AddressSpaceAllocator::new(FakeAddressSpace::default(), START, START + 256 * PAGE_SIZE, GUARD, &[]);
        let rng = rng();

        for _ in 0..100 {
            let address = allocator.allocate_space(&rng, Size::from_pages(1), 16 * PAGE_SIZE, 3 * PAGE_SIZE).unwrap();
            assert_eq!(address % (16 * PAGE_SIZE), 3 * PAGE_SIZE);
        }
    }

    #[test]
    fn exhausted_region_returns_none() {
        let space = FakeAddressSpace::default();
        space.map(START, 8 * PAGE_SIZE);
        let allocator = AddressSpaceAllocator::new(space, START, START + 8 * PAGE_SIZE, GUARD, &[]);
        let rng = rng();

        assert_eq!(allocator.allocate_space(&rng, Size::from_pages(1), PAGE_SIZE, 0), None);
        // too large to ever fit
        assert_eq!(allocator.allocate_space(&rng, Size::from_pages(7), PAGE_SIZE, 0), None);
    }

    #[test]
    fn single_slot_is_found() {
        let allocator = AddressSpaceAllocator::new(FakeAddressSpace::default(), START, START + 4 * PAGE_SIZE, GUARD, &[]);
        let rng = rng();

        assert_eq!(allocator.allocate_space(&rng, Size::from_pages(2), PAGE_SIZE, 0), Some(START + PAGE_SIZE));
    }

    #[test]
    fn guard_space_sees_neighbours() {
        let allocator = AddressSpaceAllocator::new(FakeAddressSpace::default(), START, START + 32 * PAGE_SIZE, GUARD, &[]);
        let address = START + 8 * PAGE_SIZE;
        assert!(allocator.check_guard_space(address, Size::from_pages(2)));

        allocator.query().map(address + 2 * PAGE_SIZE, PAGE_SIZE);
        assert!(!allocator.check_guard_space(address, Size::from_pages(2)));
    }

    #[test]
    #[should_panic]
    fn overlapping_forbidden_regions_panic() {
        let forbidden = [
            ForbiddenRegion::new(START + 4 * PAGE_SIZE, Size::from_pages(4)),
            ForbiddenRegion::new(START + 9 * PAGE_SIZE, Size::from_pages(4)),
        ];
        AddressSpaceAllocator::new(FakeAddressSpace::default(), START, START + 32 * PAGE_SIZE, GUARD, &forbidden);
    }
}
