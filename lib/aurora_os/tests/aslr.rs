use std::cell::Cell;

use aurora_os::addr_space::AslrError;
use aurora_os::config::{ASLR_GUARD_SIZE, LARGE_PAGE_SIZE};
use aurora_os::Context;
use bit_utils::{Size, PAGE_SIZE};
use sys::config::*;
use sys::{MemoryPermission, MemoryState, SysErr};

fn context(seed: u8) -> Context {
    Context::with_seed([seed; 32]).unwrap()
}

fn overlaps(address: usize, size: usize, start: usize, region_size: usize) -> bool {
    address < start + region_size && start < address + size
}

#[test]
fn mappings_land_in_allowed_space() {
    let context = context(1);
    let size = Size::from_pages(4);

    let mut addresses = Vec::new();
    for _ in 0..32 {
        let address = context.map_at_random_address(size, MemoryPermission::default()).unwrap();

        assert!(address % PAGE_SIZE == 0);
        assert!(address >= ASLR_REGION_START + ASLR_GUARD_SIZE.bytes());
        assert!(address + size.bytes() + ASLR_GUARD_SIZE.bytes() <= ASLR_REGION_END);
        assert!(!overlaps(address, size.bytes(), HEAP_REGION_START, HEAP_REGION_SIZE));
        assert!(!overlaps(address, size.bytes(), ALIAS_REGION_START, ALIAS_REGION_SIZE));
        assert_eq!(sys::query_memory(address).unwrap().state, MemoryState::Normal);

        addresses.push(address);
    }

    addresses.sort_unstable();
    addresses.dedup();
    assert_eq!(addresses.len(), 32);

    for address in addresses {
        sys::unmap_memory(address, size).unwrap();
    }
}

#[test]
fn large_mappings_are_large_page_aligned() {
    let context = context(2);
    let size = Size::from_bytes(LARGE_PAGE_SIZE * 2);

    let address = context.map_at_random_address(size, MemoryPermission::READ).unwrap();
    assert_eq!(address % LARGE_PAGE_SIZE, 0);
    assert!(context.aslr().check_guard_space(address, size));

    sys::unmap_memory(address, size).unwrap();
}

#[test]
fn same_seed_gives_same_addresses() {
    let a = context(3);
    let b = context(3);
    let size = Size::from_pages(1);

    for _ in 0..8 {
        assert_eq!(
            a.aslr().allocate_space(a.rng(), size, 0),
            b.aslr().allocate_space(b.rng(), size, 0),
        );
    }
}

#[test]
fn busy_addresses_are_retried_until_exhausted() {
    let context = context(4);
    let attempts = Cell::new(0);

    let result = context.aslr().map_at_random_address(
        context.rng(),
        Size::from_pages(1),
        0,
        |_, _| {
            attempts.set(attempts.get() + 1);
            Err(SysErr::InvalidCurrentMemory)
        },
        |_, _| panic!("nothing was mapped"),
    );

    assert!(matches!(result, Err(AslrError::OutOfAddressSpace)));
    assert_eq!(attempts.get(), aurora_os::config::MAP_AT_RANDOM_ADDRESS_ATTEMPTS);
}

#[test]
fn other_map_errors_are_returned() {
    let context = context(5);

    let result = context.aslr().map_at_random_address(
        context.rng(),
        Size::from_pages(1),
        0,
        |_, _| Err(SysErr::OutOfResource),
        |_, _| Ok(()),
    );

    assert!(matches!(result, Err(AslrError::Syscall(SysErr::OutOfResource))));
}

#[test]
fn mapping_in_guard_space_is_undone() {
    let context = context(6);
    let size = Size::from_pages(2);
    let intruders = Cell::new(Vec::new());
    let unmapped = Cell::new(0);

    let address = context.aslr().map_at_random_address(
        context.rng(),
        size,
        0,
        |address, size| {
            sys::map_memory(address, size, MemoryPermission::default())?;

            // another thread maps right behind the first mapping
            let mut list = intruders.take();
            if list.is_empty() {
                let intruder = address + size.bytes();
                sys::map_memory(intruder, Size::from_pages(1), MemoryPermission::default())?;
                list.push(intruder);
            }
            intruders.set(list);
            Ok(())
        },
        |address, size| {
            unmapped.set(unmapped.get() + 1);
            sys::unmap_memory(address, size)
        },
    ).unwrap();

    assert_eq!(unmapped.get(), 1);
    assert!(context.aslr().check_guard_space(address, size));

    sys::unmap_memory(address, size).unwrap();
    for intruder in intruders.take() {
        sys::unmap_memory(intruder, Size::from_pages(1)).unwrap();
    }
}

#[test]
fn layout_is_logged() {
    sys::init_logger(log::LevelFilter::Debug);
    let _context = context(7);

    let debug_log = String::from_utf8_lossy(&sys::read_debug_log()).into_owned();
    assert!(debug_log.contains(&format!("aslr region is {ASLR_REGION_START:#x}")));
}
