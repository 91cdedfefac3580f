//! Small bit twiddling, alignment and container utilities shared by the aurora libraries
#![no_std]

use core::ops::Range;

pub mod container;
mod size;
pub use size::Size;

pub const PAGE_SIZE: usize = 4096;
pub const LARGE_PAGE_SIZE: usize = 0x200000;

// must be power of 2 for correct results
pub const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

// must be power of 2 for correct results
pub const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// Returns the largest power of 2 that `addr` is aligned to
pub const fn align_of(addr: usize) -> usize {
    if addr == 0 {
        return 1 << (usize::BITS - 1);
    }

    1 << addr.trailing_zeros()
}

pub const fn is_aligned(addr: usize, align: usize) -> bool {
    addr & (align - 1) == 0
}

pub const fn page_aligned(addr: usize) -> bool {
    is_aligned(addr, PAGE_SIZE)
}

/// Gets the bits in the range `bits` of `n`, shifted down to start at bit 0
pub const fn get_bits(n: usize, bits: Range<usize>) -> usize {
    if bits.end == 0 {
        return 0;
    }

    let l = if bits.start > 63 { 63 } else { bits.start };
    let h = if bits.end > 64 { 63 } else { bits.end - 1 };
    if l > h {
        return 0;
    }

    let temp = if h == 63 {
        usize::MAX
    } else {
        (1 << (h + 1)) - 1
    };

    (temp & n).wrapping_shr(l as _)
}

/// Returns `n` with the bits in the range `bits` replaced by the low bits of `value`
pub const fn set_bits(n: usize, bits: Range<usize>, value: usize) -> usize {
    let width = bits.end - bits.start;
    let mask = if width >= 64 {
        usize::MAX
    } else {
        ((1 << width) - 1) << bits.start
    };

    (n & !mask) | ((value << bits.start) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(align_up(1, PAGE_SIZE), PAGE_SIZE);
        assert_eq!(align_up(PAGE_SIZE, PAGE_SIZE), PAGE_SIZE);
        assert_eq!(align_down(PAGE_SIZE + 1, PAGE_SIZE), PAGE_SIZE);
        assert_eq!(align_of(0x3000), 0x1000);
        assert!(page_aligned(LARGE_PAGE_SIZE));
        assert!(!page_aligned(LARGE_PAGE_SIZE + 8));
    }

    #[test]
    fn bit_fields() {
        let n = 0b1011_0110;
        assert_eq!(get_bits(n, 1..4), 0b011);
        assert_eq!(get_bits(n, 4..8), 0b1011);
        assert_eq!(set_bits(n, 0..4, 0b1111), 0b1011_1111);
        assert_eq!(set_bits(0, 8..16, 0x1ff), 0xff00);
        assert_eq!(get_bits(usize::MAX, 0..64), usize::MAX);
    }
}
