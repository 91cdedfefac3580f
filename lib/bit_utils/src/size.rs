use derive_more::{Add, Sub, Mul, Div, Display};
use bytemuck::{Pod, Zeroable};

use crate::{PAGE_SIZE, page_aligned, align_up};

/// Length of a memory range in bytes, usually a whole number of pages
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Add, Sub, Mul, Div, Pod, Zeroable)]
#[display(fmt = "{:#x} bytes", _0)]
#[repr(transparent)]
pub struct Size(usize);

impl Size {
    pub const fn from_bytes(bytes: usize) -> Self {
        Size(bytes)
    }

    /// # Panics
    ///
    /// Panics if `pages` pages do not fit in a usize worth of bytes.
    pub const fn from_pages(pages: usize) -> Self {
        match Self::try_from_pages(pages) {
            Some(size) => size,
            None => panic!("page count overflows the address space"),
        }
    }

    pub const fn try_from_pages(pages: usize) -> Option<Self> {
        match pages.checked_mul(PAGE_SIZE) {
            Some(bytes) => Some(Size(bytes)),
            None => None,
        }
    }

    pub const fn bytes(&self) -> usize {
        self.0
    }

    /// Byte count rounded up to the next page boundary
    pub const fn bytes_aligned(&self) -> usize {
        align_up(self.0, PAGE_SIZE)
    }

    /// Number of pages, or `None` if the size is not a whole number of pages
    pub const fn pages(&self) -> Option<usize> {
        if self.is_page_aligned() {
            Some(self.0 / PAGE_SIZE)
        } else {
            None
        }
    }

    pub const fn pages_rounded(&self) -> usize {
        self.bytes_aligned() / PAGE_SIZE
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_page_aligned(&self) -> bool {
        page_aligned(self.0)
    }

    /// Adds `pages` pages on both ends, as done for guard regions around a mapping
    pub const fn padded_by(&self, pages: usize) -> Option<Self> {
        let Some(padding) = pages.checked_mul(2 * PAGE_SIZE) else {
            return None;
        };

        match self.0.checked_add(padding) {
            Some(bytes) => Some(Size(bytes)),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_conversions() {
        assert_eq!(Size::from_pages(3).bytes(), 3 * PAGE_SIZE);
        assert_eq!(Size::from_bytes(PAGE_SIZE + 1).pages_rounded(), 2);
        assert_eq!(Size::from_bytes(PAGE_SIZE + 1).pages(), None);
        assert_eq!(Size::from_bytes(2 * PAGE_SIZE).pages(), Some(2));
        assert!(Size::try_from_pages(usize::MAX).is_none());
    }

    #[test]
    fn padding_covers_both_sides() {
        assert_eq!(Size::from_pages(2).padded_by(1), Some(Size::from_pages(4)));
        assert_eq!(Size::from_bytes(usize::MAX).padded_by(1), None);
    }
}
