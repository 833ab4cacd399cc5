//! Page layout of accumulation buffers
//!
//! Mapped node ids are split into power-of-two pages. Each page owns the
//! accumulation lists of its nodes and is compacted by exactly one task, so a
//! few pages per worker keep the merge phase balanced.

use crate::error::{CsrError, Result};

/// Smallest page, in nodes
pub const MIN_PAGE_SIZE: usize = 1 << 10;

/// Largest page, in nodes
pub const MAX_PAGE_SIZE: usize = 1 << 30;

/// Pages aimed for per worker
pub const PAGES_PER_WORKER: usize = 4;

/// Page size and count for one import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSizing {
    page_shift: u32,
    page_count: usize,
}

impl ImportSizing {
    /// Sizing for `node_count` nodes imported by `concurrency` workers
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::InvalidConfig`] if `concurrency` is zero.
    pub fn of(concurrency: usize, node_count: u64) -> Result<Self> {
        if concurrency == 0 {
            return Err(CsrError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        let wanted_pages = (concurrency * PAGES_PER_WORKER) as u64;
        let page_size = node_count
            .div_ceil(wanted_pages)
            .next_power_of_two()
            .clamp(MIN_PAGE_SIZE as u64, MAX_PAGE_SIZE as u64);
        Self::with_page_size(page_size, node_count)
    }

    /// Sizing with a fixed page size, rounded up to a power of two
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::InvalidConfig`] if `page_size` has no power of two
    /// in `u64` range and [`CsrError::CapacityOverflow`] if the page count
    /// does not fit into memory addressing.
    pub fn with_page_size(page_size: u64, node_count: u64) -> Result<Self> {
        let page_size = page_size
            .max(1)
            .checked_next_power_of_two()
            .ok_or_else(|| CsrError::InvalidConfig(format!("page_size {page_size} is too large")))?;
        let page_shift = page_size.trailing_zeros();
        let page_count = usize::try_from(node_count.div_ceil(page_size)).map_err(|_| {
            CsrError::CapacityOverflow {
                requested: node_count,
                ceiling: usize::MAX,
            }
        })?;
        Ok(Self {
            page_shift,
            page_count,
        })
    }

    /// Nodes per page
    #[must_use]
    pub const fn page_size(&self) -> usize {
        1 << self.page_shift
    }

    /// Number of pages
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.page_count
    }

    /// Page holding mapped node `node`
    #[must_use]
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn page_of(&self, node: u64) -> usize {
        (node >> self.page_shift) as usize
    }

    /// Position of `node` inside its page
    #[must_use]
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn local_id(&self, node: u64) -> usize {
        (node & ((1 << self.page_shift) - 1)) as usize
    }

    /// First mapped node of `page`
    #[must_use]
    pub const fn page_start(&self, page: usize) -> u64 {
        (page as u64) << self.page_shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_graphs_use_minimum_page() {
        let sizing = ImportSizing::of(4, 100).unwrap();
        assert_eq!(sizing.page_size(), MIN_PAGE_SIZE);
        assert_eq!(sizing.page_count(), 1);
    }

    #[test]
    fn test_pages_scale_with_concurrency() {
        let sizing = ImportSizing::of(8, 10_000_000).unwrap();
        // 10M / 32 pages = 312_500, rounded up to 2^19
        assert_eq!(sizing.page_size(), 1 << 19);
        assert_eq!(sizing.page_count(), 20);
        assert!(sizing.page_count() >= 8);
    }

    #[test]
    fn test_page_arithmetic() {
        let sizing = ImportSizing::with_page_size(1000, 5000).unwrap();
        assert_eq!(sizing.page_size(), 1024);
        assert_eq!(sizing.page_count(), 5);
        assert_eq!(sizing.page_of(1023), 0);
        assert_eq!(sizing.page_of(1024), 1);
        assert_eq!(sizing.local_id(1030), 6);
        assert_eq!(sizing.page_start(3), 3072);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(ImportSizing::of(0, 10).is_err());
    }

    #[test]
    fn test_oversized_page_rejected() {
        assert!(matches!(
            ImportSizing::with_page_size((1 << 63) + 1, 10),
            Err(CsrError::InvalidConfig(_))
        ));
        let largest = ImportSizing::with_page_size(1 << 63, 10).unwrap();
        assert_eq!(largest.page_count(), 1);
        assert_eq!(largest.page_of(9), 0);
    }

    #[test]
    fn test_empty_graph() {
        let sizing = ImportSizing::of(2, 0).unwrap();
        assert_eq!(sizing.page_count(), 0);
    }
}
