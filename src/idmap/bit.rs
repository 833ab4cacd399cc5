//! Rank/select id map over a bitset
//!
//! The mapped id of a node is the rank of its original id among all original
//! ids. Pages of 64 bits are grouped into blocks of 64 pages; each block
//! records the rank at its first bit, so `rank` touches at most 64 pages and
//! `select` binary searches the block offsets first.

use super::labels::LabelIndex;
use super::{NodeMapping, NOT_FOUND};

/// Highest original id a [`BitIdMap`] accepts
pub const BIT_MAX_ORIGINAL_ID: u64 = (1 << 44) - 1;

const PAGE_BITS: u64 = 64;
const PAGES_PER_BLOCK: usize = 64;

/// Bitset mapping with per-block rank offsets
#[derive(Debug, Clone)]
pub struct BitIdMap {
    pages: Vec<u64>,
    block_offsets: Vec<u64>,
    node_count: u64,
    labels: LabelIndex,
}

impl BitIdMap {
    /// Mapping over the set `originals`, with labels keyed by position in
    /// `originals`
    ///
    /// Labels are rewritten to rank order.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_originals(originals: &[u64], labels: &LabelIndex) -> Self {
        let highest = originals.iter().copied().max();
        let page_count = highest.map_or(0, |h| (h / PAGE_BITS) as usize + 1);
        let mut pages = vec![0_u64; page_count];
        for &original in originals {
            pages[(original / PAGE_BITS) as usize] |= 1 << (original % PAGE_BITS);
        }

        let mut block_offsets = Vec::with_capacity(page_count.div_ceil(PAGES_PER_BLOCK));
        let mut running = 0_u64;
        for block in pages.chunks(PAGES_PER_BLOCK) {
            block_offsets.push(running);
            running += block.iter().map(|p| u64::from(p.count_ones())).sum::<u64>();
        }

        let mut map = Self {
            pages,
            block_offsets,
            node_count: running,
            labels: LabelIndex::new(),
        };
        map.labels = labels.relabel(|position| map.rank(originals[position as usize]));
        map
    }

    /// Estimated bytes for ids up to `highest_original_id`
    #[must_use]
    pub const fn estimate(highest_original_id: u64) -> u64 {
        let pages = highest_original_id / PAGE_BITS + 1;
        let blocks = pages.div_ceil(PAGES_PER_BLOCK as u64);
        8 * pages + 8 * blocks
    }

    #[allow(clippy::cast_possible_truncation)]
    fn rank(&self, original: u64) -> u64 {
        let page = (original / PAGE_BITS) as usize;
        let bit = original % PAGE_BITS;
        let Some(&word) = self.pages.get(page) else {
            return NOT_FOUND;
        };
        if word & (1 << bit) == 0 {
            return NOT_FOUND;
        }
        let block = page / PAGES_PER_BLOCK;
        let in_block: u64 = self.pages[block * PAGES_PER_BLOCK..page]
            .iter()
            .map(|p| u64::from(p.count_ones()))
            .sum();
        let in_page = u64::from((word & ((1 << bit) - 1)).count_ones());
        self.block_offsets[block] + in_block + in_page
    }

    fn select(&self, mapped: u64) -> u64 {
        if mapped >= self.node_count {
            return NOT_FOUND;
        }
        // last block starting at or before `mapped`; empty blocks share the
        // offset of their successor
        let block = self.block_offsets.partition_point(|&o| o <= mapped) - 1;
        let mut remaining = mapped - self.block_offsets[block];
        let start = block * PAGES_PER_BLOCK;
        let end = (start + PAGES_PER_BLOCK).min(self.pages.len());
        for (page, &word) in self.pages[start..end].iter().enumerate() {
            let count = u64::from(word.count_ones());
            if remaining < count {
                let mut word = word;
                for _ in 0..remaining {
                    word &= word - 1;
                }
                return (start + page) as u64 * PAGE_BITS + u64::from(word.trailing_zeros());
            }
            remaining -= count;
        }
        NOT_FOUND
    }
}

impl NodeMapping for BitIdMap {
    fn to_mapped_node_id(&self, original: u64) -> u64 {
        self.rank(original)
    }

    fn to_original_node_id(&self, mapped: u64) -> u64 {
        self.select(mapped)
    }

    fn highest_original_id(&self) -> u64 {
        self.pages
            .iter()
            .rposition(|&p| p != 0)
            .map_or(0, |page| {
                page as u64 * PAGE_BITS + 63 - u64::from(self.pages[page].leading_zeros())
            })
    }

    fn node_count(&self) -> u64 {
        self.node_count
    }

    fn label_index(&self) -> &LabelIndex {
        &self.labels
    }
}
