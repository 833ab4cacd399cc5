//! Original id to dense mapped id translation
//!
//! Source records carry arbitrary non-negative 63-bit ids. Every distinct
//! original id gets exactly one mapped id and mapped ids fill
//! `[0, node_count)` without gaps.
//!
//! Three mappings with different memory profiles exist:
//!
//! | Variant | Memory | Range |
//! |---|---|---|
//! | [`ArrayIdMap`] | `8 * (highest + 1) + 8 * n` | up to `2^40` |
//! | [`BitIdMap`] | `(highest + 1) / 8` plus block offsets | up to `2^44` |
//! | [`HighLimitIdMap`] | about `28 * n` plus a dense inner map | up to `2^63` |
//!
//! [`IdMapStrategy::select`] picks the cheapest variant that admits the
//! highest original id. Maps are populated concurrently through an
//! [`IdMapBuilder`].

pub mod array;
pub mod bit;
pub mod builder;
pub mod high_limit;
pub mod labels;

pub use array::ArrayIdMap;
pub use bit::BitIdMap;
pub use builder::{IdMapBuilder, Insertion};
pub use high_limit::{HighLimitIdMap, InnerStrategy};
pub use labels::{LabelIndex, LabelToken};

use array::ARRAY_MAX_ORIGINAL_ID;
use bit::BIT_MAX_ORIGINAL_ID;
use serde::Deserialize;
use std::fmt;

/// Returned by [`NodeMapping::to_mapped_node_id`] for unknown ids
pub const NOT_FOUND: u64 = u64::MAX;

/// Highest original id accepted from a source
pub const MAX_ORIGINAL_ID: u64 = (1 << 63) - 1;

/// Bidirectional id translation plus label membership
pub trait NodeMapping {
    /// Mapped id of `original`, or [`NOT_FOUND`]
    fn to_mapped_node_id(&self, original: u64) -> u64;

    /// Original id of `mapped`, or [`NOT_FOUND`] if `mapped >= node_count()`
    fn to_original_node_id(&self, mapped: u64) -> u64;

    /// Largest original id in the mapping
    fn highest_original_id(&self) -> u64;

    /// Number of mapped nodes
    fn node_count(&self) -> u64;

    /// Label membership keyed by mapped id
    fn label_index(&self) -> &LabelIndex;

    /// Whether `original` has been mapped
    fn contains(&self, original: u64) -> bool {
        self.to_mapped_node_id(original) != NOT_FOUND
    }

    /// Whether node `mapped` carries `label`
    fn has_label(&self, mapped: u64, label: LabelToken) -> bool {
        self.label_index().has_label(mapped, label)
    }

    /// Call `f` for every label of `mapped` until it returns `false`
    fn for_each_label(&self, mapped: u64, f: impl FnMut(LabelToken) -> bool) {
        self.label_index().for_each_label(mapped, f);
    }

    /// Labels carried by at least one node
    fn available_labels(&self) -> Vec<LabelToken> {
        self.label_index().available_labels()
    }
}

/// Built id mapping
#[derive(Debug, Clone)]
pub enum IdMap {
    /// Direct arrays
    Array(ArrayIdMap),
    /// Rank over a bitset
    Bit(BitIdMap),
    /// Hash map in front of a dense inner map
    HighLimit(HighLimitIdMap),
}

impl IdMap {
    /// Strategy this map was built with
    #[must_use]
    pub const fn strategy(&self) -> IdMapStrategy {
        match self {
            Self::Array(_) => IdMapStrategy::Array,
            Self::Bit(_) => IdMapStrategy::Bit,
            Self::HighLimit(_) => IdMapStrategy::HighLimit,
        }
    }
}

macro_rules! dispatch {
    ($map:expr, $inner:ident => $call:expr) => {
        match $map {
            IdMap::Array($inner) => $call,
            IdMap::Bit($inner) => $call,
            IdMap::HighLimit($inner) => $call,
        }
    };
}

impl NodeMapping for IdMap {
    #[inline]
    fn to_mapped_node_id(&self, original: u64) -> u64 {
        dispatch!(self, map => map.to_mapped_node_id(original))
    }

    #[inline]
    fn to_original_node_id(&self, mapped: u64) -> u64 {
        dispatch!(self, map => map.to_original_node_id(mapped))
    }

    fn highest_original_id(&self) -> u64 {
        dispatch!(self, map => map.highest_original_id())
    }

    fn node_count(&self) -> u64 {
        dispatch!(self, map => map.node_count())
    }

    fn label_index(&self) -> &LabelIndex {
        dispatch!(self, map => map.label_index())
    }
}

/// Id map variant to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdMapStrategy {
    /// [`ArrayIdMap`]
    Array,
    /// [`BitIdMap`]
    Bit,
    /// [`HighLimitIdMap`]
    HighLimit,
}

impl IdMapStrategy {
    /// Every strategy, in order of preference on equal cost
    pub const ALL: [Self; 3] = [Self::Array, Self::Bit, Self::HighLimit];

    /// Highest original id this strategy can map
    #[must_use]
    pub const fn range_limit(self) -> u64 {
        match self {
            Self::Array => ARRAY_MAX_ORIGINAL_ID,
            Self::Bit => BIT_MAX_ORIGINAL_ID,
            Self::HighLimit => MAX_ORIGINAL_ID,
        }
    }

    /// Estimated bytes of the built map
    #[must_use]
    pub const fn estimate(self, node_count: u64, highest_original_id: u64) -> u64 {
        match self {
            Self::Array => ArrayIdMap::estimate(node_count, highest_original_id),
            Self::Bit => BitIdMap::estimate(highest_original_id),
            Self::HighLimit => HighLimitIdMap::estimate(node_count),
        }
    }

    /// Cheapest strategy whose range admits `highest_original_id`
    #[must_use]
    pub fn select(node_count: u64, highest_original_id: u64) -> Self {
        Self::ALL
            .into_iter()
            .filter(|s| highest_original_id <= s.range_limit())
            .min_by_key(|s| s.estimate(node_count, highest_original_id))
            .unwrap_or(Self::HighLimit)
    }
}

impl fmt::Display for IdMapStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Array => f.write_str("array"),
            Self::Bit => f.write_str("bit"),
            Self::HighLimit => f.write_str("high_limit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sparse_huge_range() {
        assert_eq!(
            IdMapStrategy::select(1_000, 1 << 60),
            IdMapStrategy::HighLimit
        );
        // below the bitset limit but still far too sparse for a bitset
        assert_eq!(
            IdMapStrategy::select(1_000, 1 << 40),
            IdMapStrategy::HighLimit
        );
    }

    #[test]
    fn test_select_dense_range() {
        assert_eq!(
            IdMapStrategy::select(1_000_000, 1_000_000),
            IdMapStrategy::Bit
        );
    }

    #[test]
    fn test_select_respects_range_limits() {
        for (count, highest) in [(10, 100), (1 << 20, 1 << 45), (5, MAX_ORIGINAL_ID)] {
            let selected = IdMapStrategy::select(count, highest);
            assert!(highest <= selected.range_limit());
        }
    }

    #[test]
    fn test_dispatch_through_enum() {
        let map = IdMap::Array(ArrayIdMap::from_originals(vec![4, 2], LabelIndex::new()));
        assert_eq!(map.strategy(), IdMapStrategy::Array);
        assert_eq!(map.to_mapped_node_id(2), 1);
        assert_eq!(map.to_original_node_id(0), 4);
        assert_eq!(map.node_count(), 2);
        assert!(map.contains(4));
        assert!(!map.contains(3));
    }
}
