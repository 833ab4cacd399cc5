//! Two-level id map for original ids beyond the range of the direct maps
//!
//! Original ids are first mapped to dense intermediate ids through a frozen
//! hash map. The intermediate ids form `[0, node_count)` and are mapped by an
//! inner [`IdMap`], which therefore never sees a large id.

use super::array::ArrayIdMap;
use super::bit::BitIdMap;
use super::labels::LabelIndex;
use super::{IdMap, NodeMapping, NOT_FOUND};
use std::collections::HashMap;

/// Bytes per hash map entry including control bytes and load factor slack
const HASH_ENTRY_BYTES: u64 = 20;

/// Inner mapping kinds a [`HighLimitIdMap`] can wrap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerStrategy {
    /// Direct arrays over intermediate ids
    Array,
    /// Bitset over intermediate ids
    Bit,
}

/// Hash map in front of a direct id map
#[derive(Debug, Clone)]
pub struct HighLimitIdMap {
    to_intermediate: HashMap<u64, u64>,
    originals: Vec<u64>,
    highest_original_id: u64,
    inner: Box<IdMap>,
}

impl HighLimitIdMap {
    /// Mapping in which intermediate id `i` has original id `originals[i]`
    ///
    /// `labels` are keyed by intermediate id.
    #[must_use]
    pub fn from_originals(originals: Vec<u64>, labels: LabelIndex, inner: InnerStrategy) -> Self {
        let to_intermediate = originals
            .iter()
            .enumerate()
            .map(|(intermediate, &original)| (original, intermediate as u64))
            .collect();
        let dense: Vec<u64> = (0..originals.len() as u64).collect();
        let inner = match inner {
            InnerStrategy::Array => IdMap::Array(ArrayIdMap::from_originals(dense, labels)),
            InnerStrategy::Bit => IdMap::Bit(BitIdMap::from_originals(&dense, &labels)),
        };
        Self {
            to_intermediate,
            highest_original_id: originals.iter().copied().max().unwrap_or(0),
            originals,
            inner: Box::new(inner),
        }
    }

    /// Estimated bytes for `node_count` nodes
    #[must_use]
    pub const fn estimate(node_count: u64) -> u64 {
        let inner = BitIdMap::estimate(node_count.saturating_sub(1));
        node_count
            .saturating_mul(HASH_ENTRY_BYTES + 8)
            .saturating_add(inner)
    }

    /// The wrapped mapping over intermediate ids
    #[must_use]
    pub fn inner(&self) -> &IdMap {
        &self.inner
    }
}

impl NodeMapping for HighLimitIdMap {
    fn to_mapped_node_id(&self, original: u64) -> u64 {
        self.to_intermediate
            .get(&original)
            .map_or(NOT_FOUND, |&intermediate| {
                self.inner.to_mapped_node_id(intermediate)
            })
    }

    fn to_original_node_id(&self, mapped: u64) -> u64 {
        let intermediate = self.inner.to_original_node_id(mapped);
        usize::try_from(intermediate)
            .ok()
            .and_then(|index| self.originals.get(index))
            .copied()
            .unwrap_or(NOT_FOUND)
    }

    fn highest_original_id(&self) -> u64 {
        self.highest_original_id
    }

    fn node_count(&self) -> u64 {
        self.originals.len() as u64
    }

    fn label_index(&self) -> &LabelIndex {
        self.inner.label_index()
    }
}
