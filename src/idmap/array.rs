//! Direct lookup id map
//!
//! A forward array indexed by original id and a reverse array indexed by
//! mapped id. Costs `8 * (highest_original_id + 1) + 8 * node_count` bytes.

use super::labels::LabelIndex;
use super::{NodeMapping, NOT_FOUND};

/// Highest original id an [`ArrayIdMap`] accepts
pub const ARRAY_MAX_ORIGINAL_ID: u64 = (1 << 40) - 1;

/// Forward/reverse array mapping
#[derive(Debug, Clone)]
pub struct ArrayIdMap {
    forward: Vec<u64>,
    reverse: Vec<u64>,
    labels: LabelIndex,
}

impl ArrayIdMap {
    /// Mapping in which node `i` has original id `originals[i]`
    ///
    /// `originals` must not contain duplicates.
    #[must_use]
    pub fn from_originals(originals: Vec<u64>, labels: LabelIndex) -> Self {
        let highest = originals.iter().copied().max();
        let mut forward = vec![NOT_FOUND; highest.map_or(0, |h| to_index(h) + 1)];
        for (mapped, &original) in originals.iter().enumerate() {
            forward[to_index(original)] = mapped as u64;
        }
        Self {
            forward,
            reverse: originals,
            labels,
        }
    }

    /// Estimated bytes for `node_count` nodes up to `highest_original_id`
    #[must_use]
    pub const fn estimate(node_count: u64, highest_original_id: u64) -> u64 {
        highest_original_id
            .saturating_add(1)
            .saturating_mul(8)
            .saturating_add(node_count.saturating_mul(8))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_index(id: u64) -> usize {
    // bounded by ARRAY_MAX_ORIGINAL_ID
    id as usize
}

impl NodeMapping for ArrayIdMap {
    fn to_mapped_node_id(&self, original: u64) -> u64 {
        usize::try_from(original)
            .ok()
            .and_then(|index| self.forward.get(index))
            .copied()
            .unwrap_or(NOT_FOUND)
    }

    fn to_original_node_id(&self, mapped: u64) -> u64 {
        usize::try_from(mapped)
            .ok()
            .and_then(|index| self.reverse.get(index))
            .copied()
            .unwrap_or(NOT_FOUND)
    }

    fn highest_original_id(&self) -> u64 {
        (self.forward.len() as u64).saturating_sub(1)
    }

    fn node_count(&self) -> u64 {
        self.reverse.len() as u64
    }

    fn label_index(&self) -> &LabelIndex {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_and_reverse() {
        let map = ArrayIdMap::from_originals(vec![10, 3, 7], LabelIndex::new());

        assert_eq!(map.node_count(), 3);
        assert_eq!(map.highest_original_id(), 10);
        assert_eq!(map.to_mapped_node_id(10), 0);
        assert_eq!(map.to_mapped_node_id(3), 1);
        assert_eq!(map.to_mapped_node_id(7), 2);
        assert_eq!(map.to_mapped_node_id(4), NOT_FOUND);
        assert_eq!(map.to_mapped_node_id(11), NOT_FOUND);
        assert_eq!(map.to_original_node_id(2), 7);
        assert_eq!(map.to_original_node_id(3), NOT_FOUND);
    }

    #[test]
    fn test_empty() {
        let map = ArrayIdMap::from_originals(Vec::new(), LabelIndex::new());
        assert_eq!(map.node_count(), 0);
        assert_eq!(map.to_mapped_node_id(0), NOT_FOUND);
    }

    #[test]
    fn test_estimate() {
        assert_eq!(ArrayIdMap::estimate(10, 99), 800 + 80);
    }
}
