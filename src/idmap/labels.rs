//! Label membership per node
//!
//! One [`RoaringTreemap`] per label token, keyed by node id. Nodes may carry
//! any number of labels, including none.

use roaring::RoaringTreemap;
use std::collections::BTreeMap;

/// Token identifying a node label in the source
pub type LabelToken = u32;

/// Label token to member set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelIndex {
    bitmaps: BTreeMap<LabelToken, RoaringTreemap>,
}

impl LabelIndex {
    /// Empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `node` carries `label`
    pub fn insert(&mut self, node: u64, label: LabelToken) {
        self.bitmaps.entry(label).or_default().insert(node);
    }

    /// Record every label of `node`
    pub fn insert_all(&mut self, node: u64, labels: &[LabelToken]) {
        for &label in labels {
            self.insert(node, label);
        }
    }

    /// Fold `other` into this index
    pub fn merge(&mut self, other: Self) {
        for (label, bitmap) in other.bitmaps {
            *self.bitmaps.entry(label).or_default() |= bitmap;
        }
    }

    /// Whether `node` carries `label`
    #[must_use]
    pub fn has_label(&self, node: u64, label: LabelToken) -> bool {
        self.bitmaps
            .get(&label)
            .is_some_and(|bitmap| bitmap.contains(node))
    }

    /// Call `f` for every label of `node` until it returns `false`
    pub fn for_each_label(&self, node: u64, mut f: impl FnMut(LabelToken) -> bool) {
        for (&label, bitmap) in &self.bitmaps {
            if bitmap.contains(node) && !f(label) {
                return;
            }
        }
    }

    /// Labels with at least one member, ascending
    #[must_use]
    pub fn available_labels(&self) -> Vec<LabelToken> {
        self.bitmaps
            .iter()
            .filter(|(_, bitmap)| !bitmap.is_empty())
            .map(|(&label, _)| label)
            .collect()
    }

    /// Number of nodes carrying `label`
    #[must_use]
    pub fn label_count(&self, label: LabelToken) -> u64 {
        self.bitmaps.get(&label).map_or(0, RoaringTreemap::len)
    }

    /// Rewrite every member id through `f`
    #[must_use]
    pub fn relabel(&self, f: impl Fn(u64) -> u64) -> Self {
        let bitmaps = self
            .bitmaps
            .iter()
            .map(|(&label, bitmap)| (label, bitmap.iter().map(&f).collect()))
            .collect();
        Self { bitmaps }
    }

    /// Bytes held by the bitmaps
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.bitmaps
            .values()
            .map(RoaringTreemap::serialized_size)
            .sum()
    }
}
