//! Fixed-capacity staging buffers for scanned records
//!
//! Every importer task owns one buffer and flushes it once full. Two insertion
//! modes exist:
//!
//! - `offer` is checked: it returns `false` once the buffer is full and leaves
//!   the buffer untouched.
//! - `add_unchecked` fails with [`CsrError::BatchOverflow`] past capacity; for
//!   callers that size batches to fit.
//!
//! Records referring to an original id at or above the declared id bound are
//! dropped in both modes without touching the buffer, and counted.

use super::records::{NodeRecord, PropertiesRef, RelationshipRecord, TypeToken};
use crate::config::Orientation;
use crate::error::{CsrError, Result};
use crate::idmap::LabelToken;

/// Words per staged relationship: source, target, properties reference
pub const RELATIONSHIP_STRIDE: usize = 3;

/// Common view of batch buffers
pub trait RecordsBatchBuffer {
    /// Records the buffer can hold
    fn capacity(&self) -> usize;

    /// Records currently held
    fn len(&self) -> usize;

    /// Forget every held record, keeping the allocation
    fn reset(&mut self);

    /// Whether no record is held
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the buffer reached its capacity
    fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }
}

/// One staged node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedNode<'a> {
    /// Original id
    pub id: u64,
    /// Labels kept by the label filter
    pub labels: &'a [LabelToken],
    /// Properties reference
    pub properties_ref: PropertiesRef,
}

/// Staging buffer for node records
#[derive(Debug, Clone)]
pub struct NodesBatchBuffer {
    ids: Vec<u64>,
    properties_refs: Vec<PropertiesRef>,
    labels: Vec<LabelToken>,
    label_ends: Vec<usize>,
    capacity: usize,
    id_bound: u64,
    label_filter: Option<Vec<LabelToken>>,
    dropped: u64,
    filtered: u64,
}

impl NodesBatchBuffer {
    /// Buffer for `capacity` nodes with original ids below `id_bound`
    #[must_use]
    pub fn new(capacity: usize, id_bound: u64) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            properties_refs: Vec::with_capacity(capacity),
            labels: Vec::new(),
            label_ends: Vec::with_capacity(capacity),
            capacity,
            id_bound,
            label_filter: None,
            dropped: 0,
            filtered: 0,
        }
    }

    /// Only keep nodes carrying at least one of `labels`
    #[must_use]
    pub fn with_label_filter(mut self, mut labels: Vec<LabelToken>) -> Self {
        labels.sort_unstable();
        labels.dedup();
        self.label_filter = Some(labels);
        self
    }

    /// Checked insertion
    ///
    /// Returns `false` if the buffer is full; dropped and filtered records
    /// count as accepted.
    pub fn offer(&mut self, record: &NodeRecord) -> bool {
        if self.is_full() {
            return false;
        }
        self.stage(record);
        true
    }

    /// Unchecked insertion
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::BatchOverflow`] if the buffer is already full.
    pub fn add_unchecked(&mut self, record: &NodeRecord) -> Result<()> {
        if self.is_full() {
            return Err(CsrError::BatchOverflow {
                capacity: self.capacity,
            });
        }
        self.stage(record);
        Ok(())
    }

    fn stage(&mut self, record: &NodeRecord) {
        if record.id >= self.id_bound {
            self.dropped += 1;
            return;
        }
        let start = self.labels.len();
        match &self.label_filter {
            Some(filter) => {
                self.labels.extend(
                    record
                        .labels
                        .iter()
                        .filter(|label| filter.binary_search(label).is_ok()),
                );
                if self.labels.len() == start {
                    self.filtered += 1;
                    return;
                }
            }
            None => self.labels.extend_from_slice(&record.labels),
        }
        self.ids.push(record.id);
        self.properties_refs.push(record.properties_ref);
        self.label_ends.push(self.labels.len());
    }

    /// Staged nodes in arrival order
    pub fn iter(&self) -> impl Iterator<Item = StagedNode<'_>> + '_ {
        (0..self.ids.len()).map(move |i| {
            let start = if i == 0 { 0 } else { self.label_ends[i - 1] };
            StagedNode {
                id: self.ids[i],
                labels: &self.labels[start..self.label_ends[i]],
                properties_ref: self.properties_refs[i],
            }
        })
    }

    /// Records dropped for exceeding the id bound
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Records skipped by the label filter
    #[must_use]
    pub const fn filtered(&self) -> u64 {
        self.filtered
    }
}

impl RecordsBatchBuffer for NodesBatchBuffer {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn reset(&mut self) {
        self.ids.clear();
        self.properties_refs.clear();
        self.labels.clear();
        self.label_ends.clear();
    }
}

/// Staging buffer for the relationships of one projection
///
/// Holds flat `(source, target, properties_ref)` triples. Reverse projections
/// stage `(target, source)`; undirected projections stage both directions for
/// one record.
#[derive(Debug, Clone)]
pub struct RelationshipsBatchBuffer {
    entries: Vec<u64>,
    len: usize,
    capacity: usize,
    id_bound: u64,
    type_filter: Option<TypeToken>,
    orientation: Orientation,
    dropped: u64,
}

impl RelationshipsBatchBuffer {
    /// Buffer for `capacity` records with original ids below `id_bound`
    #[must_use]
    pub fn new(capacity: usize, id_bound: u64) -> Self {
        Self {
            entries: Vec::with_capacity(capacity * RELATIONSHIP_STRIDE),
            len: 0,
            capacity,
            id_bound,
            type_filter: None,
            orientation: Orientation::Natural,
            dropped: 0,
        }
    }

    /// Only stage records of type `type_token`
    #[must_use]
    pub const fn with_type_filter(mut self, type_token: Option<TypeToken>) -> Self {
        self.type_filter = type_token;
        self
    }

    /// Stage records in `orientation`
    #[must_use]
    pub const fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Whether records of `type_token` belong in this buffer
    #[must_use]
    pub fn matches(&self, type_token: TypeToken) -> bool {
        self.type_filter.map_or(true, |t| t == type_token)
    }

    /// Checked insertion
    ///
    /// Returns `false` if the buffer is full. Records of other types, and
    /// records dropped for exceeding the id bound, count as accepted.
    pub fn offer(&mut self, record: &RelationshipRecord) -> bool {
        if self.is_full() {
            return false;
        }
        self.stage(record);
        true
    }

    /// Unchecked insertion
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::BatchOverflow`] if the buffer is already full.
    pub fn add_unchecked(&mut self, record: &RelationshipRecord) -> Result<()> {
        if self.is_full() {
            return Err(CsrError::BatchOverflow {
                capacity: self.capacity,
            });
        }
        self.stage(record);
        Ok(())
    }

    fn stage(&mut self, record: &RelationshipRecord) {
        if !self.matches(record.type_token) {
            return;
        }
        if record.source >= self.id_bound || record.target >= self.id_bound {
            self.dropped += 1;
            return;
        }
        let (source, target) = (record.source, record.target);
        match self.orientation {
            Orientation::Natural => self.push(source, target, record.properties_ref),
            Orientation::Reverse => self.push(target, source, record.properties_ref),
            Orientation::Undirected => {
                self.push(source, target, record.properties_ref);
                self.push(target, source, record.properties_ref);
            }
        }
        self.len += 1;
    }

    fn push(&mut self, source: u64, target: u64, properties_ref: PropertiesRef) {
        self.entries.extend_from_slice(&[source, target, properties_ref]);
    }

    /// Staged `(source, target, properties_ref)` triples
    #[must_use]
    pub fn entries(&self) -> &[u64] {
        &self.entries
    }

    /// Mutable triples, for in-place id mapping and sorting
    pub fn entries_mut(&mut self) -> &mut Vec<u64> {
        &mut self.entries
    }

    /// Records dropped for exceeding the id bound
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl RecordsBatchBuffer for RelationshipsBatchBuffer {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.len
    }

    fn reset(&mut self) {
        self.entries.clear();
        self.len = 0;
    }
}

/// Fans one relationship stream out to one buffer per projection
#[derive(Debug, Clone)]
pub struct CompositeRelationshipsBatchBuffer {
    buffers: Vec<RelationshipsBatchBuffer>,
}

impl CompositeRelationshipsBatchBuffer {
    /// Composite over `buffers`, in projection order
    #[must_use]
    pub fn new(buffers: Vec<RelationshipsBatchBuffer>) -> Self {
        Self { buffers }
    }

    /// Offer `record` to every matching buffer
    ///
    /// Returns `false`, staging nothing, if any matching buffer is full.
    pub fn offer(&mut self, record: &RelationshipRecord) -> bool {
        let blocked = self
            .buffers
            .iter()
            .any(|b| b.matches(record.type_token) && b.is_full());
        if blocked {
            return false;
        }
        for buffer in &mut self.buffers {
            buffer.stage(record);
        }
        true
    }

    /// Whether any buffer is full
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.buffers.iter().any(RecordsBatchBuffer::is_full)
    }

    /// Whether every buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.iter().all(RecordsBatchBuffer::is_empty)
    }

    /// Per-projection buffers
    pub fn buffers_mut(&mut self) -> &mut [RelationshipsBatchBuffer] {
        &mut self.buffers
    }

    /// Records dropped for exceeding the id bound, summed over projections
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.buffers.iter().map(RelationshipsBatchBuffer::dropped).sum()
    }
}
