//! Compressed CSR (Compressed Sparse Row) graph store
//!
//! Each relationship projection becomes a [`Topology`]: one degree per node
//! plus paged, compressed adjacency. Pages follow the import layout so every
//! page was written by exactly one compaction task.
//!
//! # Layout
//!
//! ```text
//! Graph: 0 → 1, 0 → 2, 2 → 1   (page size 2)
//!
//! degrees:  [2, 0, 1]
//! page 0:   offsets [0, 2]   bytes [enc(1, 2)]
//! page 1:   offsets [0]      bytes [enc(1)]
//! ```
//!
//! Property channels are stored next to the topology as [`PropertyList`]s,
//! aligned slot by slot with the decoded targets. The store is immutable and
//! shared read-only between readers.

use crate::compress::{AdjacencyDecoder, Codec, CompressionFlags};
use crate::idmap::{IdMap, NodeMapping};
use crate::loading::adjacency_buffer::CompactedPage;
use crate::loading::property::ValueType;
use crate::loading::sizing::ImportSizing;
use std::collections::BTreeMap;

/// Import counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStats {
    /// Distinct nodes mapped
    pub node_count: u64,
    /// Stored relationships per projection, after aggregation
    pub relationship_counts: BTreeMap<String, u64>,
    /// Node records above the declared highest id
    pub dropped_nodes: u64,
    /// Node records without a wanted label
    pub filtered_nodes: u64,
    /// Relationship records above the declared highest id, per projection
    pub dropped_relationships: u64,
    /// Relationships whose source or target was never imported as a node,
    /// per projection
    pub unmapped_relationships: u64,
}

impl ImportStats {
    /// Stored relationships over every projection
    #[must_use]
    pub fn relationship_count(&self) -> u64 {
        self.relationship_counts.values().sum()
    }
}

#[derive(Debug, Clone, Default)]
struct AdjacencyPage {
    bytes: Vec<u8>,
    offsets: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
struct PropertyPage {
    values: Vec<u64>,
    // one entry per node plus the end
    offsets: Vec<usize>,
}

/// Property words of one channel, aligned with a topology's targets
#[derive(Debug, Clone)]
pub struct PropertyList {
    name: String,
    sizing: ImportSizing,
    pages: Vec<PropertyPage>,
}

impl PropertyList {
    /// Channel name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw words stored for `node`, empty for unknown nodes
    #[must_use]
    pub fn words(&self, node: u64) -> &[u64] {
        let Some(page) = self.pages.get(self.sizing.page_of(node)) else {
            return &[];
        };
        let local = self.sizing.local_id(node);
        match (page.offsets.get(local), page.offsets.get(local + 1)) {
            (Some(&start), Some(&end)) => &page.values[start..end],
            _ => &[],
        }
    }

    /// Values stored for `node`
    pub fn values(&self, node: u64) -> impl Iterator<Item = f64> + '_ {
        self.words(node).iter().map(|&w| f64::from_bits(w))
    }

    /// Reusable cursor over this list
    #[must_use]
    pub fn cursor(&self) -> PropertyCursor<'_> {
        PropertyCursor {
            list: self,
            words: &[],
            position: 0,
        }
    }

    fn size_in_bytes(&self) -> usize {
        self.pages
            .iter()
            .map(|p| p.values.len() * 8 + p.offsets.len() * std::mem::size_of::<usize>())
            .sum()
    }
}

/// Reusable cursor over the property values of one node at a time
#[derive(Debug, Clone)]
pub struct PropertyCursor<'a> {
    list: &'a PropertyList,
    words: &'a [u64],
    position: usize,
}

impl PropertyCursor<'_> {
    /// Position the cursor on `node`
    pub fn init(&mut self, node: u64) {
        self.words = self.list.words(node);
        self.position = 0;
    }

    /// Values left for the current node
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.words.len() - self.position
    }
}

impl Iterator for PropertyCursor<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let word = *self.words.get(self.position)?;
        self.position += 1;
        Some(f64::from_bits(word))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining(), Some(self.remaining()))
    }
}

/// Degrees and compressed adjacency of one projection
#[derive(Debug, Clone)]
pub struct Topology {
    sizing: ImportSizing,
    codec: Codec,
    flags: CompressionFlags,
    degrees: Vec<u64>,
    pages: Vec<AdjacencyPage>,
    properties: Vec<PropertyList>,
    relationship_count: u64,
}

impl Topology {
    /// Stitch compacted pages (in page order) into a topology
    ///
    /// `property_names` names the channels of the pages, in order.
    #[must_use]
    pub fn from_pages(
        sizing: ImportSizing,
        codec: Codec,
        flags: CompressionFlags,
        pages: Vec<CompactedPage>,
        property_names: &[String],
    ) -> Self {
        let mut degrees = Vec::with_capacity(pages.len() * sizing.page_size());
        let mut adjacency = Vec::with_capacity(pages.len());
        let mut properties: Vec<PropertyList> = property_names
            .iter()
            .map(|name| PropertyList {
                name: name.clone(),
                sizing,
                pages: Vec::with_capacity(pages.len()),
            })
            .collect();

        for page in pages {
            let mut value_offsets = Vec::with_capacity(page.degrees.len() + 1);
            let mut end = 0;
            value_offsets.push(end);
            for &degree in &page.degrees {
                end += usize::try_from(degree).unwrap_or(usize::MAX);
                value_offsets.push(end);
            }
            degrees.extend_from_slice(&page.degrees);
            for (list, values) in properties.iter_mut().zip(page.properties) {
                list.pages.push(PropertyPage {
                    values,
                    offsets: value_offsets.clone(),
                });
            }
            adjacency.push(AdjacencyPage {
                bytes: page.bytes,
                offsets: page.offsets,
            });
        }

        let relationship_count = degrees.iter().sum();
        Self {
            sizing,
            codec,
            flags,
            degrees,
            pages: adjacency,
            properties,
            relationship_count,
        }
    }

    /// Nodes covered
    #[must_use]
    pub fn node_count(&self) -> u64 {
        self.degrees.len() as u64
    }

    /// Stored relationships
    #[must_use]
    pub const fn relationship_count(&self) -> u64 {
        self.relationship_count
    }

    /// Degree of `node`, zero for unknown nodes
    #[must_use]
    pub fn degree(&self, node: u64) -> u64 {
        usize::try_from(node)
            .ok()
            .and_then(|n| self.degrees.get(n))
            .copied()
            .unwrap_or(0)
    }

    /// Adjacency encoding
    #[must_use]
    pub const fn codec(&self) -> Codec {
        self.codec
    }

    /// Pre-processing applied before encoding
    #[must_use]
    pub const fn flags(&self) -> CompressionFlags {
        self.flags
    }

    /// Bytes of compressed adjacency
    #[must_use]
    pub fn compressed_bytes(&self) -> usize {
        self.pages.iter().map(|p| p.bytes.len()).sum()
    }

    /// Bytes held, including degrees, offsets and properties
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        let offsets: usize = self
            .pages
            .iter()
            .map(|p| p.offsets.len() * std::mem::size_of::<usize>())
            .sum();
        self.degrees.len() * 8
            + self.compressed_bytes()
            + offsets
            + self.properties.iter().map(PropertyList::size_in_bytes).sum::<usize>()
    }

    /// Property channels, in configuration order
    #[must_use]
    pub fn property_lists(&self) -> &[PropertyList] {
        &self.properties
    }

    /// Property channel named `name`
    #[must_use]
    pub fn property_list(&self, name: &str) -> Option<&PropertyList> {
        self.properties.iter().find(|p| p.name == name)
    }

    fn encoded(&self, node: u64) -> (&[u8], usize) {
        let degree = self.degree(node);
        if degree == 0 {
            return (&[], 0);
        }
        let page = &self.pages[self.sizing.page_of(node)];
        let start = page.offsets[self.sizing.local_id(node)];
        (&page.bytes[start..], usize::try_from(degree).unwrap_or(usize::MAX))
    }

    /// Reusable cursor over the targets of one node at a time
    #[must_use]
    pub fn adjacency_cursor(&self) -> AdjacencyCursor<'_> {
        AdjacencyCursor {
            topology: self,
            decoder: self.codec.cursor(&[], 0, self.flags),
        }
    }

    /// Targets of `node`
    ///
    /// Only the multiset is meaningful unless the topology was built with
    /// sorting on.
    #[must_use]
    pub fn targets(&self, node: u64) -> Vec<u64> {
        let mut cursor = self.adjacency_cursor();
        cursor.init(node);
        cursor.collect()
    }
}

/// Reusable cursor decoding one node's targets at a time
#[derive(Debug, Clone)]
pub struct AdjacencyCursor<'a> {
    topology: &'a Topology,
    decoder: AdjacencyDecoder<'a>,
}

impl AdjacencyCursor<'_> {
    /// Position the cursor on `node`
    pub fn init(&mut self, node: u64) {
        let (bytes, length) = self.topology.encoded(node);
        self.decoder
            .reset(self.topology.codec, bytes, length, self.topology.flags);
    }

    /// Targets left for the current node
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.decoder.remaining()
    }
}

impl Iterator for AdjacencyCursor<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.decoder.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.decoder.size_hint()
    }
}

/// Dense node property column, indexed by mapped id
#[derive(Debug, Clone, PartialEq)]
pub enum NodePropertyColumn {
    /// `f64` values
    Double(Vec<f64>),
    /// `i64` values
    Long(Vec<i64>),
}

impl NodePropertyColumn {
    /// Column of `len` copies of `default`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn filled(value_type: ValueType, len: usize, default: f64) -> Self {
        match value_type {
            ValueType::Double => Self::Double(vec![default; len]),
            ValueType::Long => Self::Long(vec![default as i64; len]),
        }
    }

    /// Declared type
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Double(_) => ValueType::Double,
            Self::Long(_) => ValueType::Long,
        }
    }

    /// Number of nodes covered
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Double(values) => values.len(),
            Self::Long(values) => values.len(),
        }
    }

    /// Whether the column covers no node
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of `node` as `f64`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn double_value(&self, node: u64) -> Option<f64> {
        let node = usize::try_from(node).ok()?;
        match self {
            Self::Double(values) => values.get(node).copied(),
            Self::Long(values) => values.get(node).map(|&v| v as f64),
        }
    }

    /// Value of `node` as `i64`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn long_value(&self, node: u64) -> Option<i64> {
        let node = usize::try_from(node).ok()?;
        match self {
            Self::Double(values) => values.get(node).map(|&v| v as i64),
            Self::Long(values) => values.get(node).copied(),
        }
    }

    /// Store a converted word: `f64` bits or `i64` bits, matching the column
    #[allow(clippy::cast_possible_wrap)]
    pub(crate) fn set_word(&mut self, node: usize, word: u64) {
        match self {
            Self::Double(values) => values[node] = f64::from_bits(word),
            Self::Long(values) => values[node] = word as i64,
        }
    }
}

/// Immutable result of an import
///
/// # Example
///
/// ```
/// use trueno_csr::{
///     GraphImporter, ImportConfig, InMemorySource, NoProperties, NodeRecord,
///     RelationshipProjection, RelationshipRecord,
/// };
///
/// let nodes = InMemorySource::new(vec![
///     NodeRecord::new(10, vec![]),
///     NodeRecord::new(20, vec![]),
///     NodeRecord::new(30, vec![]),
/// ]);
/// let relationships = InMemorySource::new(vec![
///     RelationshipRecord::new(10, 20, 0),
///     RelationshipRecord::new(10, 30, 0),
/// ]);
///
/// let config = ImportConfig::new(RelationshipProjection::new("REL")).with_concurrency(2);
/// let mut importer = GraphImporter::new(config).unwrap();
/// let store = importer.import(&nodes, &relationships, &NoProperties).unwrap();
///
/// let source = store.to_mapped_node_id(10);
/// let topology = store.topology("REL").unwrap();
/// assert_eq!(topology.degree(source), 2);
/// assert_eq!(store.stats().relationship_count(), 2);
/// ```
#[derive(Debug)]
pub struct CsrGraphStore {
    id_map: IdMap,
    topologies: BTreeMap<String, Topology>,
    node_properties: BTreeMap<String, NodePropertyColumn>,
    stats: ImportStats,
}

impl CsrGraphStore {
    /// Assemble a store
    #[must_use]
    pub fn new(
        id_map: IdMap,
        topologies: BTreeMap<String, Topology>,
        node_properties: BTreeMap<String, NodePropertyColumn>,
        stats: ImportStats,
    ) -> Self {
        Self {
            id_map,
            topologies,
            node_properties,
            stats,
        }
    }

    /// Id mapping
    #[must_use]
    pub const fn id_map(&self) -> &IdMap {
        &self.id_map
    }

    /// Number of mapped nodes
    #[must_use]
    pub fn node_count(&self) -> u64 {
        self.id_map.node_count()
    }

    /// Mapped id of `original`, or [`crate::idmap::NOT_FOUND`]
    #[must_use]
    pub fn to_mapped_node_id(&self, original: u64) -> u64 {
        self.id_map.to_mapped_node_id(original)
    }

    /// Original id of `mapped`
    #[must_use]
    pub fn to_original_node_id(&self, mapped: u64) -> u64 {
        self.id_map.to_original_node_id(mapped)
    }

    /// Topology of the projection named `name`
    #[must_use]
    pub fn topology(&self, name: &str) -> Option<&Topology> {
        self.topologies.get(name)
    }

    /// Every topology by projection name
    pub fn topologies(&self) -> impl Iterator<Item = (&str, &Topology)> + '_ {
        self.topologies.iter().map(|(name, t)| (name.as_str(), t))
    }

    /// Node property column named `name`
    #[must_use]
    pub fn node_property(&self, name: &str) -> Option<&NodePropertyColumn> {
        self.node_properties.get(name)
    }

    /// Import counters
    #[must_use]
    pub const fn stats(&self) -> &ImportStats {
        &self.stats
    }

    /// Bytes held by topologies and node properties
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        let properties: usize = self
            .node_properties
            .values()
            .map(|column| column.len() * 8)
            .sum();
        self.topologies.values().map(Topology::size_in_bytes).sum::<usize>() + properties
    }
}
