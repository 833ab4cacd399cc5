//! Pre-flight memory estimation of an import
//!
//! Estimates are pure arithmetic over [`GraphDimensions`]; nothing is
//! allocated. Accumulated targets are bounded by two extremes:
//!
//! - best case: neighbouring targets differ by one, so every delta is a
//!   one-byte var-long
//! - worst case: relationships are spread evenly and targets are
//!   `node_count / average_degree` apart
//!
//! The first target of a list is not delta encoded and is assumed to take
//! half the bytes of the largest id on average.

use super::dimensions::{average_degree, GraphDimensions};
use super::range::MemoryRange;
use super::usage::{size_of_hash_map, size_of_vec, vlong_size, VEC_HEADER_BYTES};
use crate::config::{ImportConfig, DEFAULT_BATCH_SIZE};
use crate::idmap::builder::DENSE_SLOT_LIMIT;
use crate::idmap::IdMapStrategy;
use crate::loading::batch::RELATIONSHIP_STRIDE;
use crate::loading::sizing::ImportSizing;
use std::fmt::Write;

/// Per-node bookkeeping of an accumulation list: two `Vec`s, length and last
/// target
const LIST_HEADER_BYTES: u64 = 2 * VEC_HEADER_BYTES + 16;

/// One lock-protected page of accumulation lists
const PAGE_BYTES: u64 = VEC_HEADER_BYTES + 32;

/// Labelled estimate with its breakdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTree {
    description: String,
    usage: MemoryRange,
    components: Vec<MemoryTree>,
}

impl MemoryTree {
    /// Estimate without breakdown
    #[must_use]
    pub fn leaf(description: impl Into<String>, usage: MemoryRange) -> Self {
        Self {
            description: description.into(),
            usage,
            components: Vec::new(),
        }
    }

    /// Estimate summing `components`
    #[must_use]
    pub fn node(description: impl Into<String>, components: Vec<Self>) -> Self {
        Self {
            description: description.into(),
            usage: components.iter().map(Self::memory_usage).sum(),
            components,
        }
    }

    /// What is estimated
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Estimated bytes
    #[must_use]
    pub const fn memory_usage(&self) -> MemoryRange {
        self.usage
    }

    /// Breakdown
    #[must_use]
    pub fn components(&self) -> &[Self] {
        &self.components
    }

    /// Component described as `description`, searched depth first
    #[must_use]
    pub fn find(&self, description: &str) -> Option<&Self> {
        if self.description == description {
            return Some(self);
        }
        self.components.iter().find_map(|c| c.find(description))
    }

    /// Indented, human readable breakdown
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(0, &mut out);
        out
    }

    fn render_into(&self, depth: usize, out: &mut String) {
        if depth > 0 {
            out.push_str(&"    ".repeat(depth - 1));
            out.push_str("|-- ");
        }
        // writing to a String cannot fail
        let _ = writeln!(out, "{}: {}", self.description, self.usage);
        for component in &self.components {
            component.render_into(depth + 1, out);
        }
    }
}

/// Estimation model of a whole import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryEstimation {
    batch_size: usize,
    id_map_strategy: Option<IdMapStrategy>,
}

impl Default for MemoryEstimation {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            id_map_strategy: None,
        }
    }
}

impl MemoryEstimation {
    /// Model with default batch size and id map selection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Model matching `config`
    #[must_use]
    pub fn for_config(config: &ImportConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            id_map_strategy: config.id_map_strategy,
        }
    }

    /// Records per batch buffer
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Forced id map variant
    #[must_use]
    pub const fn with_id_map_strategy(mut self, strategy: IdMapStrategy) -> Self {
        self.id_map_strategy = Some(strategy);
        self
    }

    /// Estimate an import of a graph of `dimensions` by `concurrency` workers
    #[must_use]
    pub fn estimate(&self, dimensions: &GraphDimensions, concurrency: usize) -> MemoryTree {
        let node_count = dimensions.node_count();
        let mut components = vec![self.id_map(dimensions)];

        if dimensions.node_property_count() > 0 {
            components.push(MemoryTree::leaf(
                "node properties",
                MemoryRange::of(size_of_vec(node_count, 8)).times(dimensions.node_property_count() as u64),
            ));
        }

        let projections: Vec<(&str, u64)> = if dimensions.relationship_counts().is_empty() {
            vec![("relationships", dimensions.relationship_count())]
        } else {
            dimensions
                .relationship_counts()
                .iter()
                .map(|(name, &count)| (name.as_str(), count))
                .collect()
        };
        for &(name, count) in &projections {
            components.push(projection(
                name,
                node_count,
                count,
                dimensions.property_count(),
                concurrency,
            ));
        }

        components.push(self.batch_buffers(projections.len(), concurrency));
        MemoryTree::node("Import", components)
    }

    fn id_map(&self, dimensions: &GraphDimensions) -> MemoryTree {
        let node_count = dimensions.node_count();
        let highest = dimensions.highest_original_id();
        let strategy = self
            .id_map_strategy
            .unwrap_or_else(|| IdMapStrategy::select(node_count, highest));
        let builder = if highest < DENSE_SLOT_LIMIT {
            size_of_vec(highest + 1, 8)
        } else {
            size_of_hash_map(node_count, 16)
        };
        MemoryTree::node(
            "id map",
            vec![
                MemoryTree::leaf("builder", MemoryRange::of(builder)),
                MemoryTree::leaf(
                    format!("{strategy} map"),
                    MemoryRange::of(strategy.estimate(node_count, highest)),
                ),
            ],
        )
    }

    fn batch_buffers(&self, projections: usize, concurrency: usize) -> MemoryTree {
        let batch = self.batch_size as u64;
        // ids, property references and label ends
        let nodes = size_of_vec(batch, 8).saturating_mul(3);
        // staged triples plus the sort scratch
        let relationships = size_of_vec(batch.saturating_mul(RELATIONSHIP_STRIDE as u64), 8)
            .saturating_mul(2)
            .saturating_mul(projections as u64);
        MemoryTree::leaf(
            "batch buffers",
            MemoryRange::of(nodes.saturating_add(relationships)).times(concurrency as u64),
        )
    }
}

fn projection(
    name: &str,
    node_count: u64,
    relationship_count: u64,
    property_count: usize,
    concurrency: usize,
) -> MemoryTree {
    let avg_degree = average_degree(relationship_count, node_count);
    let pages = page_count(concurrency, node_count);
    let properties = relationship_count
        .saturating_mul(8)
        .saturating_add(node_count.saturating_add(pages).saturating_mul(8))
        .saturating_mul(property_count as u64);

    MemoryTree::node(
        name,
        vec![
            MemoryTree::leaf(
                "accumulation",
                adjacency_estimate(avg_degree, node_count, property_count, concurrency),
            ),
            MemoryTree::leaf("degrees", MemoryRange::of(size_of_vec(node_count, 8))),
            MemoryTree::leaf(
                "offsets",
                MemoryRange::of(size_of_vec(node_count, 8) + pages * VEC_HEADER_BYTES),
            ),
            MemoryTree::leaf(
                "compressed adjacency",
                compressed_targets(avg_degree, node_count) + MemoryRange::of(pages * VEC_HEADER_BYTES),
            ),
            MemoryTree::leaf("property lists", MemoryRange::of(properties)),
        ],
    )
}

fn page_count(concurrency: usize, node_count: u64) -> u64 {
    ImportSizing::of(concurrency.max(1), node_count)
        .map_or(1, |sizing| sizing.page_count() as u64)
}

fn compressed_target_bytes(avg_degree: u64, node_count: u64, delta: u64) -> u64 {
    if avg_degree == 0 {
        return 0;
    }
    let first = vlong_size(node_count).div_ceil(2);
    let rest = vlong_size(delta).saturating_mul(avg_degree - 1);
    node_count.saturating_mul(first + rest)
}

fn compressed_targets(avg_degree: u64, node_count: u64) -> MemoryRange {
    let worst_delta = if avg_degree == 0 {
        0
    } else {
        node_count.div_ceil(avg_degree)
    };
    MemoryRange::between(
        compressed_target_bytes(avg_degree, node_count, 1),
        compressed_target_bytes(avg_degree, node_count, worst_delta),
    )
}

/// Estimate of the accumulation buffers of one projection
///
/// Covers the var-long encoded targets, per-node list bookkeeping, the
/// property channels and the page locks of an import by `concurrency`
/// workers.
#[must_use]
pub fn adjacency_estimate(
    avg_degree: u64,
    node_count: u64,
    property_count: usize,
    concurrency: usize,
) -> MemoryRange {
    let pages = MemoryRange::of(page_count(concurrency, node_count).saturating_mul(PAGE_BYTES));
    if avg_degree == 0 {
        return pages;
    }
    let lists = MemoryRange::of(node_count.saturating_mul(LIST_HEADER_BYTES));
    let properties = MemoryRange::of(
        node_count
            .saturating_mul(size_of_vec(avg_degree, 8))
            .saturating_mul(property_count as u64),
    );
    compressed_targets(avg_degree, node_count) + lists + properties + pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacency_estimate_bounds() {
        let estimate = adjacency_estimate(10, 1_000_000, 0, 4);
        assert!(estimate.min() < estimate.max());
        // best case: 2 bytes for the first id, 9 one-byte deltas
        let best = 1_000_000 * (2 + 9) + 1_000_000 * LIST_HEADER_BYTES;
        assert!(estimate.min() >= best);

        let with_properties = adjacency_estimate(10, 1_000_000, 2, 4);
        assert!(with_properties.min() > estimate.min() + 2 * 80 * 1_000_000 - 1);
    }

    #[test]
    fn test_empty_graph() {
        let estimate = adjacency_estimate(0, 0, 3, 8);
        assert!(estimate.max() <= PAGE_BYTES);

        let tree = MemoryEstimation::new().estimate(&GraphDimensions::new(0, 0), 1);
        assert_eq!(tree.description(), "Import");
    }

    #[test]
    fn test_tree_sums_components() {
        let dimensions = GraphDimensions::new(10_000, 100_000)
            .with_relationship_count("A", 100_000)
            .with_relationship_count("B", 50_000)
            .with_property_count(1)
            .with_node_property_count(2);
        let tree = MemoryEstimation::new().estimate(&dimensions, 4);

        let sum: MemoryRange = tree.components().iter().map(MemoryTree::memory_usage).sum();
        assert_eq!(tree.memory_usage(), sum);
        assert!(tree.find("A").is_some());
        assert!(tree.find("B").is_some());
        assert!(tree.find("relationships").is_none());
        assert!(tree.find("node properties").is_some());
        assert!(
            tree.find("A").unwrap().memory_usage().min() > tree.find("B").unwrap().memory_usage().min()
        );
    }

    #[test]
    fn test_batch_buffers_scale_with_concurrency() {
        let dimensions = GraphDimensions::new(1_000, 1_000);
        let model = MemoryEstimation::new().with_batch_size(1_000);
        let one = model.estimate(&dimensions, 1);
        let eight = model.estimate(&dimensions, 8);
        assert_eq!(
            eight.find("batch buffers").unwrap().memory_usage(),
            one.find("batch buffers").unwrap().memory_usage().times(8)
        );
    }

    #[test]
    fn test_forced_strategy() {
        let dimensions = GraphDimensions::new(1_000, 0);
        let tree = MemoryEstimation::new()
            .with_id_map_strategy(IdMapStrategy::HighLimit)
            .estimate(&dimensions, 1);
        assert!(tree.find("high_limit map").is_some());
    }

    #[test]
    fn test_render() {
        let tree = MemoryTree::node(
            "Import",
            vec![
                MemoryTree::leaf("a", MemoryRange::of(1)),
                MemoryTree::node("b", vec![MemoryTree::leaf("c", MemoryRange::between(2, 3))]),
            ],
        );
        assert_eq!(
            tree.render(),
            "Import: [3 Bytes ... 4 Bytes]\n\
             |-- a: 1 Bytes\n\
             |-- b: [2 Bytes ... 3 Bytes]\n    \
             |-- c: [2 Bytes ... 3 Bytes]\n"
        );
    }
}
