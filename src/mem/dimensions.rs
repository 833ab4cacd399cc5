//! Graph shape fed into the estimation model

use crate::config::{ImportConfig, Orientation};
use std::collections::BTreeMap;

/// Known or expected size of a graph
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GraphDimensions {
    node_count: u64,
    highest_original_id: u64,
    relationship_count: u64,
    relationship_counts: BTreeMap<String, u64>,
    property_count: usize,
    node_property_count: usize,
}

impl GraphDimensions {
    /// `node_count` nodes with ids `0..node_count` and `relationship_count`
    /// relationships
    #[must_use]
    pub const fn new(node_count: u64, relationship_count: u64) -> Self {
        Self {
            node_count,
            highest_original_id: node_count.saturating_sub(1),
            relationship_count,
            relationship_counts: BTreeMap::new(),
            property_count: 0,
            node_property_count: 0,
        }
    }

    /// Dimensions of an import described by `config`
    ///
    /// Every projection is assumed to receive every relationship, undirected
    /// projections twice.
    #[must_use]
    pub fn for_config(config: &ImportConfig, node_count: u64, relationship_count: u64) -> Self {
        let mut dimensions = Self::new(node_count, relationship_count)
            .with_node_property_count(config.node_properties.len())
            .with_property_count(
                config
                    .relationships
                    .iter()
                    .map(|p| p.properties.len())
                    .max()
                    .unwrap_or(0),
            );
        if let Some(highest) = config.highest_possible_id {
            dimensions = dimensions.with_highest_original_id(highest.max(node_count.saturating_sub(1)));
        }
        for projection in &config.relationships {
            let count = match projection.orientation {
                Orientation::Undirected => relationship_count.saturating_mul(2),
                Orientation::Natural | Orientation::Reverse => relationship_count,
            };
            dimensions = dimensions.with_relationship_count(&projection.name, count);
        }
        dimensions
    }

    /// Override the highest original id
    #[must_use]
    pub const fn with_highest_original_id(mut self, highest: u64) -> Self {
        self.highest_original_id = highest;
        self
    }

    /// Expected relationships of projection `name`
    #[must_use]
    pub fn with_relationship_count(mut self, name: &str, count: u64) -> Self {
        self.relationship_counts.insert(name.to_string(), count);
        self
    }

    /// Property channels per projection
    #[must_use]
    pub const fn with_property_count(mut self, property_count: usize) -> Self {
        self.property_count = property_count;
        self
    }

    /// Node property columns
    #[must_use]
    pub const fn with_node_property_count(mut self, node_property_count: usize) -> Self {
        self.node_property_count = node_property_count;
        self
    }

    /// Number of nodes
    #[must_use]
    pub const fn node_count(&self) -> u64 {
        self.node_count
    }

    /// Highest original id
    #[must_use]
    pub const fn highest_original_id(&self) -> u64 {
        self.highest_original_id
    }

    /// Upper bound on relationships over every type
    #[must_use]
    pub const fn relationship_count(&self) -> u64 {
        self.relationship_count
    }

    /// Per-projection relationship counts; empty when only the total is known
    #[must_use]
    pub const fn relationship_counts(&self) -> &BTreeMap<String, u64> {
        &self.relationship_counts
    }

    /// Property channels per projection
    #[must_use]
    pub const fn property_count(&self) -> usize {
        self.property_count
    }

    /// Node property columns
    #[must_use]
    pub const fn node_property_count(&self) -> usize {
        self.node_property_count
    }

    /// Relationships per node, rounded up
    #[must_use]
    pub const fn average_degree(&self) -> u64 {
        average_degree(self.relationship_count, self.node_count)
    }
}

/// `relationships / nodes`, rounded up; zero without nodes
#[must_use]
pub const fn average_degree(relationships: u64, nodes: u64) -> u64 {
    if nodes == 0 {
        0
    } else {
        relationships.div_ceil(nodes)
    }
}
