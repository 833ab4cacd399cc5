//! Import configuration
//!
//! An [`ImportConfig`] is assembled with the `with_*` builder methods or
//! loaded from TOML:
//!
//! ```toml
//! concurrency = 8
//! batch_size = 10000
//! codec = "packed"
//! flags = { sort = true, delta = true }
//!
//! [[relationships]]
//! name = "KNOWS"
//! type_token = 1
//! orientation = "undirected"
//! aggregation = "SINGLE"
//!
//! [[relationships.properties]]
//! name = "weight"
//! key = 3
//! aggregation = "SUM"
//! default_value = 1.0
//! ```

use crate::compress::{Aggregation, Codec, CompressionFlags};
use crate::error::{CsrError, Result};
use crate::idmap::{IdMapStrategy, LabelToken, MAX_ORIGINAL_ID};
use crate::loading::chunked::DEFAULT_LIST_CEILING;
use crate::loading::sizing::MAX_PAGE_SIZE;
use crate::loading::property::{PropertyKey, ValueType};
use crate::loading::records::TypeToken;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Records staged per batch buffer unless configured
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Direction in which a projection stores relationships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// `source -> target`
    #[default]
    Natural,
    /// `target -> source`
    Reverse,
    /// Both directions
    Undirected,
}

/// One property channel or node property column
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyMapping {
    /// Name the values are exposed under
    pub name: String,
    /// Key looked up through the property reader
    pub key: PropertyKey,
    /// Rule for parallel relationships; unused for node properties
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Value used when a record has no value for `key`
    #[serde(default = "default_property_value")]
    pub default_value: f64,
    /// Declared type of the values
    #[serde(default)]
    pub value_type: ValueType,
}

const fn default_property_value() -> f64 {
    f64::NAN
}

impl PropertyMapping {
    /// `f64` mapping of `key` exposed as `name`, defaulting to NaN
    #[must_use]
    pub fn new(name: impl Into<String>, key: PropertyKey) -> Self {
        Self {
            name: name.into(),
            key,
            aggregation: Aggregation::None,
            default_value: default_property_value(),
            value_type: ValueType::Double,
        }
    }

    /// Combine parallel relationships with `aggregation`
    #[must_use]
    pub const fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Use `default_value` for missing values
    #[must_use]
    pub const fn with_default(mut self, default_value: f64) -> Self {
        self.default_value = default_value;
        self
    }

    /// Declare the value type
    #[must_use]
    pub const fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }
}

/// Relationships loaded into one topology
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipProjection {
    /// Name of the resulting topology
    pub name: String,
    /// Type to load; every type when absent
    #[serde(default)]
    pub type_token: Option<TypeToken>,
    /// Storage direction
    #[serde(default)]
    pub orientation: Orientation,
    /// Rule for parallel relationships without property channels
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Property channels
    #[serde(default)]
    pub properties: Vec<PropertyMapping>,
}

impl RelationshipProjection {
    /// Natural projection of every type, keeping parallel relationships
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_token: None,
            orientation: Orientation::Natural,
            aggregation: Aggregation::None,
            properties: Vec::new(),
        }
    }

    /// Only load `type_token`
    #[must_use]
    pub const fn with_type(mut self, type_token: TypeToken) -> Self {
        self.type_token = Some(type_token);
        self
    }

    /// Store in `orientation`
    #[must_use]
    pub const fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Collapse parallel relationships with `aggregation`
    #[must_use]
    pub const fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Add a property channel
    #[must_use]
    pub fn with_property(mut self, mapping: PropertyMapping) -> Self {
        self.properties.push(mapping);
        self
    }

    /// Per-channel aggregations, in channel order
    #[must_use]
    pub fn aggregations(&self) -> Vec<Aggregation> {
        self.properties.iter().map(|p| p.aggregation).collect()
    }

    /// Whether parallel relationships get collapsed
    #[must_use]
    pub fn collapses(&self) -> bool {
        self.aggregation.collapses() || self.properties.iter().any(|p| p.aggregation.collapses())
    }
}

/// Everything an import needs besides its sources
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// Worker threads
    pub concurrency: usize,
    /// Records per batch buffer
    pub batch_size: usize,
    /// Adjacency encoding
    pub codec: Codec,
    /// Pre-processing applied before encoding
    pub flags: CompressionFlags,
    /// Forced id map variant
    pub id_map_strategy: Option<IdMapStrategy>,
    /// Forced accumulation page size, in nodes
    pub page_size: Option<u64>,
    /// Hard ceiling of each accumulation buffer of a node: bytes of its encoded
    /// target stream and words of each property channel
    pub accumulation_ceiling: usize,
    /// Highest original id the sources may use; larger ids are dropped
    pub highest_possible_id: Option<u64>,
    /// Bytes the import may use
    pub memory_budget: Option<u64>,
    /// Check the budget against the upper estimate instead of the lower
    pub use_max_estimation: bool,
    /// Only load nodes carrying one of these labels
    pub label_filter: Option<Vec<LabelToken>>,
    /// Node property columns
    pub node_properties: Vec<PropertyMapping>,
    /// Relationship topologies
    pub relationships: Vec<RelationshipProjection>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism().map_or(1, usize::from),
            batch_size: DEFAULT_BATCH_SIZE,
            codec: Codec::default(),
            flags: CompressionFlags::SORT_AND_DELTA,
            id_map_strategy: None,
            page_size: None,
            accumulation_ceiling: DEFAULT_LIST_CEILING,
            highest_possible_id: None,
            memory_budget: None,
            use_max_estimation: false,
            label_filter: None,
            node_properties: Vec::new(),
            relationships: Vec::new(),
        }
    }
}

impl ImportConfig {
    /// Defaults with a single projection
    #[must_use]
    pub fn new(projection: RelationshipProjection) -> Self {
        Self::default().with_relationships(projection)
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or fails
    /// [`ImportConfig::validate`].
    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(source).context("failed to parse import configuration")?;
        config.validate().context("import configuration rejected")?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or
    /// [`ImportConfig::from_toml_str`] fails.
    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&source)
    }

    /// Use `concurrency` workers
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Stage `batch_size` records per buffer
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Encode adjacency with `codec` and `flags`
    #[must_use]
    pub const fn with_codec(mut self, codec: Codec, flags: CompressionFlags) -> Self {
        self.codec = codec;
        self.flags = flags;
        self
    }

    /// Force the id map variant
    #[must_use]
    pub const fn with_id_map_strategy(mut self, strategy: IdMapStrategy) -> Self {
        self.id_map_strategy = Some(strategy);
        self
    }

    /// Force the accumulation page size
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Cap a node's encoded target stream at `ceiling` bytes and each of its
    /// property channels at `ceiling` words
    #[must_use]
    pub const fn with_accumulation_ceiling(mut self, ceiling: usize) -> Self {
        self.accumulation_ceiling = ceiling;
        self
    }

    /// Declare the highest original id the sources may use
    #[must_use]
    pub const fn with_highest_possible_id(mut self, highest: u64) -> Self {
        self.highest_possible_id = Some(highest);
        self
    }

    /// Refuse imports estimated above `bytes`
    #[must_use]
    pub const fn with_memory_budget(mut self, bytes: u64, use_max_estimation: bool) -> Self {
        self.memory_budget = Some(bytes);
        self.use_max_estimation = use_max_estimation;
        self
    }

    /// Only load nodes carrying one of `labels`
    #[must_use]
    pub fn with_label_filter(mut self, labels: Vec<LabelToken>) -> Self {
        self.label_filter = Some(labels);
        self
    }

    /// Add a node property column
    #[must_use]
    pub fn with_node_property(mut self, mapping: PropertyMapping) -> Self {
        self.node_properties.push(mapping);
        self
    }

    /// Add a relationship projection
    #[must_use]
    pub fn with_relationships(mut self, projection: RelationshipProjection) -> Self {
        self.relationships.push(projection);
        self
    }

    /// Exclusive bound on accepted original ids
    #[must_use]
    pub fn id_bound(&self) -> u64 {
        self.highest_possible_id
            .map_or(MAX_ORIGINAL_ID, |highest| highest.min(MAX_ORIGINAL_ID))
            + 1
    }

    /// Reject configurations the importer cannot run
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::InvalidConfig`] naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(CsrError::InvalidConfig(message.to_string()));
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1");
        }
        if self.accumulation_ceiling == 0 {
            return invalid("accumulation_ceiling must be at least 1");
        }
        if self.relationships.is_empty() {
            return invalid("at least one relationship projection is required");
        }
        match self.page_size {
            Some(0) => return invalid("page_size must be at least 1"),
            Some(size) if size > MAX_PAGE_SIZE as u64 => {
                return Err(CsrError::InvalidConfig(format!(
                    "page_size {size} exceeds {MAX_PAGE_SIZE}"
                )));
            }
            _ => {}
        }

        let mut names = HashSet::new();
        for projection in &self.relationships {
            if !names.insert(projection.name.as_str()) {
                return Err(CsrError::InvalidConfig(format!(
                    "duplicate relationship projection `{}`",
                    projection.name
                )));
            }
            let mut channels = HashSet::new();
            for mapping in &projection.properties {
                if !channels.insert(mapping.name.as_str()) {
                    return Err(CsrError::InvalidConfig(format!(
                        "duplicate property `{}` in projection `{}`",
                        mapping.name, projection.name
                    )));
                }
            }
        }
        let mut columns = HashSet::new();
        for mapping in &self.node_properties {
            if !columns.insert(mapping.name.as_str()) {
                return Err(CsrError::InvalidConfig(format!(
                    "duplicate node property `{}`",
                    mapping.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config = ImportConfig::from_toml_str(
            r#"
            concurrency = 3
            codec = "packed"
            flags = { sort = true }
            id_map_strategy = "bit"
            highest_possible_id = 99

            [[node_properties]]
            name = "age"
            key = 7
            value_type = "long"
            default_value = -1.0

            [[relationships]]
            name = "KNOWS"
            type_token = 1
            orientation = "undirected"

            [[relationships.properties]]
            name = "weight"
            key = 3
            aggregation = "MAX"
            "#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 3);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.codec, Codec::Packed);
        assert_eq!(config.flags, CompressionFlags::SORT);
        assert_eq!(config.id_map_strategy, Some(IdMapStrategy::Bit));
        assert_eq!(config.id_bound(), 100);
        assert_eq!(config.node_properties[0].value_type, ValueType::Long);

        let knows = &config.relationships[0];
        assert_eq!(knows.orientation, Orientation::Undirected);
        assert_eq!(knows.type_token, Some(1));
        assert!(knows.collapses());
        assert!(knows.properties[0].default_value.is_nan());
    }

    #[test]
    fn test_invalid_toml_reports_context() {
        let error = ImportConfig::from_toml_str("concurrency = 0\n[[relationships]]\nname = \"R\"")
            .unwrap_err();
        assert!(format!("{error:#}").contains("concurrency must be at least 1"));

        let error = ImportConfig::from_toml_str("unknown_field = 1").unwrap_err();
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_validate() {
        assert!(ImportConfig::default().validate().is_err());

        let config = ImportConfig::new(RelationshipProjection::new("R"));
        assert!(config.validate().is_ok());
        assert!(config.clone().with_batch_size(0).validate().is_err());
        assert!(config
            .clone()
            .with_relationships(RelationshipProjection::new("R"))
            .validate()
            .is_err());

        let twice = RelationshipProjection::new("S")
            .with_property(PropertyMapping::new("w", 1))
            .with_property(PropertyMapping::new("w", 2));
        assert!(ImportConfig::new(twice).validate().is_err());
    }

    #[test]
    fn test_page_size_bounds() {
        let config = ImportConfig::new(RelationshipProjection::new("R"));
        assert!(config.clone().with_page_size(0).validate().is_err());
        assert!(config.clone().with_page_size(MAX_PAGE_SIZE as u64).validate().is_ok());
        assert!(matches!(
            config.clone().with_page_size((1 << 63) + 1).validate(),
            Err(CsrError::InvalidConfig(_))
        ));

        let error = ImportConfig::from_toml_str(
            "page_size = 4294967296\n[[relationships]]\nname = \"R\"",
        )
        .unwrap_err();
        assert!(format!("{error:#}").contains("page_size"));
    }

    #[test]
    fn test_id_bound_defaults_to_full_range() {
        let config = ImportConfig::default();
        assert_eq!(config.id_bound(), MAX_ORIGINAL_ID + 1);
        assert_eq!(config.clone().with_highest_possible_id(u64::MAX).id_bound(), MAX_ORIGINAL_ID + 1);
    }
}
