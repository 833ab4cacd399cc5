//! Bulk loading: record sources, batch staging, accumulation and the import
//! pipeline that ties them together

pub mod adjacency_buffer;
pub mod batch;
pub mod chunked;
pub mod importer;
pub mod property;
pub mod radix_sort;
pub mod records;
pub mod sizing;
pub mod termination;

pub use adjacency_buffer::{AdjacencyBuffer, CompactedPage};
pub use batch::{
    CompositeRelationshipsBatchBuffer, NodesBatchBuffer, RecordsBatchBuffer,
    RelationshipsBatchBuffer, StagedNode, RELATIONSHIP_STRIDE,
};
pub use chunked::{ChunkedAdjacencyLists, DEFAULT_LIST_CEILING};
pub use importer::{GraphImporter, ImportPhase};
pub use property::{
    InMemoryProperties, NoProperties, PropertyKey, PropertyReader, PropertyValue, ValueType,
};
pub use records::{
    InMemorySource, NodeRecord, PropertiesRef, RecordSource, RelationshipRecord, ScanCursor,
    TypeToken, NO_PROPERTIES,
};
pub use sizing::ImportSizing;
pub use termination::TerminationFlag;
