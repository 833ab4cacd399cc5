//! trueno-csr: compressed CSR adjacency storage with a parallel bulk loader
//!
//! # Overview
//!
//! trueno-csr imports large property graphs from partitioned record sources
//! into an immutable, compressed in-memory store. Node ids are remapped to a
//! dense range, relationships are grouped per source node, optionally
//! deduplicated with property aggregation, and stored as delta-encoded
//! adjacency lists.
//!
//! # Quick Start
//!
//! ```
//! use trueno_csr::{
//!     GraphImporter, ImportConfig, InMemorySource, NoProperties, NodeRecord,
//!     RelationshipProjection, RelationshipRecord,
//! };
//!
//! let nodes = InMemorySource::new(vec![
//!     NodeRecord::new(100, vec![]),
//!     NodeRecord::new(200, vec![]),
//!     NodeRecord::new(300, vec![]),
//! ]);
//! let relationships = InMemorySource::new(vec![
//!     RelationshipRecord::new(100, 200, 0),
//!     RelationshipRecord::new(100, 300, 0),
//! ]);
//!
//! let config = ImportConfig::new(RelationshipProjection::new("CALLS")).with_concurrency(2);
//! let mut importer = GraphImporter::new(config)?;
//! let store = importer.import(&nodes, &relationships, &NoProperties)?;
//!
//! let calls = store.topology("CALLS").expect("projection exists");
//! assert_eq!(calls.degree(store.to_mapped_node_id(100)), 2);
//! # Ok::<(), trueno_csr::CsrError>(())
//! ```
//!
//! # Architecture
//!
//! - **Compression** ([`compress`]): var-long and bit-packed codecs, delta and
//!   sort flags, pre-aggregation of parallel relationships
//! - **Id mapping** ([`idmap`]): array, bitset and high-limit maps built
//!   concurrently
//! - **Loading** ([`loading`]): record batching, paged accumulation and the
//!   phased import pipeline on a rayon pool
//! - **Storage** ([`storage`]): the immutable [`CsrGraphStore`] with cursors
//! - **Memory** ([`mem`]): pre-flight estimation against a budget

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod compress;
pub mod config;
pub mod error;
pub mod idmap;
pub mod loading;
pub mod mem;
pub mod storage;

pub use compress::{Aggregation, Codec, CompressedHandle, CompressionFlags, SlabArena};
pub use config::{ImportConfig, Orientation, PropertyMapping, RelationshipProjection};
pub use error::{CsrError, Result};
pub use idmap::{IdMap, IdMapBuilder, IdMapStrategy, LabelIndex, NodeMapping, NOT_FOUND};
pub use loading::{
    GraphImporter, ImportPhase, InMemoryProperties, InMemorySource, NoProperties, NodeRecord,
    PropertyReader, PropertyValue, RecordSource, RelationshipRecord, ScanCursor, TerminationFlag,
    ValueType,
};
pub use mem::{GraphDimensions, MemoryBudget, MemoryEstimation, MemoryRange, MemoryTree};
pub use storage::{CsrGraphStore, ImportStats, Topology};
