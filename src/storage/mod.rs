//! Graph storage layer
//!
//! Provides the immutable compressed CSR store produced by an import.

pub mod csr;

pub use csr::{
    AdjacencyCursor, CsrGraphStore, ImportStats, NodePropertyColumn, PropertyCursor, PropertyList,
    Topology,
};
