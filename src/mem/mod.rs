//! Memory estimation model
//!
//! Estimates how much memory an import of a graph with given
//! [`GraphDimensions`] needs, so oversized imports are refused before any
//! allocation happens.

pub mod budget;
pub mod dimensions;
pub mod estimation;
pub mod range;
pub mod usage;

pub use budget::MemoryBudget;
pub use dimensions::GraphDimensions;
pub use estimation::{adjacency_estimate, MemoryEstimation, MemoryTree};
pub use range::MemoryRange;
pub use usage::human_readable;
